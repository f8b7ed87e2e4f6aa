//! Session-end artifacts: tape dump, per-agent blotters, and the
//! per-kind balance summary. Simple delimited text.

use crate::session::runner::SessionOutcome;
use agora_engine::TapeDumpMode;
use std::io::{self, Write};

/// Dump the session tape (trades only), one line per execution.
pub fn write_tape(outcome: &mut SessionOutcome, w: &mut dyn Write) -> io::Result<()> {
    let session_id = outcome.session_id.clone();
    outcome.exchange.dump_tape(&session_id, w, TapeDumpMode::Keep)
}

/// One block per agent: closing balance, then every message it received,
/// in the order the exchange sent them.
pub fn write_blotters(outcome: &SessionOutcome, w: &mut dyn Write) -> io::Result<()> {
    for agent in &outcome.agents {
        writeln!(
            w,
            "{}, {}, balance={}, trades={}",
            agent.id(),
            agent.kind(),
            agent.balance(),
            agent.n_trades(),
        )?;
        if let Some(record) = outcome.exchange.trader(agent.id()) {
            for msg in &record.blotter {
                writeln!(w, "  {msg}")?;
            }
        }
    }
    Ok(())
}

/// Aggregate balances per agent kind.
pub fn write_kind_summary(outcome: &SessionOutcome, w: &mut dyn Write) -> io::Result<()> {
    for s in outcome.kind_summaries() {
        writeln!(
            w,
            "{}, {}, {}, {}, {:.2}, {}",
            outcome.session_id, s.kind, s.agents, s.total_balance, s.mean_balance, s.total_trades,
        )?;
    }
    Ok(())
}

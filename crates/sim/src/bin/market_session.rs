//! Run one market session from a JSON config and write its artifacts.

use agora_sim::session::{
    SessionError, StochasticSource, run_session, write_blotters, write_kind_summary, write_tape,
};
use agora_sim::{SessionConfig, build_population};
use anyhow::Context;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// A crashed unit invalidates a session; retry a few times before giving
/// up on the run entirely.
const MAX_ATTEMPTS: usize = 3;

fn print_help() {
    eprintln!(
        r#"Agora market session runner

USAGE:
    market-session [OPTIONS]

OPTIONS:
    --config <PATH>     Load session configuration from a JSON file
    --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG            Log level filter (e.g. agora_sim=debug)

EXAMPLES:
    # Run with defaults
    market-session

    # Run a configured session
    market-session --config session.json
"#
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora_sim=info,agora_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config_path: Option<String> = None;
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    anyhow::bail!("--config requires a path argument");
                };
                config_path = Some(path.clone());
            }
            other => {
                anyhow::bail!("unrecognized argument {other:?} (try --help)");
            }
        }
        i += 1;
    }

    let config: SessionConfig = match config_path {
        Some(path) => {
            let text = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?
        }
        None => SessionConfig::default(),
    };

    let out_dir = PathBuf::from(&config.out_dir);
    fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut outcome = None;
    for attempt in 1..=MAX_ATTEMPTS {
        let population = build_population(&config.population, config.seed)?;
        let source = StochasticSource::new(
            config.source.clone(),
            population.buyers.clone(),
            population.sellers.clone(),
        );
        match run_session(&config, population, Box::new(source)) {
            Ok(done) => {
                outcome = Some(done);
                break;
            }
            Err(SessionError::UnitCrashed { expected, joined }) if attempt < MAX_ATTEMPTS => {
                tracing::warn!(expected, joined, attempt, "unit crashed; session discarded");
            }
            Err(err) => return Err(err.into()),
        }
    }
    let Some(mut outcome) = outcome else {
        anyhow::bail!("session invalidated {MAX_ATTEMPTS} times; giving up");
    };

    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let base = format!("{}-{stamp}", outcome.session_id);

    let mut tape = fs::File::create(out_dir.join(format!("{base}-tape.csv")))?;
    write_tape(&mut outcome, &mut tape)?;

    let mut blotters = fs::File::create(out_dir.join(format!("{base}-blotters.txt")))?;
    write_blotters(&outcome, &mut blotters)?;

    let mut summary = fs::File::create(out_dir.join(format!("{base}-summary.csv")))?;
    write_kind_summary(&outcome, &mut summary)?;

    for s in outcome.kind_summaries() {
        tracing::info!(
            kind = s.kind,
            agents = s.agents,
            total = s.total_balance,
            mean = %format!("{:.2}", s.mean_balance),
            trades = s.total_trades,
            "session summary"
        );
    }
    tracing::info!(
        trades = outcome.exchange.tape().iter().filter(|e| e.is_trade()).count(),
        orders = outcome.exchange.orders_issued(),
        out = %out_dir.display(),
        "artifacts written"
    );
    Ok(())
}

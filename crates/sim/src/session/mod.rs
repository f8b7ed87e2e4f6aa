//! The session layer: scheduling, the single-writer coordinator, customer
//! order generation, and session-end artifacts.

mod artifacts;
mod clock;
mod coordinator;
mod runner;
mod source;

pub use artifacts::{write_blotters, write_kind_summary, write_tape};
pub use clock::SessionClock;
pub use coordinator::AgentEvent;
pub use runner::{
    KindSummary, ScheduleMode, SessionConfig, SessionOutcome, run_concurrent, run_sequential,
    run_session,
};
pub use source::{ArrivalMode, OrderSource, SourceConfig, StochasticSource};

use agora_engine::EngineError;
use thiserror::Error;

/// Harness failures. Engine faults are protocol misuse and fatal; a unit
/// crash invalidates the whole session's results, which the caller should
/// discard and retry.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("engine fault: {0}")]
    Engine(#[from] EngineError),

    #[error("unknown agent kind {0:?}")]
    UnknownAgentKind(String),

    #[error("unit count mismatch after stop: expected {expected}, joined {joined}")]
    UnitCrashed { expected: usize, joined: usize },

    #[error("coordinator thread panicked")]
    CoordinatorCrashed,
}

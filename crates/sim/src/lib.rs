//! Agents and the concurrency harness for the Agora market simulator.
//!
//! The exchange itself (in `agora-engine`) is plain owned data. This crate
//! supplies the two scheduling modes around it: a sequential runner that
//! wakes one agent per tick, and a concurrent runner in which every agent
//! is a thread and a single coordinator thread owns all exchange state.

pub mod agents;
pub mod session;

pub use agents::{
    Agent, AgentLedger, CustomerOrder, GiveawayTrader, Population, PopulationSpec, ShaverTrader,
    ZicConfig, ZicTrader, build_population,
};
pub use session::{
    AgentEvent, ArrivalMode, KindSummary, OrderSource, ScheduleMode, SessionClock, SessionConfig,
    SessionError, SessionOutcome, SourceConfig, StochasticSource, run_concurrent, run_sequential,
    run_session,
};

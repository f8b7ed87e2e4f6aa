//! Session runners for the two scheduling modes.
//!
//! Sequential: one pseudo-randomly chosen agent per tick, processed to
//! completion — no races by construction, fully deterministic under a
//! fixed seed. Concurrent: every agent on its own thread, a single
//! coordinator thread owning all exchange state.

use crate::agents::{Agent, Population, PopulationSpec};
use crate::session::SessionError;
use crate::session::clock::SessionClock;
use crate::session::coordinator::{AgentEvent, Coordinator, RefTracker, Submission, submit_order};
use crate::session::source::{OrderSource, SourceConfig};
use agora_core::{AgentId, Order, OrderId, PublishedBook, SimTime, TradeSummary};
use agora_engine::{Exchange, ExchangeConfig, ProcessReport};
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, unbounded};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    Sequential,
    Concurrent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_id")]
    pub session_id: String,
    #[serde(default = "default_mode")]
    pub mode: ScheduleMode,
    /// Virtual length of the trading day.
    #[serde(default = "default_virtual_len_ms")]
    pub virtual_len_ms: u64,
    /// Wall-clock length of a concurrent session.
    #[serde(default = "default_real_len_ms")]
    pub real_len_ms: u64,
    /// Virtual time step per sequential tick.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Polling interval for threads in concurrent mode.
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Where session artifacts land.
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default = "default_population")]
    pub population: Vec<PopulationSpec>,
}

fn default_session_id() -> String {
    "s001".to_string()
}

fn default_mode() -> ScheduleMode {
    ScheduleMode::Concurrent
}

fn default_virtual_len_ms() -> u64 {
    180_000
}

fn default_real_len_ms() -> u64 {
    5_000
}

fn default_tick_ms() -> u64 {
    100
}

fn default_poll_ms() -> u64 {
    5
}

fn default_seed() -> u64 {
    42
}

fn default_out_dir() -> String {
    "results".to_string()
}

fn default_population() -> Vec<PopulationSpec> {
    vec![
        PopulationSpec { kind: "ZIC".to_string(), buyers: 4, sellers: 4 },
        PopulationSpec { kind: "SHVR".to_string(), buyers: 2, sellers: 2 },
        PopulationSpec { kind: "GVWY".to_string(), buyers: 2, sellers: 2 },
    ]
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            session_id: default_session_id(),
            mode: default_mode(),
            virtual_len_ms: default_virtual_len_ms(),
            real_len_ms: default_real_len_ms(),
            tick_ms: default_tick_ms(),
            poll_ms: default_poll_ms(),
            seed: default_seed(),
            out_dir: default_out_dir(),
            exchange: ExchangeConfig::default(),
            source: SourceConfig::default(),
            population: default_population(),
        }
    }
}

/// Everything a finished session leaves behind.
pub struct SessionOutcome {
    pub session_id: String,
    pub exchange: Exchange,
    pub agents: Vec<Box<dyn Agent>>,
}

/// Aggregate balance per agent kind, for the session-end summary.
#[derive(Debug, Clone, PartialEq)]
pub struct KindSummary {
    pub kind: &'static str,
    pub agents: usize,
    pub total_balance: i64,
    pub mean_balance: f64,
    pub total_trades: u64,
}

impl SessionOutcome {
    pub fn kind_summaries(&self) -> Vec<KindSummary> {
        let mut by_kind: HashMap<&'static str, KindSummary> = HashMap::new();
        for agent in &self.agents {
            let entry = by_kind.entry(agent.kind()).or_insert(KindSummary {
                kind: agent.kind(),
                agents: 0,
                total_balance: 0,
                mean_balance: 0.0,
                total_trades: 0,
            });
            entry.agents += 1;
            entry.total_balance += agent.balance();
            entry.total_trades += agent.n_trades();
        }
        let mut summaries: Vec<KindSummary> = by_kind.into_values().collect();
        for s in &mut summaries {
            s.mean_balance = s.total_balance as f64 / s.agents as f64;
        }
        summaries.sort_by_key(|s| s.kind);
        summaries
    }
}

/// Run one market session in the configured scheduling mode.
pub fn run_session(
    config: &SessionConfig,
    population: Population,
    source: Box<dyn OrderSource>,
) -> Result<SessionOutcome, SessionError> {
    match config.mode {
        ScheduleMode::Sequential => run_sequential(config, population, source),
        ScheduleMode::Concurrent => run_concurrent(config, population, source),
    }
}

fn deliver(
    agents: &mut [Box<dyn Agent>],
    index: &HashMap<AgentId, usize>,
    report: &ProcessReport,
    now: SimTime,
) {
    for msg in &report.messages {
        if let Some(&i) = index.get(&msg.agent) {
            agents[i].bookkeep(msg, now);
        }
    }
}

/// Sequential scheduling: one agent wakes per tick and submits at most one
/// order, which the exchange processes to completion before the next tick.
pub fn run_sequential(
    config: &SessionConfig,
    population: Population,
    mut source: Box<dyn OrderSource>,
) -> Result<SessionOutcome, SessionError> {
    let mut agents = population.agents;
    let mut exchange = Exchange::new(config.exchange.clone());
    let mut tracker = RefTracker::default();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let index: HashMap<AgentId, usize> =
        agents.iter().enumerate().map(|(i, a)| (a.id().clone(), i)).collect();

    let report = exchange.open(SimTime::ZERO)?;
    deliver(&mut agents, &index, &report, SimTime::ZERO);

    let mut t = 0u64;
    while t < config.virtual_len_ms {
        let now = SimTime::from_millis(t);

        // Distribute customer demand; kill superseded working orders.
        for job in source.poll(now) {
            let Some(&i) = index.get(&job.agent) else { continue };
            if let Some(stale) = agents[i].assign(job) {
                if !tracker.is_retired(stale) {
                    let report = exchange.cancel(now, stale)?;
                    tracker.note_messages(&report.messages);
                    deliver(&mut agents, &index, &report, now);
                }
            }
        }

        // One pseudo-randomly chosen agent gets the tick.
        let i = rng.gen_range(0..agents.len());
        let book = exchange.publish_lob(now, config.exchange.tape_tail);
        let time_left = 1.0 - t as f64 / config.virtual_len_ms as f64;

        let mut summary = None;
        if let Some(order) = agents[i].get_order(now, time_left, &book) {
            if let Submission::Processed(report) =
                submit_order(&mut exchange, &mut tracker, now, order)?
            {
                summary = report.summary;
                deliver(&mut agents, &index, &report, now);
            }
        }

        // Everyone observes the post-tick market.
        let book = exchange.publish_lob(now, config.exchange.tape_tail);
        for agent in agents.iter_mut() {
            agent.respond(now, &book, summary.as_ref());
        }

        t += config.tick_ms;
    }

    let now = SimTime::from_millis(config.virtual_len_ms);
    let report = exchange.close(now)?;
    deliver(&mut agents, &index, &report, now);

    Ok(SessionOutcome { session_id: config.session_id.clone(), exchange, agents })
}

/// Concurrent scheduling: one thread per agent plus the coordinator.
/// The main thread drives the customer-order source, then clears the run
/// flag and joins everyone; a missing thread invalidates the session.
pub fn run_concurrent(
    config: &SessionConfig,
    population: Population,
    mut source: Box<dyn OrderSource>,
) -> Result<SessionOutcome, SessionError> {
    let run = Arc::new(AtomicBool::new(true));
    let clock = SessionClock::start(Duration::from_millis(config.real_len_ms), config.virtual_len_ms);
    let poll = Duration::from_millis(config.poll_ms);

    let (order_tx, order_rx) = unbounded::<Order>();
    let (kill_tx, kill_rx) = unbounded::<OrderId>();
    let book = Arc::new(ArcSwap::from_pointee(PublishedBook::empty(
        SimTime::ZERO,
        config.exchange.min_price,
        config.exchange.max_price,
    )));

    let mut egress: HashMap<AgentId, Sender<AgentEvent>> = HashMap::new();
    let mut receivers: Vec<(Box<dyn Agent>, Receiver<AgentEvent>)> = Vec::new();
    for agent in population.agents {
        let (tx, rx) = unbounded();
        egress.insert(agent.id().clone(), tx);
        receivers.push((agent, rx));
    }

    let coordinator = Coordinator::new(
        Exchange::new(config.exchange.clone()),
        order_rx,
        kill_rx,
        egress.clone(),
        Arc::clone(&book),
        Arc::clone(&run),
        clock.clone(),
        poll,
    );
    let coordinator_handle = thread::Builder::new()
        .name("exchange-coordinator".to_string())
        .spawn(move || coordinator.run())
        .expect("failed to spawn coordinator thread");

    let mut agent_handles = Vec::with_capacity(receivers.len());
    for (agent, rx) in receivers {
        let name = format!("agent-{}", agent.id());
        let order_tx = order_tx.clone();
        let kill_tx = kill_tx.clone();
        let book = Arc::clone(&book);
        let run = Arc::clone(&run);
        let clock = clock.clone();
        agent_handles.push(
            thread::Builder::new()
                .name(name)
                .spawn(move || agent_loop(agent, rx, order_tx, kill_tx, book, run, clock, poll))
                .expect("failed to spawn agent thread"),
        );
    }

    // Drive customer demand until the wall clock runs out.
    while !clock.expired() {
        for job in source.poll(clock.now()) {
            if let Some(tx) = egress.get(&job.agent) {
                let _ = tx.send(AgentEvent::Assignment(job));
            }
        }
        thread::sleep(poll);
    }

    // Signal stop; every unit must observe it within one poll interval.
    run.store(false, Ordering::Release);

    let expected = agent_handles.len();
    let mut agents = Vec::with_capacity(expected);
    for handle in agent_handles {
        if let Ok(agent) = handle.join() {
            agents.push(agent);
        }
    }

    let exchange = match coordinator_handle.join() {
        Ok(result) => result?,
        Err(_) => return Err(SessionError::CoordinatorCrashed),
    };

    if agents.len() != expected {
        return Err(SessionError::UnitCrashed { expected, joined: agents.len() });
    }

    Ok(SessionOutcome { session_id: config.session_id.clone(), exchange, agents })
}

/// One agent's thread: drain notifications, observe, maybe submit.
#[allow(clippy::too_many_arguments)]
fn agent_loop(
    mut agent: Box<dyn Agent>,
    events: Receiver<AgentEvent>,
    order_tx: Sender<Order>,
    kill_tx: Sender<OrderId>,
    book: Arc<ArcSwap<PublishedBook>>,
    run: Arc<AtomicBool>,
    clock: SessionClock,
    poll: Duration,
) -> Box<dyn Agent> {
    while run.load(Ordering::Acquire) {
        let now = clock.now();

        let mut last_trade: Option<TradeSummary> = None;
        while let Ok(event) = events.try_recv() {
            match event {
                AgentEvent::Assignment(job) => {
                    if let Some(stale) = agent.assign(job) {
                        let _ = kill_tx.send(stale);
                    }
                }
                AgentEvent::Message(msg) => agent.bookkeep(&msg, now),
                AgentEvent::Trade(summary) => last_trade = Some(summary),
            }
        }

        let snapshot = book.load_full();
        agent.respond(now, &snapshot, last_trade.as_ref());
        if let Some(order) = agent.get_order(now, clock.time_left(), &snapshot) {
            let _ = order_tx.send(order);
        }

        thread::sleep(poll);
    }
    agent
}

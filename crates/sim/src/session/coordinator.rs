//! The single-writer coordinator.
//!
//! Exactly one thread owns all exchange mutable state. It drains advisory
//! kills and then one order at a time from the ingress channel, fans the
//! resulting messages out through per-agent egress channels, and refreshes
//! the published snapshot slot. No locking anywhere: the coordinator is
//! the sole writer, agents only ever see channel messages and snapshots.

use crate::agents::CustomerOrder;
use crate::session::SessionError;
use crate::session::clock::SessionClock;
use agora_core::{
    AgentId, CustomerRef, ExchangeMsg, Order, OrderEvent, OrderId, OrderStyle, PublishedBook,
    SimTime, TradeSummary,
};
use agora_engine::{Exchange, ProcessReport};
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Everything an agent can receive from the harness.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A new unit of customer demand to work.
    Assignment(CustomerOrder),
    /// An outcome for one of the agent's orders.
    Message(ExchangeMsg),
    /// An anonymized trade happened somewhere in the market.
    Trade(TradeSummary),
}

/// Terminal-state tracking for idempotent handling of races.
///
/// A fill and an independent cancellation may target the same customer
/// reference in the same tick; whichever resolves first wins and the
/// loser is silently discarded, so the affected agent sees exactly one
/// terminal message per order.
///
/// A reference counts as resolved only once its demand has executed
/// (FILL, or a taker PART whose remainder was dropped). A cancellation
/// retires the order id but leaves the reference workable: agents cancel
/// and re-quote the same customer order all the time.
#[derive(Debug, Default)]
pub(crate) struct RefTracker {
    /// Customer refs whose demand has executed.
    resolved: HashSet<CustomerRef>,
    /// Acknowledged live orders, by exchange id.
    live: HashMap<OrderId, CustomerRef>,
    /// Ids that have reached a terminal state.
    retired: HashSet<OrderId>,
}

impl RefTracker {
    pub fn is_resolved(&self, customer_ref: CustomerRef) -> bool {
        self.resolved.contains(&customer_ref)
    }

    pub fn is_retired(&self, id: OrderId) -> bool {
        self.retired.contains(&id)
    }

    /// Track the entry order of a report: live once acknowledged, retired
    /// once terminal, resolved once executed. (A taker PART is terminal:
    /// its remainder is dropped with it.)
    pub fn note_report(&mut self, customer_ref: CustomerRef, report: &ProcessReport) {
        let Some(id) = report.order_id else {
            return;
        };

        let mut acked = false;
        let mut terminal = false;
        let mut executed = false;
        for msg in report.messages.iter().filter(|m| m.order_id == id) {
            match msg.event {
                OrderEvent::Ack => acked = true,
                OrderEvent::Fill { .. } | OrderEvent::Part { .. } => {
                    terminal = true;
                    executed = true;
                }
                OrderEvent::Fail | OrderEvent::Cancelled => terminal = true,
            }
        }

        if terminal {
            self.live.remove(&id);
            self.retired.insert(id);
            if executed {
                self.resolved.insert(customer_ref);
            }
        } else if acked {
            self.live.insert(id, customer_ref);
        }
    }

    /// Track terminal outcomes for previously live orders, wherever they
    /// appear. A maker PART leaves the order live; only a FILL resolves
    /// the reference behind it.
    pub fn note_messages(&mut self, messages: &[ExchangeMsg]) {
        for msg in messages {
            match msg.event {
                OrderEvent::Fill { .. } => {
                    if let Some(customer_ref) = self.live.remove(&msg.order_id) {
                        self.resolved.insert(customer_ref);
                    }
                    self.retired.insert(msg.order_id);
                }
                OrderEvent::Fail | OrderEvent::Cancelled => {
                    self.live.remove(&msg.order_id);
                    self.retired.insert(msg.order_id);
                }
                OrderEvent::Ack | OrderEvent::Part { .. } => {}
            }
        }
    }
}

pub(crate) enum Submission {
    Processed(ProcessReport),
    Discarded,
}

/// Shared submission path for both scheduling modes: idempotence checks in
/// front of the engine, tracking updates behind it.
pub(crate) fn submit_order(
    exchange: &mut Exchange,
    tracker: &mut RefTracker,
    now: SimTime,
    order: Order,
) -> Result<Submission, SessionError> {
    if let OrderStyle::Cancel { target } = order.style {
        if tracker.is_retired(target) {
            tracing::debug!(order = %target, "stale cancel absorbed");
            return Ok(Submission::Discarded);
        }
        let report = exchange.cancel(now, target)?;
        tracker.note_messages(&report.messages);
        return Ok(Submission::Processed(report));
    }

    if tracker.is_resolved(order.customer_ref) {
        tracing::debug!(customer_ref = %order.customer_ref, "duplicate order for resolved reference discarded");
        return Ok(Submission::Discarded);
    }

    let customer_ref = order.customer_ref;
    let report = exchange.process_order(now, order)?;
    tracker.note_report(customer_ref, &report);
    tracker.note_messages(&report.messages);
    Ok(Submission::Processed(report))
}

pub(crate) struct Coordinator {
    exchange: Exchange,
    ingress: Receiver<Order>,
    kills: Receiver<OrderId>,
    egress: HashMap<AgentId, Sender<AgentEvent>>,
    book: Arc<ArcSwap<PublishedBook>>,
    run: Arc<AtomicBool>,
    clock: SessionClock,
    poll: Duration,
    tracker: RefTracker,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange: Exchange,
        ingress: Receiver<Order>,
        kills: Receiver<OrderId>,
        egress: HashMap<AgentId, Sender<AgentEvent>>,
        book: Arc<ArcSwap<PublishedBook>>,
        run: Arc<AtomicBool>,
        clock: SessionClock,
        poll: Duration,
    ) -> Self {
        Coordinator {
            exchange,
            ingress,
            kills,
            egress,
            book,
            run,
            clock,
            poll,
            tracker: RefTracker::default(),
        }
    }

    /// Main loop: open, serialize all order flow, close, hand the exchange
    /// back for session-end artifacts.
    pub fn run(mut self) -> Result<Exchange, SessionError> {
        tracing::info!("coordinator started");

        let report = self.exchange.open(self.clock.now())?;
        self.dispatch(report);
        self.publish();

        while self.run.load(Ordering::Acquire) {
            self.drain_kills()?;
            match self.ingress.recv_timeout(self.poll) {
                Ok(order) => self.handle_order(order)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let report = self.exchange.close(self.clock.now())?;
        self.dispatch(report);
        self.publish();

        tracing::info!("coordinator stopped");
        Ok(self.exchange)
    }

    /// Advisory kills are drained ahead of each order; a kill racing a
    /// fill arrives late, finds the id retired, and is absorbed.
    fn drain_kills(&mut self) -> Result<(), SessionError> {
        while let Ok(id) = self.kills.try_recv() {
            if self.tracker.is_retired(id) {
                tracing::debug!(order = %id, "stale kill absorbed");
                continue;
            }
            let now = self.clock.now();
            let report = self.exchange.cancel(now, id)?;
            self.tracker.note_messages(&report.messages);
            self.dispatch(report);
            self.publish();
        }
        Ok(())
    }

    fn handle_order(&mut self, order: Order) -> Result<(), SessionError> {
        let now = self.clock.now();
        if let Submission::Processed(report) =
            submit_order(&mut self.exchange, &mut self.tracker, now, order)?
        {
            self.dispatch(report);
            self.publish();
        }
        Ok(())
    }

    /// Fan messages out to their agents, and trade summaries to everyone.
    /// A gone agent's queue is simply skipped; it never blocks us.
    fn dispatch(&self, report: ProcessReport) {
        let summary = report.summary;
        for msg in report.messages {
            if let Some(tx) = self.egress.get(&msg.agent) {
                let _ = tx.send(AgentEvent::Message(msg));
            }
        }
        if let Some(summary) = summary {
            for tx in self.egress.values() {
                let _ = tx.send(AgentEvent::Trade(summary));
            }
        }
    }

    fn publish(&self) {
        let tail = self.exchange.config().tape_tail;
        let book = self.exchange.publish_lob(self.clock.now(), tail);
        self.book.store(Arc::new(book));
    }
}

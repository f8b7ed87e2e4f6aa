//! The agent trait and the shared order/balance ledger.

use agora_core::{
    AgentId, CustomerRef, ExchangeMsg, FillRecord, Order, OrderEvent, OrderId, OrderStyle, Price,
    PublishedBook, Quantity, Side, SimTime, TradeSummary,
};

/// A unit of customer demand assigned to an agent: trade up to `qty` on
/// `side`, never worse than `limit`.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerOrder {
    pub customer_ref: CustomerRef,
    pub agent: AgentId,
    pub side: Side,
    pub limit: Price,
    pub qty: Quantity,
    pub issued: SimTime,
}

/// A trading agent, driven entirely by the harness.
///
/// Agents never touch exchange state: they read published snapshots,
/// receive their messages through `bookkeep`, and produce at most one
/// order per wake-up.
pub trait Agent: Send {
    fn id(&self) -> &AgentId;

    /// Kind tag for per-type summaries ("ZIC", "SHVR", ...).
    fn kind(&self) -> &'static str;

    /// Deliver a new customer assignment, replacing the current one.
    /// Returns the exchange id of the superseded working order, which the
    /// harness should kill.
    fn assign(&mut self, job: CustomerOrder) -> Option<OrderId>;

    /// The agent's one submission opportunity this wake-up.
    /// `time_left` is the remaining fraction of the session in [0, 1].
    fn get_order(&mut self, time: SimTime, time_left: f64, book: &PublishedBook) -> Option<Order>;

    /// Observe the published book and the latest trade, if any. May mutate
    /// internal pricing state; returns nothing.
    fn respond(&mut self, time: SimTime, book: &PublishedBook, last_trade: Option<&TradeSummary>);

    /// Deliver one order outcome.
    fn bookkeep(&mut self, msg: &ExchangeMsg, time: SimTime);

    /// Accumulated trade surplus net of fees.
    fn balance(&self) -> i64;

    /// Number of executions bookkept so far.
    fn n_trades(&self) -> u64;
}

/// Order and balance bookkeeping shared by the simple traders: one
/// customer job at a time, at most one working order at the exchange.
#[derive(Debug, Default)]
pub struct AgentLedger {
    /// Current customer demand, if any.
    job: Option<CustomerOrder>,
    /// The demand the outstanding order was quoted against. Differs from
    /// `job` when a new assignment arrives before the old order resolves.
    working: Option<CustomerOrder>,
    /// Exchange id of the working order, once acknowledged.
    live: Option<OrderId>,
    /// An order has been submitted but no message has come back yet.
    in_flight: bool,
    /// The working order was superseded before its ack arrived; kill it
    /// as soon as its id is known.
    kill_on_ack: bool,
    balance: i64,
    n_trades: u64,
}

impl AgentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job(&self) -> Option<&CustomerOrder> {
        self.job.as_ref()
    }

    pub fn live(&self) -> Option<OrderId> {
        self.live
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn n_trades(&self) -> u64 {
        self.n_trades
    }

    /// Is the agent free to submit a fresh quote for its current job?
    pub fn can_quote(&self) -> bool {
        self.job.is_some() && self.live.is_none() && !self.in_flight && !self.kill_on_ack
    }

    /// Accept a new job; hand back the superseded working order for the
    /// harness to kill.
    pub fn assign(&mut self, job: CustomerOrder) -> Option<OrderId> {
        self.job = Some(job);
        if self.in_flight && self.live.is_none() {
            self.kill_on_ack = true;
        }
        self.live.take()
    }

    /// Build a limit order for the current job at `price`.
    pub fn quote(&mut self, agent: &AgentId, price: Price, time: SimTime) -> Option<Order> {
        let job = self.job.clone()?;
        let order = Order::limit(agent.clone(), job.side, price, job.qty, time, job.customer_ref);
        self.working = Some(job);
        self.in_flight = true;
        Some(order)
    }

    /// Build a cancel for a working order that was superseded before its
    /// ack arrived, if one is due.
    pub fn cancel_order(&mut self, agent: &AgentId, time: SimTime) -> Option<Order> {
        if !self.kill_on_ack {
            return None;
        }
        let target = self.live.take()?;
        self.kill_on_ack = false;
        let working = self.working.take();
        let (side, customer_ref) = working
            .map(|w| (w.side, w.customer_ref))
            .unwrap_or((Side::Bid, CustomerRef::new(0)));
        Some(Order::new(
            agent.clone(),
            side,
            OrderStyle::Cancel { target },
            Price::ZERO,
            Quantity::new(0),
            time,
            customer_ref,
        ))
    }

    /// Apply one exchange message. Maker partial fills leave the order
    /// working; everything else terminal clears it.
    pub fn note(&mut self, msg: &ExchangeMsg) {
        self.balance += msg.balance_delta;
        let was_acked = self.live == Some(msg.order_id);

        match &msg.event {
            OrderEvent::Ack => {
                self.live = Some(msg.order_id);
                self.in_flight = false;
            }
            OrderEvent::Fill { fills } => {
                self.score(fills);
                self.consume_working();
                self.clear_order_state();
            }
            OrderEvent::Part { fills, .. } => {
                self.score(fills);
                if !was_acked {
                    // Taker partial: the remainder was dropped with it.
                    self.consume_working();
                    self.clear_order_state();
                }
            }
            OrderEvent::Fail | OrderEvent::Cancelled => {
                // The demand behind the order is still workable.
                self.working = None;
                self.clear_order_state();
            }
        }
    }

    fn clear_order_state(&mut self) {
        self.live = None;
        self.in_flight = false;
        self.kill_on_ack = false;
    }

    /// The working order executed: its demand is satisfied. The current
    /// job survives only if it is a newer assignment.
    fn consume_working(&mut self) {
        if let (Some(working), Some(job)) = (&self.working, &self.job) {
            if working.customer_ref == job.customer_ref {
                self.job = None;
            }
        }
        self.working = None;
    }

    /// Surplus against the customer limit, per executed unit.
    fn score(&mut self, fills: &[FillRecord]) {
        let Some(working) = self.working.clone() else { return };
        for fill in fills {
            let per_unit = match working.side {
                Side::Bid => working.limit.ticks() - fill.price.ticks(),
                Side::Ask => fill.price.ticks() - working.limit.ticks(),
            };
            self.balance += per_unit * fill.qty.units() as i64;
            self.n_trades += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(r: u64, side: Side, limit: i64) -> CustomerOrder {
        CustomerOrder {
            customer_ref: CustomerRef::new(r),
            agent: AgentId::new("B00"),
            side,
            limit: Price::new(limit),
            qty: Quantity::new(2),
            issued: SimTime::ZERO,
        }
    }

    fn fill_msg(id: u64, price: i64, qty: u64) -> ExchangeMsg {
        ExchangeMsg::new(
            AgentId::new("B00"),
            OrderId::new(id),
            OrderEvent::Fill { fills: vec![FillRecord { price: Price::new(price), qty: Quantity::new(qty) }] },
            1,
        )
    }

    #[test]
    fn surplus_is_scored_against_the_working_limit() {
        let mut ledger = AgentLedger::new();
        ledger.assign(job(1, Side::Bid, 110));
        ledger.quote(&AgentId::new("B00"), Price::new(105), SimTime::ZERO).unwrap();

        ledger.note(&fill_msg(7, 100, 2));
        // Two units bought at 100 against a 110 limit, minus the 1-tick fee.
        assert_eq!(ledger.balance(), 2 * 10 - 1);
        assert_eq!(ledger.n_trades(), 2);
        assert!(ledger.job().is_none());
        assert!(!ledger.can_quote());
    }

    #[test]
    fn replacement_before_ack_kills_on_ack() {
        let mut ledger = AgentLedger::new();
        ledger.assign(job(1, Side::Bid, 110));
        ledger.quote(&AgentId::new("B00"), Price::new(105), SimTime::ZERO).unwrap();

        // New demand lands while the first quote is still in flight.
        assert_eq!(ledger.assign(job(2, Side::Bid, 120)), None);
        assert!(!ledger.can_quote());

        // The ack for the stale order arrives; the ledger wants it dead.
        ledger.note(&ExchangeMsg::new(AgentId::new("B00"), OrderId::new(3), OrderEvent::Ack, 0));
        let cancel = ledger.cancel_order(&AgentId::new("B00"), SimTime::ZERO).unwrap();
        assert!(matches!(cancel.style, OrderStyle::Cancel { target } if target == OrderId::new(3)));

        // Once the cancel confirms, the new job is quotable.
        ledger.note(&ExchangeMsg::new(AgentId::new("B00"), OrderId::new(3), OrderEvent::Cancelled, 0));
        assert!(ledger.can_quote());
    }

    #[test]
    fn late_fill_scores_against_the_old_job() {
        let mut ledger = AgentLedger::new();
        ledger.assign(job(1, Side::Bid, 110));
        ledger.quote(&AgentId::new("B00"), Price::new(105), SimTime::ZERO).unwrap();
        ledger.note(&ExchangeMsg::new(AgentId::new("B00"), OrderId::new(3), OrderEvent::Ack, 0));

        // A newer, richer job arrives; the old order fills anyway.
        let killed = ledger.assign(job(2, Side::Bid, 200));
        assert_eq!(killed, Some(OrderId::new(3)));
        ledger.note(&fill_msg(3, 105, 2));

        // Scored at the old 110 limit, not the new 200 one.
        assert_eq!(ledger.balance(), 2 * 5 - 1);
        // The new job is still there to be worked.
        assert!(ledger.job().is_some());
        assert!(ledger.can_quote());
    }
}

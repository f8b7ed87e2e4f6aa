//! A pool: one order book (bid side + ask side) with deferred open/close
//! lists, a resting list for all-or-none orders, and the per-style routing
//! that decides how an arriving order meets the book.
//!
//! Composite styles (OSO/OCO/ICE) never reach a pool; the exchange expands
//! them into the simple orders handled here.

use crate::book_side::{BookResponse, OrderBookSide};
use crate::config::ExchangeConfig;
use crate::error::EngineError;
use crate::matching::crosses;
use agora_core::{
    AgentId, ExchangeMsg, LastTrade, Order, OrderEvent, OrderId, OrderStyle, PoolId, Price,
    Quantity, Side, SimTime, TapeEvent,
};

/// Market state machine: deferred on-open orders run on the transition to
/// `Open`, on-close orders and good-for-day expiry on the transition to
/// `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketPhase {
    Closed,
    Open,
}

pub struct Pool {
    id: PoolId,
    bids: OrderBookSide,
    asks: OrderBookSide,
    /// LOO/MOO awaiting `open()`, in arrival order.
    on_open: Vec<Order>,
    /// LOC/MOC awaiting `close()`, in arrival order.
    on_close: Vec<Order>,
    /// AON orders awaiting enough liquidity, in arrival order.
    resting: Vec<Order>,
    phase: MarketPhase,
    last_trade: Option<LastTrade>,
}

impl Pool {
    pub fn new(id: PoolId, config: &ExchangeConfig) -> Self {
        Pool {
            id,
            bids: OrderBookSide::new(Side::Bid, config.min_price),
            asks: OrderBookSide::new(Side::Ask, config.max_price),
            on_open: Vec::new(),
            on_close: Vec::new(),
            resting: Vec::new(),
            phase: MarketPhase::Closed,
            last_trade: None,
        }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn phase(&self) -> MarketPhase {
        self.phase
    }

    pub fn bids(&self) -> &OrderBookSide {
        &self.bids
    }

    pub fn asks(&self) -> &OrderBookSide {
        &self.asks
    }

    pub fn last_trade(&self) -> Option<LastTrade> {
        self.last_trade
    }

    pub fn side(&self, side: Side) -> &OrderBookSide {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut OrderBookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    fn opposite_mut(&mut self, side: Side) -> &mut OrderBookSide {
        self.side_mut(side.opposite())
    }

    /// Is the order live anywhere in this pool (book, resting, deferred)?
    pub fn contains(&self, id: OrderId) -> bool {
        self.bids.contains(id)
            || self.asks.contains(id)
            || self.holds_deferred(id)
    }

    fn holds_deferred(&self, id: OrderId) -> bool {
        self.resting.iter().chain(&self.on_open).chain(&self.on_close).any(|o| o.id == Some(id))
    }

    /// Route one simple (non-composite) order to its style handler.
    pub fn submit(
        &mut self,
        time: SimTime,
        order: Order,
        fee: i64,
    ) -> Result<BookResponse, EngineError> {
        match order.style {
            OrderStyle::Limit | OrderStyle::GoodForDay => self.process_limit(time, order, fee),
            OrderStyle::Market
            | OrderStyle::ImmediateOrCancel
            | OrderStyle::FillOrKill
            | OrderStyle::AllOrNone => self.process_take(time, order, fee),
            OrderStyle::LimitOnOpen | OrderStyle::MarketOnOpen => self.defer_open(order),
            OrderStyle::LimitOnClose | OrderStyle::MarketOnClose => self.defer_close(order),
            OrderStyle::Cancel { target } => self.cancel(time, target),
            OrderStyle::CancelAll => self.cancel_agent(time, &order.agent),
            OrderStyle::OneCancelsOther(_)
            | OrderStyle::OneSendsOther(_)
            | OrderStyle::Iceberg { .. } => Err(EngineError::UnroutedComposite),
        }
    }

    /// LIM/GFD: a price that crosses the spread executes immediately with
    /// IOC semantics (remainder dropped); otherwise the order rests and
    /// its acceptance is acknowledged.
    fn process_limit(
        &mut self,
        time: SimTime,
        mut order: Order,
        fee: i64,
    ) -> Result<BookResponse, EngineError> {
        let opposite_best = self.side(order.side.opposite()).best_price();
        if crosses(&order, opposite_best) {
            tracing::debug!(order = %order, "limit crosses the spread, reclassified as IOC");
            order.style = OrderStyle::ImmediateOrCancel;
            return self.process_take(time, order, fee);
        }

        let id = order.id.ok_or(EngineError::UnassignedOrder)?;
        let ack = ExchangeMsg::new(order.agent.clone(), id, OrderEvent::Ack, 0);
        self.side_mut(order.side).insert(order)?;
        Ok(BookResponse { messages: vec![ack], tape: Vec::new() })
    }

    /// MKT/IOC/FOK/AON: consume opposite-side liquidity. A failed AON that
    /// has not yet expired rests silently and is retried by the sweep; its
    /// fee is charged once, on its eventual terminal outcome.
    fn process_take(
        &mut self,
        time: SimTime,
        mut order: Order,
        fee: i64,
    ) -> Result<BookResponse, EngineError> {
        let id = order.id.ok_or(EngineError::UnassignedOrder)?;
        let pool = self.id;
        let resp = self.opposite_mut(order.side).take(time, &mut order, pool, fee);

        if matches!(order.style, OrderStyle::AllOrNone) {
            let failed = resp
                .messages
                .iter()
                .any(|m| m.order_id == id && matches!(m.event, OrderEvent::Fail));
            if failed && !order.is_expired(time) {
                let ack = ExchangeMsg::new(order.agent.clone(), id, OrderEvent::Ack, 0);
                self.resting.push(order);
                return Ok(BookResponse { messages: vec![ack], tape: Vec::new() });
            }
        }
        Ok(resp)
    }

    fn defer_open(&mut self, order: Order) -> Result<BookResponse, EngineError> {
        let id = order.id.ok_or(EngineError::UnassignedOrder)?;
        let ack = ExchangeMsg::new(order.agent.clone(), id, OrderEvent::Ack, 0);
        self.on_open.push(order);
        Ok(BookResponse { messages: vec![ack], tape: Vec::new() })
    }

    fn defer_close(&mut self, order: Order) -> Result<BookResponse, EngineError> {
        let id = order.id.ok_or(EngineError::UnassignedOrder)?;
        let ack = ExchangeMsg::new(order.agent.clone(), id, OrderEvent::Ack, 0);
        self.on_close.push(order);
        Ok(BookResponse { messages: vec![ack], tape: Vec::new() })
    }

    /// Cancel one order wherever it lives. An id this pool has never held
    /// is the caller's protocol error.
    pub fn cancel(&mut self, time: SimTime, target: OrderId) -> Result<BookResponse, EngineError> {
        if self.bids.contains(target) {
            return self.bids.cancel(time, target, self.id);
        }
        if self.asks.contains(target) {
            return self.asks.cancel(time, target, self.id);
        }
        if let Some(order) = remove_by_id(&mut self.resting, target)
            .or_else(|| remove_by_id(&mut self.on_open, target))
            .or_else(|| remove_by_id(&mut self.on_close, target))
        {
            return Ok(cancelled_response(self.id, time, &order, target));
        }
        Err(EngineError::UnknownOrder(target))
    }

    /// Cancel every live order belonging to `agent`, in both book sides and
    /// all deferred lists. Finding nothing is not an error.
    pub fn cancel_agent(
        &mut self,
        time: SimTime,
        agent: &AgentId,
    ) -> Result<BookResponse, EngineError> {
        let mut out = BookResponse::default();
        for side in [Side::Bid, Side::Ask] {
            for id in self.side(side).ids_for_agent(agent) {
                out.extend(self.side_mut(side).cancel(time, id, self.id)?);
            }
        }
        let pool = self.id;
        for list in [&mut self.resting, &mut self.on_open, &mut self.on_close] {
            let mut kept = Vec::with_capacity(list.len());
            for order in list.drain(..) {
                if &order.agent == agent {
                    let id = order.id.ok_or(EngineError::UnassignedOrder)?;
                    out.extend(cancelled_response(pool, time, &order, id));
                } else {
                    kept.push(order);
                }
            }
            *list = kept;
        }
        Ok(out)
    }

    /// Retry resting AON orders after a book change, and sweep out any that
    /// have expired. Repeats until a pass makes no progress.
    pub fn sweep_resting(&mut self, time: SimTime, fee: i64) -> BookResponse {
        let mut out = BookResponse::default();
        loop {
            let mut progressed = false;
            let pending = std::mem::take(&mut self.resting);
            let mut keep = Vec::with_capacity(pending.len());
            for mut order in pending {
                if order.is_expired(time) {
                    let id = order.id.expect("resting order has an id");
                    tracing::debug!(order = %order, "all-or-none expired unfilled");
                    out.messages.push(ExchangeMsg::new(
                        order.agent.clone(),
                        id,
                        OrderEvent::Fail,
                        fee,
                    ));
                    continue;
                }
                let pool = self.id;
                let book = self.opposite_mut(order.side);
                if book.depth_at_or_better(Some(order.price)) >= order.qty {
                    out.extend(book.take(time, &mut order, pool, fee));
                    progressed = true;
                } else {
                    keep.push(order);
                }
            }
            self.resting.extend(keep);
            if !progressed {
                break;
            }
        }
        out
    }

    /// Open for business: run the deferred on-open orders in arrival order
    /// (limit semantics for LOO, market-take for MOO), then transition.
    pub fn open(&mut self, time: SimTime, fee: i64) -> Result<BookResponse, EngineError> {
        let mut out = BookResponse::default();
        for mut order in std::mem::take(&mut self.on_open) {
            order.style = match order.style {
                OrderStyle::LimitOnOpen => OrderStyle::Limit,
                OrderStyle::MarketOnOpen => OrderStyle::Market,
                other => other,
            };
            out.extend(self.submit(time, order, fee)?);
        }
        self.phase = MarketPhase::Open;
        Ok(out)
    }

    /// Close for business: run the deferred on-close orders, then cancel
    /// whatever good-for-day orders are still on the book, then transition.
    pub fn close(&mut self, time: SimTime, fee: i64) -> Result<BookResponse, EngineError> {
        let mut out = BookResponse::default();
        for mut order in std::mem::take(&mut self.on_close) {
            order.style = match order.style {
                OrderStyle::LimitOnClose => OrderStyle::Limit,
                OrderStyle::MarketOnClose => OrderStyle::Market,
                other => other,
            };
            out.extend(self.submit(time, order, fee)?);
        }

        for side in [Side::Bid, Side::Ask] {
            let expired: Vec<OrderId> =
                self.side(side).ids_matching(|o| matches!(o.style, OrderStyle::GoodForDay));
            for id in expired {
                out.extend(self.side_mut(side).cancel(time, id, self.id)?);
            }
        }

        self.phase = MarketPhase::Closed;
        Ok(out)
    }

    /// Record an execution for the published last-trade fields.
    pub fn record_trade(&mut self, time: SimTime, price: Price, qty: Quantity) {
        self.last_trade = Some(LastTrade { time, price, qty });
    }
}

fn remove_by_id(list: &mut Vec<Order>, id: OrderId) -> Option<Order> {
    let pos = list.iter().position(|o| o.id == Some(id))?;
    Some(list.remove(pos))
}

fn cancelled_response(pool: PoolId, time: SimTime, order: &Order, id: OrderId) -> BookResponse {
    BookResponse {
        messages: vec![ExchangeMsg::new(order.agent.clone(), id, OrderEvent::Cancelled, 0)],
        tape: vec![TapeEvent::Cancel { pool, time, order: id, side: order.side, qty: order.qty }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::CustomerRef;

    const FEE: i64 = 1;

    fn pool() -> Pool {
        Pool::new(PoolId::Lit, &ExchangeConfig::default())
    }

    fn order(id: u64, agent: &str, side: Side, style: OrderStyle, price: i64, qty: u64, t: u64) -> Order {
        let mut o = Order::new(
            agent,
            side,
            style,
            Price::new(price),
            Quantity::new(qty),
            SimTime::from_millis(t),
            CustomerRef::new(id),
        );
        o.id = Some(OrderId::new(id));
        o
    }

    #[test]
    fn passive_limit_rests_with_ack() {
        let mut p = pool();
        let resp = p.submit(SimTime::ZERO, order(1, "B00", Side::Bid, OrderStyle::Limit, 100, 10, 0), FEE).unwrap();
        assert_eq!(resp.messages.len(), 1);
        assert!(matches!(resp.messages[0].event, OrderEvent::Ack));
        assert_eq!(p.bids().best_price(), Some(Price::new(100)));
        assert_eq!(p.bids().qty_at(Price::new(100)), Quantity::new(10));
    }

    #[test]
    fn crossing_limit_executes_as_ioc() {
        let mut p = pool();
        p.submit(SimTime::ZERO, order(1, "S00", Side::Ask, OrderStyle::Limit, 100, 5, 0), FEE).unwrap();

        // Bid at 102 crosses the 100 ask: executes at the resting price.
        let resp = p.submit(SimTime::from_millis(1), order(2, "B00", Side::Bid, OrderStyle::Limit, 102, 5, 1), FEE).unwrap();
        let taker = resp.messages.iter().find(|m| m.order_id == OrderId::new(2)).unwrap();
        match &taker.event {
            OrderEvent::Fill { fills } => assert_eq!(fills[0].price, Price::new(100)),
            other => panic!("expected FILL, got {}", other.tag()),
        }
        assert!(p.asks().is_empty());
        assert!(p.bids().is_empty());
    }

    #[test]
    fn crossing_limit_remainder_is_dropped() {
        let mut p = pool();
        p.submit(SimTime::ZERO, order(1, "S00", Side::Ask, OrderStyle::Limit, 100, 3, 0), FEE).unwrap();

        let resp = p.submit(SimTime::from_millis(1), order(2, "B00", Side::Bid, OrderStyle::Limit, 100, 8, 1), FEE).unwrap();
        let taker = resp.messages.iter().filter(|m| m.order_id == OrderId::new(2)).last().unwrap();
        assert!(matches!(taker.event, OrderEvent::Part { .. }));
        // IOC semantics: nothing rests on the bid side.
        assert!(p.bids().is_empty());
    }

    #[test]
    fn aon_rests_until_liquidity_arrives() {
        let mut p = pool();
        let aon = order(1, "B00", Side::Bid, OrderStyle::AllOrNone, 100, 10, 0)
            .with_expiry(SimTime::from_millis(10_000));
        let resp = p.submit(SimTime::ZERO, aon, FEE).unwrap();
        // Suppressed failure: just an acknowledgement, no FAIL, book untouched.
        assert_eq!(resp.messages.len(), 1);
        assert!(matches!(resp.messages[0].event, OrderEvent::Ack));

        // A 6-lot ask is not enough; the sweep leaves the AON resting.
        p.submit(SimTime::from_millis(1), order(2, "S00", Side::Ask, OrderStyle::Limit, 100, 6, 1), FEE).unwrap();
        let swept = p.sweep_resting(SimTime::from_millis(1), FEE);
        assert!(swept.messages.is_empty());

        // Another 4 lots complete the picture: the AON fills in one piece.
        p.submit(SimTime::from_millis(2), order(3, "S01", Side::Ask, OrderStyle::Limit, 100, 4, 2), FEE).unwrap();
        let swept = p.sweep_resting(SimTime::from_millis(2), FEE);
        let taker = swept.messages.iter().filter(|m| m.order_id == OrderId::new(1)).last().unwrap();
        match &taker.event {
            OrderEvent::Fill { fills } => {
                let total: Quantity = fills.iter().map(|f| f.qty).sum();
                assert_eq!(total, Quantity::new(10));
            }
            other => panic!("expected FILL, got {}", other.tag()),
        }
        assert_eq!(taker.fee, FEE);
        assert!(p.asks().is_empty());
    }

    #[test]
    fn aon_expires_with_fail() {
        let mut p = pool();
        let aon = order(1, "B00", Side::Bid, OrderStyle::AllOrNone, 100, 10, 0)
            .with_expiry(SimTime::from_millis(50));
        p.submit(SimTime::ZERO, aon, FEE).unwrap();

        let swept = p.sweep_resting(SimTime::from_millis(60), FEE);
        assert_eq!(swept.messages.len(), 1);
        assert!(matches!(swept.messages[0].event, OrderEvent::Fail));
        assert_eq!(swept.messages[0].fee, FEE);
    }

    #[test]
    fn on_open_orders_run_at_open_in_arrival_order() {
        let mut p = pool();
        p.submit(SimTime::ZERO, order(1, "S00", Side::Ask, OrderStyle::LimitOnOpen, 100, 5, 0), FEE).unwrap();
        p.submit(SimTime::from_millis(1), order(2, "B00", Side::Bid, OrderStyle::MarketOnOpen, 0, 5, 1), FEE).unwrap();
        assert_eq!(p.phase(), MarketPhase::Closed);
        assert!(p.asks().is_empty());

        let resp = p.open(SimTime::from_millis(2), FEE).unwrap();
        assert_eq!(p.phase(), MarketPhase::Open);
        // The LOO rested first, then the MOO consumed it.
        assert_eq!(resp.tape.len(), 1);
        assert!(p.asks().is_empty());
        assert!(p.bids().is_empty());
    }

    #[test]
    fn close_runs_deferred_then_cancels_gfd() {
        let mut p = pool();
        p.submit(SimTime::ZERO, order(1, "B00", Side::Bid, OrderStyle::GoodForDay, 90, 5, 0), FEE).unwrap();
        p.submit(SimTime::from_millis(1), order(2, "S00", Side::Ask, OrderStyle::LimitOnClose, 95, 5, 1), FEE).unwrap();

        let resp = p.close(SimTime::from_millis(100), FEE).unwrap();
        assert_eq!(p.phase(), MarketPhase::Closed);
        // The LOC rested (no cross at 95 vs bid 90), the GFD was cancelled.
        let cancelled: Vec<_> = resp
            .messages
            .iter()
            .filter(|m| matches!(m.event, OrderEvent::Cancelled))
            .collect();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].order_id, OrderId::new(1));
        assert!(p.bids().is_empty());
        assert_eq!(p.asks().qty_at(Price::new(95)), Quantity::new(5));
    }

    #[test]
    fn cancel_reaches_deferred_lists() {
        let mut p = pool();
        let aon = order(1, "B00", Side::Bid, OrderStyle::AllOrNone, 100, 10, 0)
            .with_expiry(SimTime::from_millis(10_000));
        p.submit(SimTime::ZERO, aon, FEE).unwrap();

        let resp = p.cancel(SimTime::from_millis(5), OrderId::new(1)).unwrap();
        assert!(matches!(resp.messages[0].event, OrderEvent::Cancelled));
        assert!(!p.contains(OrderId::new(1)));
    }

    #[test]
    fn cancel_all_clears_one_agent_only() {
        let mut p = pool();
        p.submit(SimTime::ZERO, order(1, "B00", Side::Bid, OrderStyle::Limit, 100, 5, 0), FEE).unwrap();
        p.submit(SimTime::ZERO, order(2, "B00", Side::Ask, OrderStyle::Limit, 110, 5, 0), FEE).unwrap();
        p.submit(SimTime::ZERO, order(3, "B01", Side::Bid, OrderStyle::Limit, 99, 5, 0), FEE).unwrap();

        let resp = p.cancel_agent(SimTime::from_millis(1), &AgentId::new("B00")).unwrap();
        assert_eq!(resp.messages.len(), 2);
        assert!(!p.contains(OrderId::new(1)));
        assert!(!p.contains(OrderId::new(2)));
        assert!(p.contains(OrderId::new(3)));
    }
}

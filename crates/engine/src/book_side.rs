//! One side of one pool's order book.
//!
//! The authoritative state is the id-keyed order map. The price-ordered
//! level list and the anonymized (price, quantity) projection are derived
//! from it and rebuilt after every mutation, so they are always consistent
//! with the map when read.

use crate::error::EngineError;
use agora_core::{
    AgentId, ExchangeMsg, Order, OrderEvent, OrderId, PoolId, Price, Quantity, Side, SimTime,
    TapeEvent,
};
use std::collections::HashMap;

/// Messages and tape events produced by one book operation.
#[derive(Debug, Default)]
pub struct BookResponse {
    pub messages: Vec<ExchangeMsg>,
    pub tape: Vec<TapeEvent>,
}

impl BookResponse {
    pub fn extend(&mut self, other: BookResponse) {
        self.messages.extend(other.messages);
        self.tape.extend(other.tape);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.tape.is_empty()
    }
}

/// One price level of the derived book: FIFO queue of order ids, earliest
/// submit time first.
#[derive(Debug, Clone)]
pub(crate) struct Level {
    pub price: Price,
    pub queue: Vec<OrderId>,
}

pub struct OrderBookSide {
    side: Side,
    worst: Price,
    /// Authoritative live-order set.
    orders: HashMap<OrderId, Order>,
    /// Derived: price levels sorted best first.
    levels: Vec<Level>,
    /// Derived: anonymized (price, aggregate quantity), best first.
    anon: Vec<(Price, Quantity)>,
}

impl OrderBookSide {
    pub fn new(side: Side, worst: Price) -> Self {
        OrderBookSide { side, worst, orders: HashMap::new(), levels: Vec::new(), anon: Vec::new() }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn worst_price(&self) -> Price {
        self.worst
    }

    pub fn n_orders(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.orders.contains_key(&id)
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Best price among non-empty levels: highest bid, lowest ask.
    pub fn best_price(&self) -> Option<Price> {
        self.levels.first().map(|l| l.price)
    }

    /// The anonymized projection, best level first.
    pub fn anon_levels(&self) -> &[(Price, Quantity)] {
        &self.anon
    }

    /// Aggregate quantity resting at exactly `price`, per the projection.
    pub fn qty_at(&self, price: Price) -> Quantity {
        self.anon
            .iter()
            .find(|(p, _)| *p == price)
            .map(|(_, q)| *q)
            .unwrap_or(Quantity::ZERO)
    }

    /// Ids of every live order belonging to `agent`.
    pub fn ids_for_agent(&self, agent: &AgentId) -> Vec<OrderId> {
        let mut ids: Vec<OrderId> =
            self.orders.values().filter(|o| &o.agent == agent).filter_map(|o| o.id).collect();
        ids.sort();
        ids
    }

    /// Ids of live orders satisfying a predicate (close-time GFD expiry).
    pub fn ids_matching(&self, pred: impl Fn(&Order) -> bool) -> Vec<OrderId> {
        let mut ids: Vec<OrderId> =
            self.orders.values().filter(|o| pred(o)).filter_map(|o| o.id).collect();
        ids.sort();
        ids
    }

    /// Cumulative quantity available at prices acceptable to `limit`
    /// (`None` means every price is acceptable, as for a market order).
    pub fn depth_at_or_better(&self, limit: Option<Price>) -> Quantity {
        let mut depth = Quantity::ZERO;
        for (price, qty) in &self.anon {
            match limit {
                Some(limit) if !self.side.at_or_better(*price, limit) => break,
                _ => depth += *qty,
            }
        }
        depth
    }

    /// Insert a resting order. Produces no message; the caller acknowledges
    /// acceptance. A duplicate id is protocol misuse.
    pub fn insert(&mut self, order: Order) -> Result<(), EngineError> {
        let id = order.id.ok_or(EngineError::UnassignedOrder)?;
        if self.orders.contains_key(&id) {
            return Err(EngineError::DuplicateOrder(id));
        }
        self.orders.insert(id, order);
        self.rebuild();
        Ok(())
    }

    /// Remove a named order. On success the owning agent is told and a
    /// cancel event is written for the tape; an absent id is protocol
    /// misuse.
    pub fn cancel(
        &mut self,
        time: SimTime,
        id: OrderId,
        pool: PoolId,
    ) -> Result<BookResponse, EngineError> {
        let order = self.orders.remove(&id).ok_or(EngineError::UnknownOrder(id))?;
        self.rebuild();

        let mut resp = BookResponse::default();
        resp.messages.push(ExchangeMsg::new(order.agent.clone(), id, OrderEvent::Cancelled, 0));
        resp.tape.push(TapeEvent::Cancel { pool, time, order: id, side: order.side, qty: order.qty });
        Ok(resp)
    }

    /// Rebuild the derived views from the authoritative map.
    pub(crate) fn rebuild(&mut self) {
        let mut by_price: HashMap<Price, Vec<&Order>> = HashMap::new();
        for order in self.orders.values() {
            by_price.entry(order.price).or_default().push(order);
        }

        let mut levels: Vec<Level> = by_price
            .into_iter()
            .map(|(price, mut orders)| {
                orders.sort_by_key(|o| (o.submitted, o.id));
                Level { price, queue: orders.iter().map(|o| o.id.expect("resting order has an id")).collect() }
            })
            .collect();
        match self.side {
            Side::Bid => levels.sort_by(|a, b| b.price.cmp(&a.price)),
            Side::Ask => levels.sort_by(|a, b| a.price.cmp(&b.price)),
        }

        self.anon = levels
            .iter()
            .map(|level| {
                let qty = level
                    .queue
                    .iter()
                    .map(|id| self.orders[id].qty)
                    .sum();
                (level.price, qty)
            })
            .collect();
        self.levels = levels;
    }

    /// Front of the best level, if any: the next order a taker would meet.
    pub(crate) fn best_order(&self) -> Option<(OrderId, Price)> {
        self.levels.first().and_then(|level| level.queue.first().map(|id| (*id, level.price)))
    }

    pub(crate) fn orders_mut(&mut self) -> &mut HashMap<OrderId, Order> {
        &mut self.orders
    }

    /// Total live quantity per the authoritative map (test support for the
    /// conservation property).
    pub fn authoritative_qty(&self) -> Quantity {
        self.orders.values().map(|o| o.qty).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::CustomerRef;

    fn order(id: u64, agent: &str, side: Side, price: i64, qty: u64, t: u64) -> Order {
        let mut o = Order::limit(
            agent,
            side,
            Price::new(price),
            Quantity::new(qty),
            SimTime::from_millis(t),
            CustomerRef::new(id),
        );
        o.id = Some(OrderId::new(id));
        o
    }

    #[test]
    fn insert_rebuilds_views() {
        let mut side = OrderBookSide::new(Side::Bid, Price::new(1));
        side.insert(order(1, "B00", Side::Bid, 100, 10, 0)).unwrap();
        side.insert(order(2, "B01", Side::Bid, 101, 5, 1)).unwrap();

        assert_eq!(side.best_price(), Some(Price::new(101)));
        assert_eq!(side.anon_levels(), &[(Price::new(101), Quantity::new(5)), (Price::new(100), Quantity::new(10))]);
        assert_eq!(side.n_orders(), 2);
    }

    #[test]
    fn duplicate_id_is_protocol_misuse() {
        let mut side = OrderBookSide::new(Side::Bid, Price::new(1));
        side.insert(order(1, "B00", Side::Bid, 100, 10, 0)).unwrap();
        let err = side.insert(order(1, "B01", Side::Bid, 99, 1, 1)).unwrap_err();
        assert_eq!(err, EngineError::DuplicateOrder(OrderId::new(1)));
    }

    #[test]
    fn cancel_unknown_is_protocol_misuse() {
        let mut side = OrderBookSide::new(Side::Ask, Price::new(1_000));
        let err = side.cancel(SimTime::ZERO, OrderId::new(9), PoolId::Lit).unwrap_err();
        assert_eq!(err, EngineError::UnknownOrder(OrderId::new(9)));
    }

    #[test]
    fn cancel_reports_and_tapes() {
        let mut side = OrderBookSide::new(Side::Ask, Price::new(1_000));
        side.insert(order(3, "S00", Side::Ask, 105, 4, 2)).unwrap();

        let resp = side.cancel(SimTime::from_millis(7), OrderId::new(3), PoolId::Lit).unwrap();
        assert_eq!(resp.messages.len(), 1);
        assert_eq!(resp.messages[0].event, OrderEvent::Cancelled);
        assert!(matches!(resp.tape[0], TapeEvent::Cancel { qty, .. } if qty == Quantity::new(4)));
        assert!(side.is_empty());
        assert!(side.anon_levels().is_empty());
    }

    #[test]
    fn fifo_within_level_is_by_submit_time() {
        let mut side = OrderBookSide::new(Side::Ask, Price::new(1_000));
        side.insert(order(2, "S01", Side::Ask, 100, 1, 5)).unwrap();
        side.insert(order(1, "S00", Side::Ask, 100, 1, 3)).unwrap();

        let (front, price) = side.best_order().unwrap();
        assert_eq!(price, Price::new(100));
        assert_eq!(front, OrderId::new(1));
    }

    #[test]
    fn conservation_between_map_and_projection() {
        let mut side = OrderBookSide::new(Side::Bid, Price::new(1));
        for (id, price, qty) in [(1, 100, 3), (2, 100, 7), (3, 98, 2)] {
            side.insert(order(id, "B00", Side::Bid, price, qty, id)).unwrap();
        }
        side.cancel(SimTime::ZERO, OrderId::new(2), PoolId::Lit).unwrap();

        let projected: Quantity = side.anon_levels().iter().map(|(_, q)| *q).sum();
        assert_eq!(projected, side.authoritative_qty());
        assert_eq!(side.qty_at(Price::new(100)), Quantity::new(3));
    }

    #[test]
    fn depth_respects_price_acceptability() {
        let mut side = OrderBookSide::new(Side::Ask, Price::new(1_000));
        side.insert(order(1, "S00", Side::Ask, 100, 5, 0)).unwrap();
        side.insert(order(2, "S01", Side::Ask, 102, 5, 1)).unwrap();
        side.insert(order(3, "S02", Side::Ask, 105, 5, 2)).unwrap();

        assert_eq!(side.depth_at_or_better(Some(Price::new(102))), Quantity::new(10));
        assert_eq!(side.depth_at_or_better(Some(Price::new(99))), Quantity::ZERO);
        assert_eq!(side.depth_at_or_better(None), Quantity::new(15));
    }
}

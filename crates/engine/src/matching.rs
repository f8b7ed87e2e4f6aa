//! The matching primitive: an incoming order walking one side of the book.
//!
//! `take` runs on the side being consumed (the opposite side of the
//! incoming order). It is a self-contained transition: given the book and
//! an order it returns the messages and tape events the attempt produced,
//! touching nothing else, which keeps the policy matrix testable in
//! isolation.

use crate::book_side::{BookResponse, OrderBookSide};
use agora_core::{
    ExchangeMsg, FillRecord, Order, OrderEvent, OrderStyle, PoolId, Price, Quantity, SimTime,
    TapeEvent,
};

impl OrderBookSide {
    /// Consume liquidity from this side to fill `incoming`.
    ///
    /// Style policy:
    /// - MKT ignores price and allows partial fills;
    /// - FOK/AON require the full quantity to be available at acceptable
    ///   prices up front, else fail without touching the book;
    /// - IOC requires at least one unit up front, consumes greedily while
    ///   the price is acceptable, and drops any remainder.
    ///
    /// Every maker consumed gets its own FILL/PART message; the taker gets
    /// exactly one terminal message (FAIL, FILL, or PART), carrying the
    /// processing fee. Trades print at the resting order's price.
    pub fn take(
        &mut self,
        time: SimTime,
        incoming: &mut Order,
        pool: PoolId,
        fee: i64,
    ) -> BookResponse {
        let mut resp = BookResponse::default();
        let taker_id = incoming.id.expect("taker order must carry an exchange id");

        let limit = if incoming.style.ignores_price() { None } else { Some(incoming.price) };

        // Pre-checks: fail fast, book untouched.
        let hopeless = if self.is_empty() {
            true
        } else {
            let depth = self.depth_at_or_better(limit);
            match incoming.style {
                OrderStyle::FillOrKill | OrderStyle::AllOrNone => depth < incoming.qty,
                OrderStyle::ImmediateOrCancel => depth.is_zero(),
                _ => false,
            }
        };
        if hopeless {
            resp.messages.push(ExchangeMsg::new(
                incoming.agent.clone(),
                taker_id,
                OrderEvent::Fail,
                fee,
            ));
            return resp;
        }

        // Walk the book, consuming the oldest order at the best level.
        let mut fills: Vec<FillRecord> = Vec::new();
        let mut remaining = incoming.qty;

        while !remaining.is_zero() {
            let Some((maker_id, level_price)) = self.best_order() else {
                break;
            };
            if let Some(limit) = limit {
                if !self.side().at_or_better(level_price, limit) {
                    break;
                }
            }

            let (maker_agent, maker_qty) = {
                let maker = self
                    .orders_mut()
                    .get(&maker_id)
                    .expect("derived views out of sync with the order map");
                (maker.agent.clone(), maker.qty)
            };

            let trade_qty = maker_qty.min(remaining);
            let fill = FillRecord { price: level_price, qty: trade_qty };
            fills.push(fill);
            resp.tape.push(TapeEvent::Trade {
                pool,
                time,
                price: level_price,
                qty: trade_qty,
                maker: maker_agent.clone(),
                taker: incoming.agent.clone(),
            });

            if maker_qty > remaining {
                // Maker only partially consumed: reduce in place, report
                // the revised order back to its owner.
                let maker = self
                    .orders_mut()
                    .get_mut(&maker_id)
                    .expect("derived views out of sync with the order map");
                maker.qty -= remaining;
                let residual = maker.clone();
                resp.messages.push(ExchangeMsg::new(
                    maker_agent,
                    maker_id,
                    OrderEvent::Part { fills: vec![fill], residual },
                    0,
                ));
                remaining = Quantity::ZERO;
            } else {
                // Maker fully consumed: remove it and keep walking.
                self.orders_mut().remove(&maker_id);
                resp.messages.push(ExchangeMsg::new(
                    maker_agent,
                    maker_id,
                    OrderEvent::Fill { fills: vec![fill] },
                    0,
                ));
                remaining -= trade_qty;
            }
            self.rebuild();
        }

        incoming.qty = remaining;
        let event = if fills.is_empty() {
            OrderEvent::Fail
        } else if remaining.is_zero() {
            OrderEvent::Fill { fills }
        } else {
            OrderEvent::Part { fills, residual: incoming.clone() }
        };
        resp.messages.push(ExchangeMsg::new(incoming.agent.clone(), taker_id, event, fee));
        resp
    }
}

/// Does a limit price cross the opposite side's best, so that the order
/// would execute immediately on arrival?
pub(crate) fn crosses(incoming: &Order, opposite_best: Option<Price>) -> bool {
    opposite_best.is_some_and(|best| incoming.side.at_or_better(incoming.price, best))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{CustomerRef, OrderId, Side};

    const FEE: i64 = 1;

    fn resting(id: u64, agent: &str, side: Side, price: i64, qty: u64, t: u64) -> Order {
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

    fn taker(id: u64, agent: &str, side: Side, style: OrderStyle, price: i64, qty: u64) -> Order {
        let mut o = Order::new(
            agent,
            side,
            style,
            Price::new(price),
            Quantity::new(qty),
            SimTime::from_millis(100),
            CustomerRef::new(id),
        );
        o.id = Some(OrderId::new(id));
        o
    }

    fn ask_book(entries: &[(u64, i64, u64, u64)]) -> OrderBookSide {
        let mut book = OrderBookSide::new(Side::Ask, Price::new(1_000));
        for (id, price, qty, t) in entries {
            book.insert(resting(*id, &format!("S{id:02}"), Side::Ask, *price, *qty, *t)).unwrap();
        }
        book
    }

    fn terminal_for<'a>(resp: &'a BookResponse, id: OrderId) -> &'a ExchangeMsg {
        resp.messages
            .iter()
            .filter(|m| m.order_id == id)
            .last()
            .expect("taker message present")
    }

    #[test]
    fn market_partial_fill_against_thin_book() {
        // Resting ask 5@100; incoming bid MKT 8 trades 5@100 then runs dry.
        let mut book = ask_book(&[(1, 100, 5, 1)]);
        let mut incoming = taker(10, "B00", Side::Bid, OrderStyle::Market, 0, 8);

        let resp = book.take(SimTime::from_millis(100), &mut incoming, PoolId::Lit, FEE);

        let maker_msg = resp.messages.iter().find(|m| m.order_id == OrderId::new(1)).unwrap();
        assert!(matches!(maker_msg.event, OrderEvent::Fill { .. }));

        let taker_msg = terminal_for(&resp, OrderId::new(10));
        match &taker_msg.event {
            OrderEvent::Part { fills, residual } => {
                assert_eq!(fills, &[FillRecord { price: Price::new(100), qty: Quantity::new(5) }]);
                assert_eq!(residual.qty, Quantity::new(3));
            }
            other => panic!("expected PART, got {}", other.tag()),
        }
        assert_eq!(taker_msg.fee, FEE);
        assert!(book.is_empty());
        assert_eq!(resp.tape.len(), 1);
    }

    #[test]
    fn fok_fails_without_touching_the_book() {
        let mut book = ask_book(&[(1, 100, 4, 1), (2, 103, 4, 2)]);
        let before: Vec<_> = book.anon_levels().to_vec();

        // Only 4 units available at <= 100, FOK wants 6.
        let mut incoming = taker(10, "B00", Side::Bid, OrderStyle::FillOrKill, 100, 6);
        let resp = book.take(SimTime::from_millis(100), &mut incoming, PoolId::Lit, FEE);

        let taker_msg = terminal_for(&resp, OrderId::new(10));
        assert!(matches!(taker_msg.event, OrderEvent::Fail));
        assert_eq!(taker_msg.fee, FEE);
        assert!(resp.tape.is_empty());
        assert_eq!(book.anon_levels(), &before[..]);
        assert_eq!(book.n_orders(), 2);
    }

    #[test]
    fn fok_on_empty_book_fails() {
        let mut book = OrderBookSide::new(Side::Bid, Price::new(1));
        let mut incoming = taker(10, "S00", Side::Ask, OrderStyle::FillOrKill, 100, 10);
        let resp = book.take(SimTime::from_millis(100), &mut incoming, PoolId::Lit, FEE);
        assert!(matches!(terminal_for(&resp, OrderId::new(10)).event, OrderEvent::Fail));
        assert!(book.is_empty());
    }

    #[test]
    fn fok_fills_completely_when_depth_allows() {
        let mut book = ask_book(&[(1, 100, 4, 1), (2, 100, 4, 2)]);
        let mut incoming = taker(10, "B00", Side::Bid, OrderStyle::FillOrKill, 100, 6);
        let resp = book.take(SimTime::from_millis(100), &mut incoming, PoolId::Lit, FEE);

        match &terminal_for(&resp, OrderId::new(10)).event {
            OrderEvent::Fill { fills } => {
                let total: Quantity = fills.iter().map(|f| f.qty).sum();
                assert_eq!(total, Quantity::new(6));
            }
            other => panic!("expected FILL, got {}", other.tag()),
        }
        // First maker gone, second reduced to 2.
        assert!(!book.contains(OrderId::new(1)));
        assert_eq!(book.order(OrderId::new(2)).unwrap().qty, Quantity::new(2));
    }

    #[test]
    fn ioc_stops_at_its_limit_and_drops_remainder() {
        let mut book = ask_book(&[(1, 100, 3, 1), (2, 104, 5, 2)]);
        let mut incoming = taker(10, "B00", Side::Bid, OrderStyle::ImmediateOrCancel, 101, 8);
        let resp = book.take(SimTime::from_millis(100), &mut incoming, PoolId::Lit, FEE);

        match &terminal_for(&resp, OrderId::new(10)).event {
            OrderEvent::Part { fills, residual } => {
                assert_eq!(fills.len(), 1);
                assert_eq!(fills[0].price, Price::new(100));
                assert_eq!(residual.qty, Quantity::new(5));
            }
            other => panic!("expected PART, got {}", other.tag()),
        }
        // Remainder is not rested anywhere: the 104 ask is untouched and the
        // bid side of this pool never saw the order.
        assert_eq!(book.n_orders(), 1);
        assert_eq!(book.qty_at(Price::new(104)), Quantity::new(5));
    }

    #[test]
    fn ioc_with_no_acceptable_price_fails() {
        let mut book = ask_book(&[(1, 105, 3, 1)]);
        let mut incoming = taker(10, "B00", Side::Bid, OrderStyle::ImmediateOrCancel, 101, 2);
        let resp = book.take(SimTime::from_millis(100), &mut incoming, PoolId::Lit, FEE);
        assert!(matches!(terminal_for(&resp, OrderId::new(10)).event, OrderEvent::Fail));
        assert_eq!(book.n_orders(), 1);
    }

    #[test]
    fn price_time_priority_among_equal_prices() {
        // Two bids at 100, the earlier one must be consumed first.
        let mut book = OrderBookSide::new(Side::Bid, Price::new(1));
        book.insert(resting(1, "B00", Side::Bid, 100, 3, 1)).unwrap();
        book.insert(resting(2, "B01", Side::Bid, 100, 3, 2)).unwrap();

        let mut incoming = taker(10, "S00", Side::Ask, OrderStyle::Market, 0, 3);
        let resp = book.take(SimTime::from_millis(100), &mut incoming, PoolId::Lit, FEE);

        let maker_msg = resp.messages.iter().find(|m| m.order_id == OrderId::new(1)).unwrap();
        assert!(matches!(maker_msg.event, OrderEvent::Fill { .. }));
        assert!(!book.contains(OrderId::new(1)));
        assert_eq!(book.order(OrderId::new(2)).unwrap().qty, Quantity::new(3));
    }

    #[test]
    fn one_taker_can_print_at_several_prices() {
        let mut book = ask_book(&[(1, 100, 2, 1), (2, 102, 2, 2)]);
        let mut incoming = taker(10, "B00", Side::Bid, OrderStyle::Market, 0, 4);
        let resp = book.take(SimTime::from_millis(100), &mut incoming, PoolId::Lit, FEE);

        let prices: Vec<Price> = resp
            .tape
            .iter()
            .filter_map(|e| match e {
                TapeEvent::Trade { price, .. } => Some(*price),
                _ => None,
            })
            .collect();
        assert_eq!(prices, vec![Price::new(100), Price::new(102)]);
    }

    #[test]
    fn maker_partial_reports_residual() {
        let mut book = ask_book(&[(1, 100, 10, 1)]);
        let mut incoming = taker(10, "B00", Side::Bid, OrderStyle::Market, 0, 4);
        let resp = book.take(SimTime::from_millis(100), &mut incoming, PoolId::Lit, FEE);

        let maker_msg = resp.messages.iter().find(|m| m.order_id == OrderId::new(1)).unwrap();
        match &maker_msg.event {
            OrderEvent::Part { residual, .. } => assert_eq!(residual.qty, Quantity::new(6)),
            other => panic!("expected PART, got {}", other.tag()),
        }
        assert_eq!(book.qty_at(Price::new(100)), Quantity::new(6));
    }

    #[test]
    fn conservation_after_take() {
        let mut book = ask_book(&[(1, 100, 5, 1), (2, 101, 7, 2), (3, 101, 2, 3)]);
        let mut incoming = taker(10, "B00", Side::Bid, OrderStyle::Market, 0, 9);
        book.take(SimTime::from_millis(100), &mut incoming, PoolId::Lit, FEE);

        let projected: Quantity = book.anon_levels().iter().map(|(_, q)| *q).sum();
        assert_eq!(projected, book.authoritative_qty());
        assert_eq!(projected, Quantity::new(5));
    }
}

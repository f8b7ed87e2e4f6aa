//! Price-shaving trader: improves the touch by one tick, bounded by the
//! customer limit. When the touch moves past its working quote it cancels
//! and re-quotes.

use super::{Agent, AgentLedger, CustomerOrder};
use agora_core::{
    AgentId, ExchangeMsg, Order, OrderId, OrderStyle, Price, PublishedBook, Side, SimTime,
    TradeSummary,
};

pub struct ShaverTrader {
    id: AgentId,
    ledger: AgentLedger,
    /// Price of the working quote, for deciding when to re-quote.
    quoted_at: Option<Price>,
}

impl ShaverTrader {
    pub fn new(id: impl Into<String>) -> Self {
        ShaverTrader { id: AgentId::new(id), ledger: AgentLedger::new(), quoted_at: None }
    }

    /// One tick better than the touch, never beyond the customer limit;
    /// the system worst price when the side is empty.
    fn shave(job: &CustomerOrder, book: &PublishedBook) -> Price {
        match job.side {
            Side::Bid => match book.bids.best {
                Some(best) => best.offset(1).clamp_to(book.bids.worst, job.limit),
                None => book.bids.worst,
            },
            Side::Ask => match book.asks.best {
                Some(best) => best.offset(-1).clamp_to(job.limit, book.asks.worst),
                None => book.asks.worst,
            },
        }
    }
}

impl Agent for ShaverTrader {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "SHVR"
    }

    fn assign(&mut self, job: CustomerOrder) -> Option<OrderId> {
        self.quoted_at = None;
        self.ledger.assign(job)
    }

    fn get_order(&mut self, time: SimTime, _time_left: f64, book: &PublishedBook) -> Option<Order> {
        if let Some(cancel) = self.ledger.cancel_order(&self.id, time) {
            return Some(cancel);
        }

        if self.ledger.can_quote() {
            let job = self.ledger.job()?;
            let price = Self::shave(job, book);
            self.quoted_at = Some(price);
            return self.ledger.quote(&self.id, price, time);
        }

        // Re-quote when someone has improved past us: cancel the working
        // order, quote again once the cancel confirms.
        if let (Some(live), Some(job), Some(quoted)) =
            (self.ledger.live(), self.ledger.job(), self.quoted_at)
        {
            let desired = Self::shave(job, book);
            let improved = match job.side {
                Side::Bid => desired > quoted,
                Side::Ask => desired < quoted,
            };
            if improved {
                self.quoted_at = None;
                return Some(Order::new(
                    self.id.clone(),
                    job.side,
                    OrderStyle::Cancel { target: live },
                    Price::ZERO,
                    job.qty,
                    time,
                    job.customer_ref,
                ));
            }
        }
        None
    }

    fn respond(&mut self, _time: SimTime, _book: &PublishedBook, _last_trade: Option<&TradeSummary>) {}

    fn bookkeep(&mut self, msg: &ExchangeMsg, _time: SimTime) {
        self.ledger.note(msg);
    }

    fn balance(&self) -> i64 {
        self.ledger.balance()
    }

    fn n_trades(&self) -> u64 {
        self.ledger.n_trades()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{CustomerRef, LadderView, Quantity};

    fn book_with_bid(best: i64) -> PublishedBook {
        let mut book = PublishedBook::empty(SimTime::ZERO, Price::new(1), Price::new(1_000));
        book.bids = LadderView {
            best: Some(Price::new(best)),
            worst: Price::new(1),
            orders: 1,
            levels: vec![(Price::new(best), Quantity::new(5))],
        };
        book
    }

    fn job(limit: i64) -> CustomerOrder {
        CustomerOrder {
            customer_ref: CustomerRef::new(1),
            agent: AgentId::new("B00"),
            side: Side::Bid,
            limit: Price::new(limit),
            qty: Quantity::new(1),
            issued: SimTime::ZERO,
        }
    }

    #[test]
    fn improves_the_touch_by_one_tick() {
        let mut shvr = ShaverTrader::new("B00");
        shvr.assign(job(150));
        let order = shvr.get_order(SimTime::ZERO, 1.0, &book_with_bid(100)).unwrap();
        assert_eq!(order.price, Price::new(101));
    }

    #[test]
    fn never_quotes_past_the_limit() {
        let mut shvr = ShaverTrader::new("B00");
        shvr.assign(job(100));
        let order = shvr.get_order(SimTime::ZERO, 1.0, &book_with_bid(100)).unwrap();
        assert_eq!(order.price, Price::new(100));
    }

    #[test]
    fn cancels_when_outbid() {
        let mut shvr = ShaverTrader::new("B00");
        shvr.assign(job(150));
        let first = shvr.get_order(SimTime::ZERO, 1.0, &book_with_bid(100)).unwrap();
        assert_eq!(first.price, Price::new(101));
        let id = first.id; // unassigned until the exchange acks
        assert!(id.is_none());
        shvr.bookkeep(
            &ExchangeMsg::new(AgentId::new("B00"), agora_core::OrderId::new(5), agora_core::OrderEvent::Ack, 0),
            SimTime::ZERO,
        );

        // Someone bids 105: the shaver walks its quote up.
        let order = shvr.get_order(SimTime::ZERO, 1.0, &book_with_bid(105)).unwrap();
        assert!(matches!(order.style, OrderStyle::Cancel { target } if target == agora_core::OrderId::new(5)));

        shvr.bookkeep(
            &ExchangeMsg::new(AgentId::new("B00"), agora_core::OrderId::new(5), agora_core::OrderEvent::Cancelled, 0),
            SimTime::ZERO,
        );
        let requote = shvr.get_order(SimTime::ZERO, 1.0, &book_with_bid(105)).unwrap();
        assert_eq!(requote.price, Price::new(106));
    }
}

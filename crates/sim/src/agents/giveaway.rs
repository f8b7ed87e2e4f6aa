//! Giveaway trader: quotes the customer limit exactly, handing its whole
//! margin to the counterparty. Useful as a flow source and a floor for
//! comparing other strategies.

use super::{Agent, AgentLedger, CustomerOrder};
use agora_core::{AgentId, ExchangeMsg, Order, OrderId, PublishedBook, SimTime, TradeSummary};

pub struct GiveawayTrader {
    id: AgentId,
    ledger: AgentLedger,
}

impl GiveawayTrader {
    pub fn new(id: impl Into<String>) -> Self {
        GiveawayTrader { id: AgentId::new(id), ledger: AgentLedger::new() }
    }
}

impl Agent for GiveawayTrader {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "GVWY"
    }

    fn assign(&mut self, job: CustomerOrder) -> Option<OrderId> {
        self.ledger.assign(job)
    }

    fn get_order(&mut self, time: SimTime, _time_left: f64, _book: &PublishedBook) -> Option<Order> {
        if let Some(cancel) = self.ledger.cancel_order(&self.id, time) {
            return Some(cancel);
        }
        if !self.ledger.can_quote() {
            return None;
        }
        let price = self.ledger.job()?.limit;
        self.ledger.quote(&self.id, price, time)
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

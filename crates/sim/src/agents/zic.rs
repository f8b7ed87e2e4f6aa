//! Zero-intelligence-constrained trader.
//!
//! Quotes a uniformly random price between the system worst bound and the
//! customer limit, so it can never trade at a loss. Provides the baseline
//! random order flow of the population.

use super::{Agent, AgentLedger, CustomerOrder};
use agora_core::{
    AgentId, ExchangeMsg, Order, OrderId, Price, PublishedBook, Side, SimTime, TradeSummary,
};
use rand::prelude::*;

#[derive(Debug, Clone, Default)]
pub struct ZicConfig {
    /// Seed for reproducible runs.
    pub seed: Option<u64>,
}

pub struct ZicTrader {
    id: AgentId,
    ledger: AgentLedger,
    rng: StdRng,
}

impl ZicTrader {
    pub fn new(id: impl Into<String>, config: ZicConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        ZicTrader { id: AgentId::new(id), ledger: AgentLedger::new(), rng }
    }
}

impl Agent for ZicTrader {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "ZIC"
    }

    fn assign(&mut self, job: CustomerOrder) -> Option<OrderId> {
        self.ledger.assign(job)
    }

    fn get_order(&mut self, time: SimTime, _time_left: f64, book: &PublishedBook) -> Option<Order> {
        if let Some(cancel) = self.ledger.cancel_order(&self.id, time) {
            return Some(cancel);
        }
        if !self.ledger.can_quote() {
            return None;
        }
        let job = self.ledger.job()?;

        let (lo, hi) = match job.side {
            Side::Bid => (book.bids.worst.ticks(), job.limit.ticks()),
            Side::Ask => (job.limit.ticks(), book.asks.worst.ticks()),
        };
        if lo > hi {
            return None;
        }
        let price = Price::new(self.rng.gen_range(lo..=hi));
        self.ledger.quote(&self.id, price, time)
    }

    fn respond(&mut self, _time: SimTime, _book: &PublishedBook, _last_trade: Option<&TradeSummary>) {
        // Zero intelligence: nothing to learn.
    }

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

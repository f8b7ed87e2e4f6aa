//! Customer-order generation.
//!
//! The exchange and agents treat customer demand as an upstream source;
//! this module supplies the trait plus a stochastic implementation with
//! fixed, jittered, or Poisson inter-arrival timing.

use crate::agents::CustomerOrder;
use agora_core::{AgentId, CustomerRef, Price, Quantity, Side, SimTime};
use rand::prelude::*;
use rand_distr::Exp;
use serde::{Deserialize, Serialize};

pub trait OrderSource: Send {
    /// All customer orders due at or before `now`.
    fn poll(&mut self, now: SimTime) -> Vec<CustomerOrder>;
}

/// Inter-arrival timing for customer orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrivalMode {
    /// One order every `interval_ms` exactly.
    Fixed,
    /// Uniform jitter in [0.5, 1.5] of the interval.
    Jitter,
    /// Exponential gaps with mean `interval_ms`.
    Poisson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Mean virtual milliseconds between customer orders.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_arrivals")]
    pub arrivals: ArrivalMode,
    /// Limit-price range for sellers (inclusive).
    #[serde(default = "default_supply_range")]
    pub supply: (i64, i64),
    /// Limit-price range for buyers (inclusive).
    #[serde(default = "default_demand_range")]
    pub demand: (i64, i64),
    /// Order quantity range (inclusive).
    #[serde(default = "default_qty_range")]
    pub qty: (u64, u64),
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_interval_ms() -> u64 {
    2_000
}

fn default_arrivals() -> ArrivalMode {
    ArrivalMode::Poisson
}

fn default_supply_range() -> (i64, i64) {
    (50, 150)
}

fn default_demand_range() -> (i64, i64) {
    (50, 150)
}

fn default_qty_range() -> (u64, u64) {
    (1, 1)
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            interval_ms: default_interval_ms(),
            arrivals: default_arrivals(),
            supply: default_supply_range(),
            demand: default_demand_range(),
            qty: default_qty_range(),
            seed: None,
        }
    }
}

/// Drip-feeds customer orders to a random agent, alternating between the
/// buyer and seller populations so both sides stay supplied.
pub struct StochasticSource {
    config: SourceConfig,
    buyers: Vec<AgentId>,
    sellers: Vec<AgentId>,
    rng: StdRng,
    next_due_ms: u64,
    next_ref: u64,
    to_buyer: bool,
}

impl StochasticSource {
    pub fn new(config: SourceConfig, buyers: Vec<AgentId>, sellers: Vec<AgentId>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        StochasticSource {
            config,
            buyers,
            sellers,
            rng,
            next_due_ms: 0,
            next_ref: 1,
            to_buyer: true,
        }
    }

    fn gap_ms(&mut self) -> u64 {
        let interval = self.config.interval_ms.max(1);
        let gap = match self.config.arrivals {
            ArrivalMode::Fixed => interval as f64,
            ArrivalMode::Jitter => interval as f64 * self.rng.gen_range(0.5..1.5),
            ArrivalMode::Poisson => {
                let exp = Exp::new(1.0 / interval as f64).expect("positive rate");
                exp.sample(&mut self.rng)
            }
        };
        (gap.round() as u64).max(1)
    }

    fn issue(&mut self, now: SimTime) -> Option<CustomerOrder> {
        let (pool, side, (lo, hi)) = if self.to_buyer {
            (&self.buyers, Side::Bid, self.config.demand)
        } else {
            (&self.sellers, Side::Ask, self.config.supply)
        };
        self.to_buyer = !self.to_buyer;
        if pool.is_empty() {
            return None;
        }
        let agent = pool[self.rng.gen_range(0..pool.len())].clone();
        let limit = Price::new(self.rng.gen_range(lo..=hi));
        let (q_lo, q_hi) = self.config.qty;
        let qty = Quantity::new(self.rng.gen_range(q_lo..=q_hi.max(q_lo)));
        let customer_ref = CustomerRef::new(self.next_ref);
        self.next_ref += 1;
        Some(CustomerOrder { customer_ref, agent, side, limit, qty, issued: now })
    }
}

impl OrderSource for StochasticSource {
    fn poll(&mut self, now: SimTime) -> Vec<CustomerOrder> {
        let mut jobs = Vec::new();
        while self.next_due_ms <= now.as_millis() {
            if let Some(job) = self.issue(now) {
                jobs.push(job);
            }
            let gap = self.gap_ms();
            self.next_due_ms += gap;
        }
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(arrivals: ArrivalMode) -> StochasticSource {
        let config = SourceConfig {
            interval_ms: 100,
            arrivals,
            seed: Some(11),
            ..SourceConfig::default()
        };
        StochasticSource::new(
            config,
            vec![AgentId::new("B00"), AgentId::new("B01")],
            vec![AgentId::new("S00")],
        )
    }

    #[test]
    fn fixed_arrivals_are_periodic() {
        let mut src = source(ArrivalMode::Fixed);
        let jobs = src.poll(SimTime::from_millis(1_000));
        assert_eq!(jobs.len(), 11); // t = 0, 100, ..., 1000
    }

    #[test]
    fn alternates_sides_and_stays_in_range() {
        let mut src = source(ArrivalMode::Poisson);
        let jobs = src.poll(SimTime::from_millis(5_000));
        assert!(!jobs.is_empty());
        assert!(jobs.iter().any(|j| j.side == Side::Bid));
        assert!(jobs.iter().any(|j| j.side == Side::Ask));
        for job in &jobs {
            assert!(job.limit >= Price::new(50) && job.limit <= Price::new(150));
            assert_eq!(job.qty, Quantity::new(1));
        }
    }

    #[test]
    fn refs_are_unique_and_increasing() {
        let mut src = source(ArrivalMode::Jitter);
        let jobs = src.poll(SimTime::from_millis(3_000));
        for pair in jobs.windows(2) {
            assert!(pair[1].customer_ref.value() > pair[0].customer_ref.value());
        }
    }
}

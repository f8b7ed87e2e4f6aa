//! Trading agents.
//!
//! The engine only ever sees agents through the [`Agent`] trait; pricing
//! strategies are deliberately minimal here. The included traders cover
//! the baseline population: zero-intelligence-constrained randomness,
//! touch-shaving, and limit-price giveaway.

mod agent;
mod giveaway;
mod shaver;
mod zic;

pub use agent::{Agent, AgentLedger, CustomerOrder};
pub use giveaway::GiveawayTrader;
pub use shaver::ShaverTrader;
pub use zic::{ZicConfig, ZicTrader};

use crate::session::SessionError;
use agora_core::AgentId;
use serde::{Deserialize, Serialize};

/// How many traders of one kind to create, per side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationSpec {
    /// Trader kind tag: "ZIC", "SHVR", or "GVWY".
    pub kind: String,
    #[serde(default)]
    pub buyers: usize,
    #[serde(default)]
    pub sellers: usize,
}

/// A built trading population, with the buyer/seller split the order
/// source needs for routing customer orders.
pub struct Population {
    pub agents: Vec<Box<dyn Agent>>,
    pub buyers: Vec<AgentId>,
    pub sellers: Vec<AgentId>,
}

/// Create the trading population from a spec list. Buyers are named
/// `B00, B01, ...` and sellers `S00, S01, ...` across all specs; each
/// agent gets its own deterministic seed derived from `seed`.
pub fn build_population(
    specs: &[PopulationSpec],
    seed: u64,
) -> Result<Population, SessionError> {
    let mut agents: Vec<Box<dyn Agent>> = Vec::new();
    let mut buyers = Vec::new();
    let mut sellers = Vec::new();

    for spec in specs {
        for _ in 0..spec.buyers {
            let name = format!("B{:02}", buyers.len());
            buyers.push(AgentId::new(&name));
            agents.push(make_trader(&spec.kind, name, seed.wrapping_add(agents.len() as u64))?);
        }
        for _ in 0..spec.sellers {
            let name = format!("S{:02}", sellers.len());
            sellers.push(AgentId::new(&name));
            agents.push(make_trader(&spec.kind, name, seed.wrapping_add(agents.len() as u64))?);
        }
    }
    Ok(Population { agents, buyers, sellers })
}

fn make_trader(kind: &str, name: String, seed: u64) -> Result<Box<dyn Agent>, SessionError> {
    match kind {
        "ZIC" => Ok(Box::new(ZicTrader::new(name, ZicConfig { seed: Some(seed) }))),
        "SHVR" => Ok(Box::new(ShaverTrader::new(name))),
        "GVWY" => Ok(Box::new(GiveawayTrader::new(name))),
        other => Err(SessionError::UnknownAgentKind(other.to_string())),
    }
}

//! The trade tape: an append-only chronological record of executions and
//! cancellations. Entries are never mutated once written.

use crate::ids::{AgentId, OrderId, PoolId};
use crate::order::Side;
use crate::value_objects::{Price, Quantity, SimTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TapeEvent {
    Trade {
        pool: PoolId,
        time: SimTime,
        price: Price,
        qty: Quantity,
        /// The resting counterparty.
        maker: AgentId,
        /// The incoming counterparty.
        taker: AgentId,
    },
    Cancel {
        pool: PoolId,
        time: SimTime,
        order: OrderId,
        side: Side,
        qty: Quantity,
    },
}

impl TapeEvent {
    pub fn pool(&self) -> PoolId {
        match self {
            TapeEvent::Trade { pool, .. } | TapeEvent::Cancel { pool, .. } => *pool,
        }
    }

    pub fn time(&self) -> SimTime {
        match self {
            TapeEvent::Trade { time, .. } | TapeEvent::Cancel { time, .. } => *time,
        }
    }

    pub fn is_trade(&self) -> bool {
        matches!(self, TapeEvent::Trade { .. })
    }
}

/// Volume-weighted summary of the trades caused by a single incoming order,
/// with counterparties anonymized. A single order can print at several
/// prices; aggregate consumers see one quantity at one average price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeSummary {
    pub time: SimTime,
    /// Volume-weighted average price; fractional because it averages ticks.
    pub price: f64,
    pub qty: Quantity,
}

/// Aggregate the trade events of one order into a summary, or `None` if no
/// trade occurred.
pub fn summarize(time: SimTime, events: &[TapeEvent]) -> Option<TradeSummary> {
    let mut total_cost = 0i64;
    let mut total_qty = 0u64;
    for event in events {
        if let TapeEvent::Trade { price, qty, .. } = event {
            total_cost += price.ticks() * qty.units() as i64;
            total_qty += qty.units();
        }
    }
    if total_qty == 0 {
        return None;
    }
    Some(TradeSummary {
        time,
        price: total_cost as f64 / total_qty as f64,
        qty: Quantity::new(total_qty),
    })
}

//! The anonymized book snapshot published to agents.

use crate::order::Side;
use crate::tape::TapeEvent;
use crate::value_objects::{Price, Quantity, SimTime};
use serde::{Deserialize, Serialize};

/// One side of the published book: aggregate (price, quantity) levels,
/// best first, with order details stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderView {
    pub best: Option<Price>,
    /// System worst-price bound for this side.
    pub worst: Price,
    /// Count of resting orders, not levels.
    pub orders: usize,
    pub levels: Vec<(Price, Quantity)>,
}

impl LadderView {
    pub fn depth(&self) -> Quantity {
        self.levels.iter().map(|(_, q)| *q).sum()
    }
}

/// The most recent execution on the lit pool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LastTrade {
    pub time: SimTime,
    pub price: Price,
    pub qty: Quantity,
}

/// Read-only market data snapshot. Covers the lit pool only; dark-pool
/// depth is never published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedBook {
    pub time: SimTime,
    pub bids: LadderView,
    pub asks: LadderView,
    pub last_trade: Option<LastTrade>,
    /// Bounded tail of the exchange tape.
    pub tape_tail: Vec<TapeEvent>,
    /// Mean of the best prices; `None` unless both sides are non-empty.
    pub mid_price: Option<f64>,
    /// Each side's best price weighted by the opposite side's best
    /// quantity; `None` unless both sides are non-empty.
    pub micro_price: Option<f64>,
}

impl PublishedBook {
    /// An empty snapshot, used before the first publication.
    pub fn empty(time: SimTime, min_price: Price, max_price: Price) -> Self {
        PublishedBook {
            time,
            bids: LadderView { best: None, worst: min_price, orders: 0, levels: Vec::new() },
            asks: LadderView { best: None, worst: max_price, orders: 0, levels: Vec::new() },
            last_trade: None,
            tape_tail: Vec::new(),
            mid_price: None,
            micro_price: None,
        }
    }

    pub fn best(&self, side: Side) -> Option<Price> {
        match side {
            Side::Bid => self.bids.best,
            Side::Ask => self.asks.best,
        }
    }

    pub fn side(&self, side: Side) -> &LadderView {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }
}

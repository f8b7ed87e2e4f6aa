//! Exchange configuration.

use agora_core::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// Tunable constants for one exchange instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// System worst bid price; nothing trades below it.
    #[serde(default = "default_min_price")]
    pub min_price: Price,
    /// System worst ask price; nothing trades above it.
    #[serde(default = "default_max_price")]
    pub max_price: Price,
    /// Orders of this quantity or more route to the dark pool.
    #[serde(default = "default_block_trade_threshold")]
    pub block_trade_threshold: Quantity,
    /// Fixed per-order processing fee, charged to the taker.
    #[serde(default = "default_processing_fee")]
    pub processing_fee: i64,
    /// How many tape entries the published snapshot carries.
    #[serde(default = "default_tape_tail")]
    pub tape_tail: usize,
}

fn default_min_price() -> Price {
    Price::new(1)
}

fn default_max_price() -> Price {
    Price::new(1_000)
}

fn default_block_trade_threshold() -> Quantity {
    Quantity::new(300)
}

fn default_processing_fee() -> i64 {
    1
}

fn default_tape_tail() -> usize {
    10
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            min_price: default_min_price(),
            max_price: default_max_price(),
            block_trade_threshold: default_block_trade_threshold(),
            processing_fee: default_processing_fee(),
            tape_tail: default_tape_tail(),
        }
    }
}

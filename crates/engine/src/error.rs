//! Engine errors.
//!
//! Every variant here signals protocol misuse by an upstream component,
//! not a runtime market condition. Economic outcomes (an order that cannot
//! execute) are reported through `OrderEvent::Fail`, never through this
//! type. The harness treats any `EngineError` as fatal for the session.

use agora_core::{OrderId, Quantity};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("order {0} already present in the book")]
    DuplicateOrder(OrderId),

    #[error("cancel of unknown order {0}")]
    UnknownOrder(OrderId),

    #[error("order reached the book without an exchange id")]
    UnassignedOrder,

    #[error("iceberg display quantity {display} invalid for total quantity {qty}")]
    BadIcebergDisplay { qty: Quantity, display: Quantity },

    #[error("composite order routed to a pool handler")]
    UnroutedComposite,
}

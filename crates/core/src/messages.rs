//! Messages from the exchange back to agents.

use crate::ids::{AgentId, OrderId};
use crate::order::Order;
use crate::value_objects::{Price, Quantity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One executed transaction, as reported to the parties involved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillRecord {
    pub price: Price,
    pub qty: Quantity,
}

/// Outcome of an order, carrying only the fields that outcome requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEvent {
    /// Accepted to rest or defer; carries no transactions. The message's
    /// order id is the exchange-assigned id the agent needs to cancel.
    Ack,
    /// Fully executed.
    Fill { fills: Vec<FillRecord> },
    /// Partially executed. `residual` is the revised order: still live for
    /// a maker, handed back (and dropped) for a taker.
    Part { fills: Vec<FillRecord>, residual: Order },
    /// Nothing executed.
    Fail,
    /// Removed by cancellation.
    Cancelled,
}

impl OrderEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            OrderEvent::Ack => "ACK",
            OrderEvent::Fill { .. } => "FILL",
            OrderEvent::Part { .. } => "PART",
            OrderEvent::Fail => "FAIL",
            OrderEvent::Cancelled => "CAN",
        }
    }

    pub fn fills(&self) -> &[FillRecord] {
        match self {
            OrderEvent::Fill { fills } | OrderEvent::Part { fills, .. } => fills,
            _ => &[],
        }
    }
}

/// A message from the exchange to one agent about one of its orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeMsg {
    pub agent: AgentId,
    pub order_id: OrderId,
    pub event: OrderEvent,
    /// Processing fee charged with this message (taker only).
    pub fee: i64,
    /// Change applied to the agent's balance at the exchange.
    pub balance_delta: i64,
}

impl ExchangeMsg {
    pub fn new(agent: AgentId, order_id: OrderId, event: OrderEvent, fee: i64) -> Self {
        ExchangeMsg { agent, order_id, event, fee, balance_delta: -fee }
    }

    /// Total quantity executed across the message's transactions.
    pub fn filled_qty(&self) -> Quantity {
        self.event.fills().iter().map(|f| f.qty).sum()
    }
}

impl fmt::Display for ExchangeMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} fills={} fee={}",
            self.agent,
            self.order_id,
            self.event.tag(),
            self.event.fills().len(),
            self.fee,
        )
    }
}

//! The order value type and its style vocabulary.

use crate::ids::{AgentId, CustomerRef, OrderId};
use crate::value_objects::{Price, Quantity, SimTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// Is `a` strictly better than `b` from this side's point of view?
    /// Bids prefer higher prices, asks prefer lower.
    #[inline]
    pub fn better(self, a: Price, b: Price) -> bool {
        match self {
            Side::Bid => a > b,
            Side::Ask => a < b,
        }
    }

    /// Is `a` equal to or better than `b` from this side's point of view?
    #[inline]
    pub fn at_or_better(self, a: Price, b: Price) -> bool {
        match self {
            Side::Bid => a >= b,
            Side::Ask => a <= b,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "Bid"),
            Side::Ask => write!(f, "Ask"),
        }
    }
}

/// The two fully-formed sub-orders of a composite (OSO/OCO) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OxoPair {
    pub first: Order,
    pub second: Order,
}

/// Order style, including any style-specific payload.
///
/// A closed enumeration: every handler matches exhaustively, so an unknown
/// style tag cannot be represented at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderStyle {
    /// Rests at the limit price unless it crosses on arrival.
    Limit,
    /// Consumes opposite liquidity at any price; partial fills allowed.
    Market,
    /// Fills what it can at acceptable prices, drops the rest.
    ImmediateOrCancel,
    /// Fills completely at acceptable prices or fails untouched.
    FillOrKill,
    /// Like fill-or-kill but rests at the exchange, retrying on book
    /// changes until its expiry time.
    AllOrNone,
    /// A limit order cancelled at market close.
    GoodForDay,
    /// Executed with limit semantics during the open pass.
    LimitOnOpen,
    /// Executed with market semantics during the open pass.
    MarketOnOpen,
    /// Executed with limit semantics during the close pass.
    LimitOnClose,
    /// Executed with market semantics during the close pass.
    MarketOnClose,
    /// Both sub-orders are submitted; when the first fills or is cancelled
    /// the second is withdrawn.
    OneCancelsOther(Box<OxoPair>),
    /// The first sub-order is submitted; the second follows once the first
    /// fully fills.
    OneSendsOther(Box<OxoPair>),
    /// Expanded into a chain of one-sends-other orders, each exposing
    /// `display` units at a time.
    Iceberg { display: Quantity },
    /// Cancels a previously accepted order.
    Cancel { target: OrderId },
    /// Cancels every live order belonging to the issuing agent.
    CancelAll,
}

impl OrderStyle {
    /// Short wire-style tag used in logs and artifacts.
    pub fn tag(&self) -> &'static str {
        match self {
            OrderStyle::Limit => "LIM",
            OrderStyle::Market => "MKT",
            OrderStyle::ImmediateOrCancel => "IOC",
            OrderStyle::FillOrKill => "FOK",
            OrderStyle::AllOrNone => "AON",
            OrderStyle::GoodForDay => "GFD",
            OrderStyle::LimitOnOpen => "LOO",
            OrderStyle::MarketOnOpen => "MOO",
            OrderStyle::LimitOnClose => "LOC",
            OrderStyle::MarketOnClose => "MOC",
            OrderStyle::OneCancelsOther(_) => "OCO",
            OrderStyle::OneSendsOther(_) => "OSO",
            OrderStyle::Iceberg { .. } => "ICE",
            OrderStyle::Cancel { .. } => "CAN",
            OrderStyle::CancelAll => "XXX",
        }
    }

    /// Does matching ignore the limit price entirely?
    #[inline]
    pub fn ignores_price(&self) -> bool {
        matches!(self, OrderStyle::Market | OrderStyle::MarketOnOpen | OrderStyle::MarketOnClose)
    }
}

impl fmt::Display for OrderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A single instruction from an agent to the exchange.
///
/// `qty` always holds the *remaining* quantity; the matching engine revises
/// it in place as the order executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub agent: AgentId,
    pub side: Side,
    pub style: OrderStyle,
    pub price: Price,
    pub qty: Quantity,
    pub submitted: SimTime,
    /// Expiry for styles that carry one (AON, GFD).
    pub expires: Option<SimTime>,
    /// Assigned by the exchange on acceptance; `None` until then.
    pub id: Option<OrderId>,
    pub customer_ref: CustomerRef,
}

impl Order {
    pub fn new(
        agent: impl Into<AgentId>,
        side: Side,
        style: OrderStyle,
        price: Price,
        qty: Quantity,
        submitted: SimTime,
        customer_ref: CustomerRef,
    ) -> Self {
        Order {
            agent: agent.into(),
            side,
            style,
            price,
            qty,
            submitted,
            expires: None,
            id: None,
            customer_ref,
        }
    }

    pub fn limit(
        agent: impl Into<AgentId>,
        side: Side,
        price: Price,
        qty: Quantity,
        submitted: SimTime,
        customer_ref: CustomerRef,
    ) -> Self {
        Self::new(agent, side, OrderStyle::Limit, price, qty, submitted, customer_ref)
    }

    pub fn market(
        agent: impl Into<AgentId>,
        side: Side,
        qty: Quantity,
        submitted: SimTime,
        customer_ref: CustomerRef,
    ) -> Self {
        Self::new(agent, side, OrderStyle::Market, Price::ZERO, qty, submitted, customer_ref)
    }

    pub fn with_expiry(mut self, expires: SimTime) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn with_style(mut self, style: OrderStyle) -> Self {
        self.style = style;
        self
    }

    pub fn is_expired(&self, now: SimTime) -> bool {
        self.expires.is_some_and(|t| now >= t)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} {} P={} Q={} T={} {}]",
            self.agent,
            self.side,
            self.style.tag(),
            self.price,
            self.qty,
            self.submitted,
            self.customer_ref,
        )
    }
}

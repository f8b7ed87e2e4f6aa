pub mod book_view;
pub mod ids;
pub mod messages;
pub mod order;
pub mod tape;
pub mod value_objects;

// Re-export value objects at crate root for convenience
pub use value_objects::{Price, Quantity, SimTime};

// Re-export identifiers at crate root
pub use ids::{AgentId, CustomerRef, OrderId, PoolId};

// Re-export order types at crate root
pub use order::{Order, OrderStyle, OxoPair, Side};

// Re-export messages at crate root
pub use messages::{ExchangeMsg, FillRecord, OrderEvent};

// Re-export tape types at crate root
pub use tape::{TapeEvent, TradeSummary};

// Re-export snapshot types at crate root
pub use book_view::{LadderView, LastTrade, PublishedBook};

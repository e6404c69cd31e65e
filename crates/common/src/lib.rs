//! Shared identifier and money types for the marketplace order engine.

mod money;
mod types;

pub use money::{Money, MoneyParseError};
pub use types::{LineItemId, OrderId, PaymentEventId, PaymentId, ProductId, StallId, UserId};

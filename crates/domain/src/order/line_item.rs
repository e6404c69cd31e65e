//! Order line items.

use chrono::{DateTime, Utc};
use common::{LineItemId, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};

/// A product purchased as part of an order.
///
/// The unit price is captured at checkout and never changes afterwards.
/// The subtotal is always derived from price and quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    subtotal: Money,
    pub created_at: DateTime<Utc>,
}

impl LineItem {
    /// Creates a new line item priced at `unit_price`.
    pub fn new(order_id: OrderId, product_id: ProductId, quantity: u32, unit_price: Money) -> Self {
        Self {
            id: LineItemId::new(),
            order_id,
            product_id,
            quantity,
            unit_price,
            subtotal: unit_price.multiply(quantity),
            created_at: Utc::now(),
        }
    }

    /// Rebuilds a line item loaded from storage. The subtotal is recomputed.
    pub fn restore(
        id: LineItemId,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            product_id,
            quantity,
            unit_price,
            subtotal: unit_price.multiply(quantity),
            created_at,
        }
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }
}

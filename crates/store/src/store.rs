use std::collections::HashMap;

use async_trait::async_trait;
use common::{OrderId, ProductId, UserId};
use domain::{LineItem, Order, Payment, PaymentEvent, ProductStock, Stall};

use crate::Result;

/// Core trait for store implementations.
///
/// Reads on the store itself see committed data only. Anything that must
/// hold an invariant across several rows goes through a transaction from
/// [`Store::begin`].
///
/// A caller holding a transaction must not issue reads on the store until
/// the transaction is committed or dropped; the in-memory implementation
/// serializes both behind the same lock.
#[async_trait]
pub trait Store: Send + Sync + Clone + 'static {
    type Tx: StoreTx;

    /// Opens a transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Loads an order with its line items.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Orders placed by a client, newest first.
    async fn list_orders_for_client(&self, client_id: UserId) -> Result<Vec<Order>>;

    /// Orders assigned to a courier, newest first.
    async fn list_orders_for_courier(&self, courier_id: UserId) -> Result<Vec<Order>>;

    /// Orders containing products from any stall the vendor owns, newest first.
    async fn list_orders_for_vendor(&self, vendor_id: UserId) -> Result<Vec<Order>>;

    async fn get_product(&self, id: ProductId) -> Result<Option<ProductStock>>;

    /// Payments attached to an order, oldest first.
    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>>;

    async fn find_payment(&self, provider: &str, reference: &str) -> Result<Option<Payment>>;

    async fn find_payment_event(
        &self,
        provider: &str,
        reference: &str,
    ) -> Result<Option<PaymentEvent>>;

    /// Stalls whose products appear in the order.
    async fn stalls_for_order(&self, order_id: OrderId) -> Result<Vec<Stall>>;

    /// Inserts or replaces a stall.
    async fn put_stall(&self, stall: &Stall) -> Result<()>;

    /// Inserts or replaces a product. `stall_active` is derived from the
    /// stall on read and ignored here.
    async fn put_product(&self, product: &ProductStock) -> Result<()>;
}

/// An open transaction.
///
/// Dropping a transaction without calling [`StoreTx::commit`] rolls it back.
#[async_trait]
pub trait StoreTx: Send + Sized {
    /// Locks the given products in id order and returns them keyed by id.
    /// Unknown ids are absent from the result.
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<HashMap<ProductId, ProductStock>>;

    async fn update_stock(&mut self, id: ProductId, stock: u32) -> Result<()>;

    /// Inserts the order row. Line items are inserted separately.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn insert_line_item(&mut self, item: &LineItem) -> Result<()>;

    /// Locks an order row and loads it with its line items.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Writes state, total, notes, courier and `updated_at`.
    async fn update_order(&mut self, order: &Order) -> Result<()>;

    /// Inserts a payment. Fails with `Duplicate` if another payment holds the
    /// same `(provider, provider_reference)`.
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;

    async fn find_payment_for_update(
        &mut self,
        provider: &str,
        reference: &str,
    ) -> Result<Option<Payment>>;

    /// Locks the oldest pending payment of an order that no gateway has
    /// referenced yet.
    async fn pending_unreferenced_payment(&mut self, order_id: OrderId) -> Result<Option<Payment>>;

    async fn update_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Inserts a gateway event. Returns false if `(provider, reference)` was
    /// already recorded.
    async fn insert_payment_event(&mut self, event: &PaymentEvent) -> Result<bool>;

    async fn update_payment_event(&mut self, event: &PaymentEvent) -> Result<()>;

    async fn commit(self) -> Result<()>;
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ProductId, StallId, UserId};
use domain::{
    LineItem, Order, OrderSnapshot, Payment, PaymentEvent, PaymentStatus, ProductStock, Stall,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Result, StoreError,
    store::{Store, StoreTx},
};

#[derive(Clone, Default)]
struct Tables {
    stalls: HashMap<StallId, Stall>,
    products: HashMap<ProductId, ProductStock>,
    /// Order rows without their items.
    orders: HashMap<OrderId, OrderSnapshot>,
    items: Vec<LineItem>,
    payments: Vec<Payment>,
    events: Vec<PaymentEvent>,
}

impl Tables {
    fn product(&self, id: ProductId) -> Option<ProductStock> {
        let mut product = self.products.get(&id)?.clone();
        product.stall_active = self
            .stalls
            .get(&product.stall_id)
            .is_some_and(|stall| stall.active);
        Some(product)
    }

    fn order(&self, id: OrderId) -> Option<Order> {
        let mut snapshot = self.orders.get(&id)?.clone();
        snapshot.items = self
            .items
            .iter()
            .filter(|item| item.order_id == id)
            .cloned()
            .collect();
        Some(Order::from_snapshot(snapshot))
    }

    fn orders_where(&self, predicate: impl Fn(&OrderSnapshot) -> bool) -> Vec<Order> {
        let mut rows: Vec<&OrderSnapshot> = self.orders.values().filter(|o| predicate(*o)).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        rows.into_iter().filter_map(|o| self.order(o.id)).collect()
    }

    fn stalls_for_order(&self, order_id: OrderId) -> Vec<Stall> {
        let mut stalls: Vec<Stall> = self
            .items
            .iter()
            .filter(|item| item.order_id == order_id)
            .filter_map(|item| self.products.get(&item.product_id))
            .filter_map(|product| self.stalls.get(&product.stall_id))
            .cloned()
            .collect();
        stalls.sort_by_key(|stall| stall.id);
        stalls.dedup_by_key(|stall| stall.id);
        stalls
    }

    fn reference_taken(&self, payment: &Payment) -> bool {
        let (Some(provider), Some(reference)) = (&payment.provider, &payment.provider_reference)
        else {
            return false;
        };
        self.payments.iter().any(|p| {
            p.id != payment.id
                && p.provider.as_ref() == Some(provider)
                && p.provider_reference.as_ref() == Some(reference)
        })
    }
}

fn row_only(order: &Order) -> OrderSnapshot {
    let mut snapshot = order.snapshot();
    snapshot.items.clear();
    snapshot
}

fn duplicate(constraint: &str) -> StoreError {
    StoreError::Duplicate {
        constraint: constraint.to_string(),
    }
}

/// In-memory store implementation for tests and local runs.
///
/// All tables sit behind one async mutex. A transaction holds the mutex for
/// its whole lifetime and works on a copy, so transactions are strictly
/// serialized and rollback is simply dropping the copy.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of payments stored.
    pub async fn payment_count(&self) -> usize {
        self.tables.lock().await.payments.len()
    }

    /// Returns the total number of gateway events stored.
    pub async fn payment_event_count(&self) -> usize {
        self.tables.lock().await.events.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTx { guard, working })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.lock().await.order(id))
    }

    async fn list_orders_for_client(&self, client_id: UserId) -> Result<Vec<Order>> {
        Ok(self
            .tables
            .lock()
            .await
            .orders_where(|o| o.client_id == client_id))
    }

    async fn list_orders_for_courier(&self, courier_id: UserId) -> Result<Vec<Order>> {
        Ok(self
            .tables
            .lock()
            .await
            .orders_where(|o| o.courier_id == Some(courier_id)))
    }

    async fn list_orders_for_vendor(&self, vendor_id: UserId) -> Result<Vec<Order>> {
        let tables = self.tables.lock().await;
        Ok(tables.orders_where(|o| {
            tables
                .stalls_for_order(o.id)
                .iter()
                .any(|stall| stall.vendor_id == vendor_id)
        }))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<ProductStock>> {
        Ok(self.tables.lock().await.product(id))
    }

    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let tables = self.tables.lock().await;
        let mut payments: Vec<Payment> = tables
            .payments
            .iter()
            .filter(|p| p.order_id == Some(order_id))
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn find_payment(&self, provider: &str, reference: &str) -> Result<Option<Payment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payments
            .iter()
            .find(|p| {
                p.provider.as_deref() == Some(provider)
                    && p.provider_reference.as_deref() == Some(reference)
            })
            .cloned())
    }

    async fn find_payment_event(
        &self,
        provider: &str,
        reference: &str,
    ) -> Result<Option<PaymentEvent>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .events
            .iter()
            .find(|e| e.provider == provider && e.provider_reference == reference)
            .cloned())
    }

    async fn stalls_for_order(&self, order_id: OrderId) -> Result<Vec<Stall>> {
        Ok(self.tables.lock().await.stalls_for_order(order_id))
    }

    async fn put_stall(&self, stall: &Stall) -> Result<()> {
        self.tables
            .lock()
            .await
            .stalls
            .insert(stall.id, stall.clone());
        Ok(())
    }

    async fn put_product(&self, product: &ProductStock) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if !tables.stalls.contains_key(&product.stall_id) {
            return Err(StoreError::not_found("Stall", product.stall_id));
        }
        tables.products.insert(product.id, product.clone());
        Ok(())
    }
}

/// An in-memory transaction. Holds the store lock until committed or dropped.
pub struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<HashMap<ProductId, ProductStock>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.product(*id))
            .map(|product| (product.id, product))
            .collect())
    }

    async fn update_stock(&mut self, id: ProductId, stock: u32) -> Result<()> {
        let product = self
            .working
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Product", id))?;
        product.stock = stock;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.working.orders.contains_key(&order.id()) {
            return Err(duplicate("orders_pkey"));
        }
        self.working.orders.insert(order.id(), row_only(order));
        Ok(())
    }

    async fn insert_line_item(&mut self, item: &LineItem) -> Result<()> {
        if !self.working.orders.contains_key(&item.order_id) {
            return Err(StoreError::not_found("Order", item.order_id));
        }
        if !self.working.products.contains_key(&item.product_id) {
            return Err(StoreError::not_found("Product", item.product_id));
        }
        self.working.items.push(item.clone());
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.order(id))
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let row = self
            .working
            .orders
            .get_mut(&order.id())
            .ok_or_else(|| StoreError::not_found("Order", order.id()))?;
        *row = row_only(order);
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        if self.working.reference_taken(payment) {
            return Err(duplicate("payments_provider_reference_key"));
        }
        self.working.payments.push(payment.clone());
        Ok(())
    }

    async fn find_payment_for_update(
        &mut self,
        provider: &str,
        reference: &str,
    ) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payments
            .iter()
            .find(|p| {
                p.provider.as_deref() == Some(provider)
                    && p.provider_reference.as_deref() == Some(reference)
            })
            .cloned())
    }

    async fn pending_unreferenced_payment(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| {
                p.order_id == Some(order_id)
                    && p.status == PaymentStatus::Pending
                    && p.provider_reference.is_none()
            })
            .min_by_key(|p| p.created_at)
            .cloned())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        if self.working.reference_taken(payment) {
            return Err(duplicate("payments_provider_reference_key"));
        }
        let row = self
            .working
            .payments
            .iter_mut()
            .find(|p| p.id == payment.id)
            .ok_or_else(|| StoreError::not_found("Payment", payment.id))?;
        *row = payment.clone();
        Ok(())
    }

    async fn insert_payment_event(&mut self, event: &PaymentEvent) -> Result<bool> {
        let exists = self.working.events.iter().any(|e| {
            e.provider == event.provider && e.provider_reference == event.provider_reference
        });
        if exists {
            return Ok(false);
        }
        self.working.events.push(event.clone());
        Ok(true)
    }

    async fn update_payment_event(&mut self, event: &PaymentEvent) -> Result<()> {
        let row = self
            .working
            .events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(|| StoreError::not_found("Payment event", event.id))?;
        *row = event.clone();
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let InMemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::Money;

    use super::*;

    async fn seeded() -> (InMemoryStore, ProductStock) {
        let store = InMemoryStore::new();
        let stall = Stall::new(UserId::new(), "Stall");
        store.put_stall(&stall).await.unwrap();
        let product = ProductStock::new(stall.id, "Eggs", Money::from_cents(300), 10);
        store.put_product(&product).await.unwrap();
        (store, product)
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let (store, product) = seeded().await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.update_stock(product.id, 1).await.unwrap();
        }

        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 10);
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let (store, product) = seeded().await;

        let mut tx = store.begin().await.unwrap();
        tx.update_stock(product.id, 4).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 4);
    }

    #[tokio::test]
    async fn inactive_stall_is_reflected_on_products() {
        let (store, product) = seeded().await;
        let stall = store
            .tables
            .lock()
            .await
            .stalls
            .get(&product.stall_id)
            .cloned()
            .unwrap();
        store
            .put_stall(&Stall {
                active: false,
                ..stall
            })
            .await
            .unwrap();

        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert!(!stored.stall_active);
    }

    #[tokio::test]
    async fn duplicate_payment_reference_is_rejected() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let first = Payment::reported(None, "mp", "ref-1", Money::zero(), PaymentStatus::Pending);
        let second = Payment::reported(None, "mp", "ref-1", Money::zero(), PaymentStatus::Success);
        tx.insert_payment(&first).await.unwrap();

        let err = tx.insert_payment(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn payment_event_insert_reports_duplicates() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let event = PaymentEvent::received("mp", "ref-1", serde_json::json!({"id": "ref-1"}));
        let replay = PaymentEvent::received("mp", "ref-1", serde_json::json!({"id": "ref-1"}));

        assert!(tx.insert_payment_event(&event).await.unwrap());
        assert!(!tx.insert_payment_event(&replay).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.payment_event_count().await, 1);
    }
}

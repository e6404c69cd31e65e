//! Checkout: reserve stock and record the order with a pending payment.

use std::collections::HashSet;
use std::time::Instant;

use common::UserId;
use domain::{
    Authorizer, CartLine, Order, Payment, Role, require_role, reserve, validate_cart,
};
use serde::{Deserialize, Serialize};
use store::{Store, StoreTx};

use crate::error::Result;
use crate::notify::NotificationQueue;

/// A client's cart.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub notes: String,
    pub items: Vec<CartLine>,
}

impl CheckoutRequest {
    pub fn new(items: Vec<CartLine>) -> Self {
        Self {
            notes: String::new(),
            items,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// What a successful checkout created.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub payment: Payment,
}

/// Places orders.
pub struct CheckoutService<S: Store> {
    store: S,
    notifications: Option<NotificationQueue>,
}

impl<S: Store> CheckoutService<S> {
    /// Creates a checkout service that sends no notifications.
    pub fn new(store: S) -> Self {
        Self {
            store,
            notifications: None,
        }
    }

    /// Queues a confirmation for every committed order.
    pub fn with_notifications(mut self, queue: NotificationQueue) -> Self {
        self.notifications = Some(queue);
        self
    }

    /// Places an order for `client_id`.
    ///
    /// Stock is reserved, the order and its line items are written, the
    /// total is recomputed and a pending payment is recorded, all in one
    /// transaction. Any failure leaves no trace.
    #[tracing::instrument(skip(self, authz, request), fields(items = request.items.len()))]
    pub async fn checkout(
        &self,
        client_id: UserId,
        authz: &dyn Authorizer,
        request: CheckoutRequest,
    ) -> Result<CheckoutReceipt> {
        metrics::counter!("checkouts_total").increment(1);
        let started = Instant::now();

        let result = self.place_order(client_id, authz, request).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(receipt) => {
                tracing::info!(
                    order_id = %receipt.order.id(),
                    total = %receipt.order.total(),
                    "order placed"
                );
                self.enqueue_confirmation(&receipt.order);
            }
            Err(e) => {
                metrics::counter!("checkout_failures_total").increment(1);
                tracing::warn!(error = %e, "checkout failed");
            }
        }

        result
    }

    async fn place_order(
        &self,
        client_id: UserId,
        authz: &dyn Authorizer,
        request: CheckoutRequest,
    ) -> Result<CheckoutReceipt> {
        require_role(authz, client_id, Role::Client)?;
        validate_cart(&request.items)?;

        let product_ids: Vec<_> = request.items.iter().map(|line| line.product_id).collect();

        let mut tx = self.store.begin().await?;

        let mut products = tx.lock_products(&product_ids).await?;
        let reservations = reserve(&request.items, &mut products)?;

        let mut written = HashSet::new();
        for reservation in &reservations {
            if written.insert(reservation.product_id) {
                let stock = products[&reservation.product_id].stock;
                tx.update_stock(reservation.product_id, stock).await?;
            }
        }

        let mut order = Order::new(client_id, request.notes);
        tx.insert_order(&order).await?;

        for reservation in &reservations {
            let item = order.add_line_item(
                reservation.product_id,
                reservation.quantity,
                reservation.unit_price,
            )?;
            tx.insert_line_item(item).await?;
        }

        if order.recalculate_total() {
            tx.update_order(&order).await?;
        }

        let payment = Payment::pending(order.id(), order.total());
        tx.insert_payment(&payment).await?;

        tx.commit().await?;

        Ok(CheckoutReceipt { order, payment })
    }

    fn enqueue_confirmation(&self, order: &Order) {
        let Some(queue) = &self.notifications else {
            return;
        };

        if let Err(e) = queue.enqueue(order.id()) {
            metrics::counter!("notification_enqueue_failures_total").increment(1);
            tracing::error!(order_id = %order.id(), error = %e, "failed to queue order confirmation");
        }
    }
}


//! Order queries and client cancellation.

use common::{OrderId, UserId};
use domain::{AccessDenied, Authorizer, Order, Payment, Resource, Role, require_role};
use serde::Serialize;
use store::{Store, StoreTx};

use crate::error::{LifecycleError, Result};

/// An order together with its payments.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub payments: Vec<Payment>,
}

/// Reads orders on behalf of the parties involved, and cancels them.
pub struct OrderService<S: Store> {
    store: S,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads one order with its payments.
    ///
    /// Visible to its client, its courier, any vendor owning one of its
    /// stalls, and admins.
    #[tracing::instrument(skip(self, authz))]
    pub async fn get(
        &self,
        user: UserId,
        authz: &dyn Authorizer,
        order_id: OrderId,
    ) -> Result<OrderDetail> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        if !self.can_view(user, authz, &order).await? {
            return Err(AccessDenied::NotOwner.into());
        }

        let payments = self.store.payments_for_order(order_id).await?;
        Ok(OrderDetail { order, payments })
    }

    /// Orders the client placed, newest first.
    pub async fn list_for_client(&self, user: UserId, authz: &dyn Authorizer) -> Result<Vec<Order>> {
        require_role(authz, user, Role::Client)?;
        Ok(self.store.list_orders_for_client(user).await?)
    }

    /// Orders containing products from the vendor's stalls, newest first.
    pub async fn list_for_vendor(&self, user: UserId, authz: &dyn Authorizer) -> Result<Vec<Order>> {
        require_role(authz, user, Role::Vendor)?;
        Ok(self.store.list_orders_for_vendor(user).await?)
    }

    /// Orders assigned to the courier, newest first.
    pub async fn list_for_courier(&self, user: UserId, authz: &dyn Authorizer) -> Result<Vec<Order>> {
        require_role(authz, user, Role::Courier)?;
        Ok(self.store.list_orders_for_courier(user).await?)
    }

    /// Cancels an order and puts its stock back.
    ///
    /// Only the owning client or an admin may cancel, and only before the
    /// order reaches a terminal state.
    #[tracing::instrument(skip(self, authz))]
    pub async fn cancel(
        &self,
        user: UserId,
        authz: &dyn Authorizer,
        order_id: OrderId,
    ) -> Result<Order> {
        let current = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        if !authz.is_owner(user, Resource::Order(&current)) {
            return Err(AccessDenied::NotOwner.into());
        }

        let product_ids: Vec<_> = current.items().iter().map(|i| i.product_id).collect();

        let mut tx = self.store.begin().await?;
        let mut products = tx.lock_products(&product_ids).await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        order.cancel()?;

        for item in order.items() {
            if let Some(product) = products.get_mut(&item.product_id) {
                product.stock += item.quantity;
            }
        }
        for product in products.values() {
            tx.update_stock(product.id, product.stock).await?;
        }

        tx.update_order(&order).await?;
        tx.commit().await?;

        tracing::info!(%order_id, "order cancelled and stock released");
        Ok(order)
    }

    async fn can_view(&self, user: UserId, authz: &dyn Authorizer, order: &Order) -> Result<bool> {
        if authz.is_owner(user, Resource::Order(order)) || order.courier_id() == Some(user) {
            return Ok(true);
        }

        if !authz.has_role(user, Role::Vendor) {
            return Ok(false);
        }

        let stalls = self.store.stalls_for_order(order.id()).await?;
        Ok(stalls.iter().any(|stall| {
            authz.is_owner(
                user,
                Resource::Stall {
                    stall_id: stall.id,
                    vendor_id: stall.vendor_id,
                },
            )
        }))
    }
}

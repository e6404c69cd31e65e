//! Courier assignment and delivery confirmation.

use common::{OrderId, UserId};
use domain::{Authorizer, Order, Role, require_role};
use store::{Store, StoreTx};

use crate::error::{LifecycleError, Result};

/// Assigns ready orders to couriers and records delivery.
///
/// Both operations lock the order row, so concurrent claims on the same
/// order serialize and only the first one wins.
pub struct DeliveryService<S: Store> {
    store: S,
}

impl<S: Store> DeliveryService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Claims a READY order for `courier`, moving it IN_ROUTE.
    #[tracing::instrument(skip(self, authz))]
    pub async fn claim(
        &self,
        courier: UserId,
        authz: &dyn Authorizer,
        order_id: OrderId,
    ) -> Result<Order> {
        require_role(authz, courier, Role::Courier)?;

        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        order.claim(courier)?;

        tx.update_order(&order).await?;
        tx.commit().await?;

        metrics::counter!("delivery_claims_total").increment(1);
        tracing::info!(%order_id, %courier, "order claimed");
        Ok(order)
    }

    /// Marks an IN_ROUTE order delivered by its assigned courier.
    #[tracing::instrument(skip(self, authz))]
    pub async fn complete(
        &self,
        courier: UserId,
        authz: &dyn Authorizer,
        order_id: OrderId,
    ) -> Result<Order> {
        require_role(authz, courier, Role::Courier)?;

        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        order.complete(courier)?;

        tx.update_order(&order).await?;
        tx.commit().await?;

        metrics::counter!("deliveries_completed_total").increment(1);
        tracing::info!(%order_id, %courier, "order delivered");
        Ok(order)
    }
}

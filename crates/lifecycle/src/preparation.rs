//! Vendor preparation: CONFIRMED -> IN_PREPARATION -> READY.

use common::{OrderId, UserId};
use domain::{AccessDenied, Authorizer, Order, OrderError, Resource, Role, require_role};
use store::{Store, StoreTx};

use crate::error::{LifecycleError, Result};

/// Lets vendors move paid orders towards pickup.
pub struct PreparationService<S: Store> {
    store: S,
}

impl<S: Store> PreparationService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Starts preparing a confirmed order.
    #[tracing::instrument(skip(self, authz))]
    pub async fn start_preparation(
        &self,
        vendor: UserId,
        authz: &dyn Authorizer,
        order_id: OrderId,
    ) -> Result<Order> {
        self.transition(vendor, authz, order_id, Order::start_preparation)
            .await
    }

    /// Marks an order in preparation ready for a courier.
    #[tracing::instrument(skip(self, authz))]
    pub async fn mark_ready(
        &self,
        vendor: UserId,
        authz: &dyn Authorizer,
        order_id: OrderId,
    ) -> Result<Order> {
        self.transition(vendor, authz, order_id, Order::mark_ready)
            .await
    }

    async fn transition(
        &self,
        vendor: UserId,
        authz: &dyn Authorizer,
        order_id: OrderId,
        apply: fn(&mut Order) -> std::result::Result<(), OrderError>,
    ) -> Result<Order> {
        require_role(authz, vendor, Role::Vendor)?;

        if self.store.get_order(order_id).await?.is_none() {
            return Err(LifecycleError::OrderNotFound(order_id));
        }

        let stalls = self.store.stalls_for_order(order_id).await?;
        let owns_stall = stalls.iter().any(|stall| {
            authz.is_owner(
                vendor,
                Resource::Stall {
                    stall_id: stall.id,
                    vendor_id: stall.vendor_id,
                },
            )
        });
        if !owns_stall {
            return Err(AccessDenied::NotOwner.into());
        }

        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        apply(&mut order)?;

        tx.update_order(&order).await?;
        tx.commit().await?;

        tracing::info!(%order_id, state = %order.state(), "order preparation advanced");
        Ok(order)
    }
}

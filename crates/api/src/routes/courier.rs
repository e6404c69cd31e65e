//! Courier endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use store::Store;

use super::orders::{OrderResponse, parse_order_id, to_responses};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /courier/orders: orders assigned to the caller.
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_for_courier(caller.id, &caller).await?;
    Ok(Json(to_responses(&orders)))
}

/// POST /courier/orders/{id}/claim
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn claim<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.delivery.claim(caller.id, &caller, order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /courier/orders/{id}/complete
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn complete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.delivery.complete(caller.id, &caller, order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

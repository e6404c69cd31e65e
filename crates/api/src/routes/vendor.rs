//! Vendor endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use store::Store;

use super::orders::{OrderResponse, parse_order_id, to_responses};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /vendor/orders: orders touching the caller's stalls.
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_for_vendor(caller.id, &caller).await?;
    Ok(Json(to_responses(&orders)))
}

/// POST /vendor/orders/{id}/prepare
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn prepare<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .preparation
        .start_preparation(caller.id, &caller, order_id)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /vendor/orders/{id}/ready
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn ready<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .preparation
        .mark_ready(caller.id, &caller, order_id)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

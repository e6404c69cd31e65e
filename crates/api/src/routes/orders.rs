//! Client order endpoints: checkout, listing, detail and cancellation.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{LineItemId, Money, OrderId, ProductId, UserId};
use domain::{DeliveryState, LineItem, Order, OrderState, Payment};
use lifecycle::CheckoutRequest;
use serde::Serialize;
use store::Store;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub client_id: UserId,
    pub state: OrderState,
    pub delivery_state: DeliveryState,
    pub total: Money,
    pub notes: String,
    pub courier_id: Option<UserId>,
    pub items: Vec<LineItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LineItemResponse {
    pub id: LineItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    pub payment: Payment,
}

#[derive(Debug, Serialize)]
pub struct OrderDetailResponse {
    pub order: OrderResponse,
    pub payments: Vec<Payment>,
}

impl From<&LineItem> for LineItemResponse {
    fn from(item: &LineItem) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            subtotal: item.subtotal(),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id(),
            client_id: order.client_id(),
            state: order.state(),
            delivery_state: order.delivery_state(),
            total: order.total(),
            notes: order.notes().to_string(),
            courier_id: order.courier_id(),
            items: order.items().iter().map(LineItemResponse::from).collect(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

pub(crate) fn to_responses(orders: &[Order]) -> Vec<OrderResponse> {
    orders.iter().map(OrderResponse::from).collect()
}

pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}

// -- Handlers --

/// POST /orders: check out the caller's cart.
#[tracing::instrument(skip(state, caller, payload), fields(user_id = %caller.id))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let Json(request) = payload?;
    let receipt = state.checkout.checkout(caller.id, &caller, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order: OrderResponse::from(&receipt.order),
            payment: receipt.payment,
        }),
    ))
}

/// GET /orders: the caller's own orders.
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_for_client(caller.id, &caller).await?;
    Ok(Json(to_responses(&orders)))
}

/// GET /orders/{id}: one order with its payments.
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let detail = state.orders.get(caller.id, &caller, order_id).await?;

    Ok(Json(OrderDetailResponse {
        order: OrderResponse::from(&detail.order),
        payments: detail.payments,
    }))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orders.cancel(caller.id, &caller, order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

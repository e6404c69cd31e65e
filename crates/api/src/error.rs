//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use lifecycle::LifecycleError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// No caller identity on the request.
    Unauthorized(String),
    /// Webhook signature missing or wrong. Carries no details.
    InvalidSignature,
    /// Lifecycle service error.
    Lifecycle(LifecycleError),
}

/// Status, message and, for per-item failures, the cart line index.
type Mapped = (StatusCode, String, Option<usize>);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, index) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::InvalidSignature => {
                (StatusCode::FORBIDDEN, "Invalid signature".to_string(), None)
            }
            ApiError::Lifecycle(err) => lifecycle_error_to_response(err),
        };

        let mut body = serde_json::json!({ "error": message });
        if let Some(index) = index {
            body["index"] = index.into();
        }
        (status, axum::Json(body)).into_response()
    }
}

fn lifecycle_error_to_response(err: LifecycleError) -> Mapped {
    match &err {
        LifecycleError::Order(order_err) => match order_err {
            OrderError::EmptyCart => (StatusCode::BAD_REQUEST, err.to_string(), None),
            OrderError::InvalidQuantity { index, .. } => {
                (StatusCode::BAD_REQUEST, err.to_string(), Some(*index))
            }
            OrderError::InvalidStateTransition { .. }
            | OrderError::AlreadyAssigned
            | OrderError::InvalidStateForClaim { .. }
            | OrderError::NotAssignedCourier
            | OrderError::InvalidStateForComplete { .. } => {
                (StatusCode::CONFLICT, err.to_string(), None)
            }
        },
        LifecycleError::Inventory(inventory_err) => (
            StatusCode::BAD_REQUEST,
            err.to_string(),
            Some(inventory_err.index()),
        ),
        LifecycleError::Forbidden(_) => (StatusCode::FORBIDDEN, err.to_string(), None),
        LifecycleError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string(), None),
        LifecycleError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string(), None),
        LifecycleError::Store(_) => {
            tracing::error!(error = %err, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                None,
            )
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        ApiError::Lifecycle(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

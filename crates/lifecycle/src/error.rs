//! Lifecycle error types.

use common::OrderId;
use domain::{AccessDenied, InventoryError, OrderError};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// An order rule was violated.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Stock could not be reserved.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// The caller lacks a role or does not own the resource.
    #[error("Access denied: {0}")]
    Forbidden(#[from] AccessDenied),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Input was malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for lifecycle results.
pub type Result<T> = std::result::Result<T, LifecycleError>;

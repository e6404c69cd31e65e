//! Order aggregate and related types.

mod aggregate;
mod line_item;
mod state;

pub use aggregate::{Order, OrderSnapshot, Transition};
pub use line_item::LineItem;
pub use state::{DeliveryState, OrderState, UnknownState};

use thiserror::Error;

use crate::inventory::CartLine;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Checkout was submitted without items.
    #[error("Order must contain at least one item")]
    EmptyCart,

    /// A cart line asked for zero units.
    #[error("Invalid quantity {quantity} for item {index} (must be greater than 0)")]
    InvalidQuantity { index: usize, quantity: u32 },

    /// Order is not in the expected state.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: OrderState,
        action: &'static str,
    },

    /// Another courier already holds the order.
    #[error("Order is already assigned to another courier")]
    AlreadyAssigned,

    /// Order is not ready to be picked up.
    #[error("Order cannot be claimed from {current_state} state")]
    InvalidStateForClaim { current_state: OrderState },

    /// Caller is not the courier holding the order.
    #[error("Caller is not the courier assigned to this order")]
    NotAssignedCourier,

    /// Order is not on its way.
    #[error("Order cannot be completed from {current_state} state")]
    InvalidStateForComplete { current_state: OrderState },
}

/// Checks the shape of a checkout cart before any stock is touched.
pub fn validate_cart(lines: &[CartLine]) -> Result<(), OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyCart);
    }

    for (index, line) in lines.iter().enumerate() {
        if line.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                index,
                quantity: line.quantity,
            });
        }
    }

    Ok(())
}

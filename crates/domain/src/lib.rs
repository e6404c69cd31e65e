//! Domain layer for the marketplace order engine.
//!
//! This crate holds the rules that do not depend on storage:
//! - Order aggregate with line items, totals and the lifecycle state machine
//! - Inventory reservation checks over locked stock rows
//! - Payment records and provider status mapping
//! - The authorization capability consumed by every state transition

pub mod auth;
pub mod inventory;
pub mod order;
pub mod payment;

pub use auth::{AccessDenied, Authorizer, Resource, Role, RoleDirectory, require_role};
pub use inventory::{CartLine, InventoryError, ProductStock, Reservation, Stall, reserve};
pub use order::{
    DeliveryState, LineItem, Order, OrderError, OrderSnapshot, OrderState, Transition,
    UnknownState, validate_cart,
};
pub use payment::{Payment, PaymentEvent, PaymentStatus, ProcessingStatus};

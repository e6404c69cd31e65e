//! Order state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► Confirmed ──► InPreparation ──► Ready ──► InRoute ──► Delivered
///    │            │               │             │          │
///    └────────────┴───────────────┴─────────────┴──────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// Placed at checkout, awaiting payment.
    #[default]
    Created,

    /// Payment confirmed by the gateway.
    Confirmed,

    /// A vendor is preparing the goods.
    InPreparation,

    /// Packed and waiting for a courier.
    Ready,

    /// A courier has the order.
    InRoute,

    /// Handed to the client (terminal state).
    Delivered,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderState {
    /// Returns true if a successful payment moves the order forward.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderState::Created)
    }

    /// Returns true if a vendor can start preparing the order.
    pub fn can_start_preparation(&self) -> bool {
        matches!(self, OrderState::Confirmed)
    }

    /// Returns true if a vendor can mark the order ready for pickup.
    pub fn can_mark_ready(&self) -> bool {
        matches!(self, OrderState::InPreparation)
    }

    /// Returns true if a courier can claim the order.
    pub fn can_claim(&self) -> bool {
        matches!(self, OrderState::Ready)
    }

    /// Returns true if the assigned courier can mark the order delivered.
    pub fn can_complete(&self) -> bool {
        matches!(self, OrderState::InRoute)
    }

    /// Returns true if the order can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Delivered | OrderState::Cancelled)
    }

    /// Returns the state name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Created => "CREATED",
            OrderState::Confirmed => "CONFIRMED",
            OrderState::InPreparation => "IN_PREPARATION",
            OrderState::Ready => "READY",
            OrderState::InRoute => "IN_ROUTE",
            OrderState::Delivered => "DELIVERED",
            OrderState::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a stored state name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown state: {0}")]
pub struct UnknownState(pub String);

impl FromStr for OrderState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(OrderState::Created),
            "CONFIRMED" => Ok(OrderState::Confirmed),
            "IN_PREPARATION" => Ok(OrderState::InPreparation),
            "READY" => Ok(OrderState::Ready),
            "IN_ROUTE" => Ok(OrderState::InRoute),
            "DELIVERED" => Ok(OrderState::Delivered),
            "CANCELLED" => Ok(OrderState::Cancelled),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// Delivery view of an order, derived from its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    /// No courier yet.
    Pending,
    /// Courier assigned and on the way.
    InRoute,
    Delivered,
    Cancelled,
}

impl From<OrderState> for DeliveryState {
    fn from(state: OrderState) -> Self {
        match state {
            OrderState::Created
            | OrderState::Confirmed
            | OrderState::InPreparation
            | OrderState::Ready => DeliveryState::Pending,
            OrderState::InRoute => DeliveryState::InRoute,
            OrderState::Delivered => DeliveryState::Delivered,
            OrderState::Cancelled => DeliveryState::Cancelled,
        }
    }
}

//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::{DeliveryState, LineItem, OrderError, OrderState};

/// Outcome of an idempotent transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The state changed.
    Applied,
    /// The order was already past this point; nothing changed.
    Unchanged,
}

/// Order aggregate root.
///
/// Represents an order with its full lifecycle from checkout to delivery
/// or cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,

    /// Client who placed the order.
    client_id: UserId,

    state: OrderState,

    /// Sum of line item subtotals, as of the last recalculation.
    total: Money,

    notes: String,

    /// Courier holding the order, once claimed.
    courier_id: Option<UserId>,

    items: Vec<LineItem>,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Plain representation of a stored order, used to hydrate the aggregate.
#[derive(Debug, Clone)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub client_id: UserId,
    pub state: OrderState,
    pub total: Money,
    pub notes: String,
    pub courier_id: Option<UserId>,
    pub items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order in the `Created` state with no items.
    pub fn new(client_id: UserId, notes: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            client_id,
            state: OrderState::Created,
            total: Money::zero(),
            notes: notes.into(),
            courier_id: None,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds an order from its stored form.
    pub fn from_snapshot(snapshot: OrderSnapshot) -> Self {
        Self {
            id: snapshot.id,
            client_id: snapshot.client_id,
            state: snapshot.state,
            total: snapshot.total,
            notes: snapshot.notes,
            courier_id: snapshot.courier_id,
            items: snapshot.items,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        }
    }

    /// Returns the stored form of this order.
    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            id: self.id,
            client_id: self.client_id,
            state: self.state,
            total: self.total,
            notes: self.notes.clone(),
            courier_id: self.courier_id,
            items: self.items.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn client_id(&self) -> UserId {
        self.client_id
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    /// Returns the stored total. Call [`Order::recalculate_total`] after
    /// changing items.
    pub fn total(&self) -> Money {
        self.total
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn courier_id(&self) -> Option<UserId> {
        self.courier_id
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the delivery view of this order.
    pub fn delivery_state(&self) -> DeliveryState {
        DeliveryState::from(self.state)
    }

    /// Returns true if any line item references the product.
    pub fn contains_product(&self, product_id: ProductId) -> bool {
        self.items.iter().any(|item| item.product_id == product_id)
    }

    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

// Command methods
impl Order {
    /// Adds a line item at the given unit price.
    ///
    /// Items can only be added while the order is `Created`.
    pub fn add_line_item(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<&LineItem, OrderError> {
        if self.state != OrderState::Created {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.state,
                action: "add item",
            });
        }

        if quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                index: self.items.len(),
                quantity,
            });
        }

        self.items
            .push(LineItem::new(self.id, product_id, quantity, unit_price));
        Ok(&self.items[self.items.len() - 1])
    }

    /// Recomputes the total from the line items.
    ///
    /// Returns true if the stored total changed and must be persisted.
    pub fn recalculate_total(&mut self) -> bool {
        let total: Money = self.items.iter().map(LineItem::subtotal).sum();
        if total == self.total {
            return false;
        }
        self.total = total;
        self.touch();
        true
    }

    /// Applies a successful payment.
    ///
    /// Only a `Created` order moves to `Confirmed`. Orders already confirmed
    /// or further along are left untouched, as are cancelled ones.
    pub fn confirm_payment(&mut self) -> Transition {
        if !self.state.can_confirm() {
            if self.state == OrderState::Cancelled {
                tracing::warn!(order_id = %self.id, "Payment succeeded for a cancelled order");
            }
            return Transition::Unchanged;
        }

        self.state = OrderState::Confirmed;
        self.touch();
        Transition::Applied
    }

    /// Moves a confirmed order into preparation.
    pub fn start_preparation(&mut self) -> Result<(), OrderError> {
        if !self.state.can_start_preparation() {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.state,
                action: "start preparation",
            });
        }
        self.state = OrderState::InPreparation;
        self.touch();
        Ok(())
    }

    /// Marks a prepared order ready for pickup.
    pub fn mark_ready(&mut self) -> Result<(), OrderError> {
        if !self.state.can_mark_ready() {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.state,
                action: "mark ready",
            });
        }
        self.state = OrderState::Ready;
        self.touch();
        Ok(())
    }

    /// Assigns the order to a courier and sets it in route.
    pub fn claim(&mut self, courier_id: UserId) -> Result<(), OrderError> {
        if let Some(assigned) = self.courier_id
            && assigned != courier_id
        {
            return Err(OrderError::AlreadyAssigned);
        }

        if !self.state.can_claim() {
            return Err(OrderError::InvalidStateForClaim {
                current_state: self.state,
            });
        }

        self.courier_id = Some(courier_id);
        self.state = OrderState::InRoute;
        self.touch();
        Ok(())
    }

    /// Marks the order delivered by its assigned courier.
    pub fn complete(&mut self, courier_id: UserId) -> Result<(), OrderError> {
        if self.courier_id != Some(courier_id) {
            return Err(OrderError::NotAssignedCourier);
        }

        if !self.state.can_complete() {
            return Err(OrderError::InvalidStateForComplete {
                current_state: self.state,
            });
        }

        self.state = OrderState::Delivered;
        self.touch();
        Ok(())
    }

    /// Cancels the order. Stock release is the caller's job.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.state.can_cancel() {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.state,
                action: "cancel",
            });
        }
        self.state = OrderState::Cancelled;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

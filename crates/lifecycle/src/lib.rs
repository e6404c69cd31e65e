//! Order lifecycle services.
//!
//! Each service drives one part of an order's life over a [`store::Store`]:
//! 1. Checkout reserves stock and records the order with a pending payment
//! 2. The payment ledger ingests gateway notifications and confirms orders
//! 3. Vendors prepare confirmed orders and mark them ready
//! 4. Couriers claim ready orders and complete delivery
//!
//! Confirmation notices are sent off the request path by the worker in
//! [`notify`].

pub mod checkout;
pub mod delivery;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod orders;
pub mod preparation;
pub mod signature;

pub use checkout::{CheckoutReceipt, CheckoutRequest, CheckoutService};
pub use delivery::DeliveryService;
pub use error::{LifecycleError, Result};
pub use ledger::{LedgerOutcome, PaymentLedger, PaymentNotification};
pub use notify::{
    EnqueueError, InMemoryNotifier, LogNotifier, NotificationDispatcher, NotificationQueue,
    Notifier, NotifyError, RetryPolicy, spawn_notification_worker,
};
pub use orders::{OrderDetail, OrderService};
pub use preparation::PreparationService;
pub use signature::{SignatureError, SignatureVerifier};

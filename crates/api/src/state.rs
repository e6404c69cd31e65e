//! Shared application state.

use lifecycle::{
    CheckoutService, DeliveryService, NotificationQueue, OrderService, PaymentLedger,
    PreparationService, SignatureVerifier,
};
use store::Store;

pub const DEFAULT_PROVIDER: &str = "mercadopago";

/// Services and settings accessible from all handlers.
pub struct AppState<S: Store> {
    pub checkout: CheckoutService<S>,
    pub orders: OrderService<S>,
    pub preparation: PreparationService<S>,
    pub delivery: DeliveryService<S>,
    pub ledger: PaymentLedger<S>,
    pub signature: SignatureVerifier,
    /// Provider recorded when a webhook carries no `x-provider` header.
    pub default_provider: String,
}

impl<S: Store> AppState<S> {
    /// Builds every service over `store`. Webhook signatures are not
    /// checked until [`AppState::with_signature`] is called.
    pub fn new(store: S, notifications: Option<NotificationQueue>) -> Self {
        let mut checkout = CheckoutService::new(store.clone());
        if let Some(queue) = notifications {
            checkout = checkout.with_notifications(queue);
        }

        Self {
            checkout,
            orders: OrderService::new(store.clone()),
            preparation: PreparationService::new(store.clone()),
            delivery: DeliveryService::new(store.clone()),
            ledger: PaymentLedger::new(store),
            signature: SignatureVerifier::default(),
            default_provider: DEFAULT_PROVIDER.to_string(),
        }
    }

    pub fn with_signature(mut self, signature: SignatureVerifier) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = provider.into();
        self
    }
}

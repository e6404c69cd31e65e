//! Payment ledger: idempotent ingestion of gateway notifications.

use common::{Money, OrderId};
use domain::{
    Order, Payment, PaymentEvent, PaymentStatus, ProcessingStatus, Transition,
};
use serde_json::Value;
use store::{Store, StoreError, StoreTx};

use crate::error::{LifecycleError, Result};

/// A gateway notification, already authenticated.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentNotification {
    pub provider: String,
    /// The gateway's own payment id. Deduplication key with `provider`.
    pub provider_reference: String,
    /// Our order id, as echoed back by the gateway.
    pub order_reference: Option<String>,
    pub status: Option<String>,
    pub amount: Option<Money>,
    pub raw_payload: Value,
}

impl PaymentNotification {
    /// Extracts a notification from a gateway payload.
    ///
    /// The reference comes from `id`, falling back to `provider_ref`. The
    /// order comes from `external_reference`. Amounts that cannot be read
    /// are dropped rather than rejected.
    pub fn from_payload(provider: impl Into<String>, payload: Value) -> Result<Self> {
        let provider_reference = field_text(&payload, "id")
            .or_else(|| field_text(&payload, "provider_ref"))
            .ok_or_else(|| LifecycleError::Validation("missing provider reference".to_string()))?;

        let amount = match payload.get("amount") {
            None | Some(Value::Null) => None,
            Some(raw) => {
                let parsed = field_text(&payload, "amount").and_then(|text| text.parse().ok());
                if parsed.is_none() {
                    tracing::warn!(amount = %raw, "ignoring unreadable payment amount");
                }
                parsed
            }
        };

        Ok(Self {
            provider: provider.into(),
            provider_reference,
            order_reference: field_text(&payload, "external_reference"),
            status: field_text(&payload, "status"),
            amount,
            raw_payload: payload,
        })
    }
}

/// Non-empty string or number field, as text.
fn field_text(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Result of recording a notification.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOutcome {
    Recorded {
        payment: Payment,
        /// True if this notification moved the order to CONFIRMED.
        order_confirmed: bool,
    },
    /// Already seen; nothing changed.
    Duplicate,
}

/// Records gateway notifications against payments and orders.
pub struct PaymentLedger<S: Store> {
    store: S,
}

impl<S: Store> PaymentLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Records one notification in a single transaction.
    ///
    /// The event log row is the idempotency anchor: if one already exists for
    /// `(provider, provider_reference)` the call returns
    /// [`LedgerOutcome::Duplicate`] and writes nothing. Otherwise the payment
    /// is upserted and, on success, the order confirmed.
    #[tracing::instrument(
        skip(self, notification),
        fields(
            provider = %notification.provider,
            provider_reference = %notification.provider_reference,
        )
    )]
    pub async fn record_payment_event(
        &self,
        notification: PaymentNotification,
    ) -> Result<LedgerOutcome> {
        if notification.provider_reference.trim().is_empty() {
            return Err(LifecycleError::Validation(
                "missing provider reference".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;

        let mut event = PaymentEvent::received(
            notification.provider.clone(),
            notification.provider_reference.clone(),
            notification.raw_payload.clone(),
        );
        if !tx.insert_payment_event(&event).await? {
            metrics::counter!("webhook_duplicates_total").increment(1);
            tracing::info!("payment event already recorded, skipping");
            return Ok(LedgerOutcome::Duplicate);
        }

        let status = PaymentStatus::from_provider(notification.status.as_deref());
        metrics::counter!("webhook_events_total", "status" => status.as_str()).increment(1);

        let mut order = match parse_order_reference(notification.order_reference.as_deref()) {
            Some(order_id) => tx.lock_order(order_id).await?,
            None => None,
        };
        if order.is_none() {
            tracing::warn!(
                order_reference = ?notification.order_reference,
                "payment event references no known order"
            );
        }

        let payment = upsert_payment(&mut tx, &notification, status, order.as_ref()).await?;

        let mut order_confirmed = false;
        if status == PaymentStatus::Success
            && let Some(order) = order.as_mut()
        {
            if order.confirm_payment() == Transition::Applied {
                tx.update_order(order).await?;
                order_confirmed = true;
                metrics::counter!("orders_confirmed_total").increment(1);
            } else {
                tracing::info!(order_id = %order.id(), state = %order.state(), "order already past confirmation");
            }
        }

        event.finish(if order.is_some() {
            ProcessingStatus::Processed
        } else {
            ProcessingStatus::OrderNotFound
        });
        tx.update_payment_event(&event).await?;

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            status = %payment.status,
            order_confirmed,
            "payment event recorded"
        );
        Ok(LedgerOutcome::Recorded {
            payment,
            order_confirmed,
        })
    }
}

fn parse_order_reference(reference: Option<&str>) -> Option<OrderId> {
    OrderId::parse(reference?.trim()).ok()
}

/// Finds or creates the payment a notification refers to and applies it.
///
/// Lookup order: an existing payment with the same reference, then the
/// order's pending payment from checkout, then a new row. If the insert
/// loses a race to a concurrent writer, the winner's row is updated instead.
async fn upsert_payment<T: StoreTx>(
    tx: &mut T,
    notification: &PaymentNotification,
    status: PaymentStatus,
    order: Option<&Order>,
) -> Result<Payment> {
    let provider = notification.provider.as_str();
    let reference = notification.provider_reference.as_str();

    if let Some(existing) = tx.find_payment_for_update(provider, reference).await? {
        return apply_to(tx, existing, notification, status, order).await;
    }

    if let Some(order) = order
        && let Some(pending) = tx.pending_unreferenced_payment(order.id()).await?
    {
        return apply_to(tx, pending, notification, status, Some(order)).await;
    }

    let amount = notification
        .amount
        .unwrap_or_else(|| order.map(Order::total).unwrap_or_default());
    let payment = Payment::reported(
        order.map(Order::id),
        provider,
        reference,
        amount,
        status,
    );

    match tx.insert_payment(&payment).await {
        Ok(()) => Ok(payment),
        Err(StoreError::Duplicate { .. }) => {
            tracing::warn!("payment reference taken concurrently, updating existing row");
            match tx.find_payment_for_update(provider, reference).await? {
                Some(existing) => apply_to(tx, existing, notification, status, order).await,
                None => {
                    tracing::warn!("payment vanished after conflict, re-creating");
                    tx.insert_payment(&payment).await?;
                    Ok(payment)
                }
            }
        }
        Err(e) => Err(e.into()),
    }
}

async fn apply_to<T: StoreTx>(
    tx: &mut T,
    mut payment: Payment,
    notification: &PaymentNotification,
    status: PaymentStatus,
    order: Option<&Order>,
) -> Result<Payment> {
    payment.apply_report(
        &notification.provider,
        &notification.provider_reference,
        status,
        notification.amount,
    );
    if payment.order_id.is_none() {
        payment.order_id = order.map(Order::id);
    }
    tx.update_payment(&payment).await?;
    Ok(payment)
}

//! Payment records and gateway status mapping.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentEventId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::order::UnknownState;

/// Status of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Maps a gateway-reported status. Unknown or missing values are failures.
    pub fn from_provider(status: Option<&str>) -> Self {
        let Some(status) = status else {
            return PaymentStatus::Failed;
        };

        match status.trim().to_ascii_lowercase().as_str() {
            "approved" | "paid" | "success" => PaymentStatus::Success,
            "pending" | "in_process" => PaymentStatus::Pending,
            _ => PaymentStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "SUCCESS" => Ok(PaymentStatus::Success),
            "FAILED" => Ok(PaymentStatus::Failed),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// A payment attempt against an order.
///
/// `order_id` is optional because gateways may report payments for orders
/// this system does not know about; those are still recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: Option<OrderId>,
    pub amount: Money,
    pub status: PaymentStatus,
    pub provider: Option<String>,
    pub provider_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates the pending payment recorded at checkout.
    pub fn pending(order_id: OrderId, amount: Money) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            order_id: Some(order_id),
            amount,
            status: PaymentStatus::Pending,
            provider: None,
            provider_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a payment first seen through a gateway notification.
    pub fn reported(
        order_id: Option<OrderId>,
        provider: impl Into<String>,
        provider_reference: impl Into<String>,
        amount: Money,
        status: PaymentStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            order_id,
            amount,
            status,
            provider: Some(provider.into()),
            provider_reference: Some(provider_reference.into()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a gateway report. A missing amount keeps the current one.
    pub fn apply_report(
        &mut self,
        provider: &str,
        provider_reference: &str,
        status: PaymentStatus,
        amount: Option<Money>,
    ) {
        self.provider = Some(provider.to_string());
        self.provider_reference = Some(provider_reference.to_string());
        self.status = status;
        if let Some(amount) = amount {
            self.amount = amount;
        }
        self.updated_at = Utc::now();
    }
}

/// How far processing of a gateway event got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Received,
    Processed,
    /// The event referenced an order that does not exist.
    OrderNotFound,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Received => "RECEIVED",
            ProcessingStatus::Processed => "PROCESSED",
            ProcessingStatus::OrderNotFound => "ORDER_NOT_FOUND",
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECEIVED" => Ok(ProcessingStatus::Received),
            "PROCESSED" => Ok(ProcessingStatus::Processed),
            "ORDER_NOT_FOUND" => Ok(ProcessingStatus::OrderNotFound),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// Raw gateway notification, kept for audit and deduplication.
///
/// `(provider, provider_reference)` is unique across all events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub id: PaymentEventId,
    pub provider: String,
    pub provider_reference: String,
    pub received_at: DateTime<Utc>,
    pub raw_payload: serde_json::Value,
    pub processing_status: ProcessingStatus,
    pub handled: bool,
}

impl PaymentEvent {
    pub fn received(
        provider: impl Into<String>,
        provider_reference: impl Into<String>,
        raw_payload: serde_json::Value,
    ) -> Self {
        Self {
            id: PaymentEventId::new(),
            provider: provider.into(),
            provider_reference: provider_reference.into(),
            received_at: Utc::now(),
            raw_payload,
            processing_status: ProcessingStatus::Received,
            handled: false,
        }
    }

    /// Marks the event handled with its final status.
    pub fn finish(&mut self, status: ProcessingStatus) {
        self.processing_status = status;
        self.handled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_mapping() {
        for s in ["approved", "APPROVED", "paid", "Success"] {
            assert_eq!(PaymentStatus::from_provider(Some(s)), PaymentStatus::Success, "{s}");
        }
        for s in ["pending", "in_process", "IN_PROCESS"] {
            assert_eq!(PaymentStatus::from_provider(Some(s)), PaymentStatus::Pending, "{s}");
        }
        for s in ["rejected", "cancelled", ""] {
            assert_eq!(PaymentStatus::from_provider(Some(s)), PaymentStatus::Failed, "{s}");
        }
        assert_eq!(PaymentStatus::from_provider(None), PaymentStatus::Failed);
    }

    #[test]
    fn stored_names_parse_back() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Success,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        assert_eq!(
            "ORDER_NOT_FOUND".parse::<ProcessingStatus>().unwrap(),
            ProcessingStatus::OrderNotFound
        );
    }

    #[test]
    fn report_without_amount_keeps_existing_amount() {
        let mut payment = Payment::pending(OrderId::new(), Money::from_cents(400));
        payment.apply_report("mercadopago", "mp-1", PaymentStatus::Success, None);

        assert_eq!(payment.amount, Money::from_cents(400));
        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(payment.provider_reference.as_deref(), Some("mp-1"));
    }

    #[test]
    fn finishing_event_marks_it_handled() {
        let mut event = PaymentEvent::received("mercadopago", "mp-1", serde_json::json!({}));
        assert!(!event.handled);
        event.finish(ProcessingStatus::OrderNotFound);
        assert!(event.handled);
        assert_eq!(event.processing_status, ProcessingStatus::OrderNotFound);
    }
}

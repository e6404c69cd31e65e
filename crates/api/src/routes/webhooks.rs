//! Payment gateway webhook.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use lifecycle::{LedgerOutcome, PaymentNotification};
use serde::Serialize;
use serde_json::Value;
use store::Store;

use crate::error::ApiError;
use crate::state::AppState;

pub const PROVIDER_HEADER: &str = "x-provider";
pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
    pub duplicate: bool,
}

/// POST /payments/webhook
///
/// The signature is checked against the raw body before anything is
/// parsed. A failed check writes nothing.
#[tracing::instrument(skip(state, headers, body), fields(bytes = body.len()))]
pub async fn receive<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = header_text(&headers, SIGNATURE_HEADER);
    if state.signature.verify(&body, signature).is_err() {
        metrics::counter!("webhook_rejections_total").increment(1);
        tracing::warn!("webhook rejected: invalid signature");
        return Err(ApiError::InvalidSignature);
    }

    let provider = header_text(&headers, PROVIDER_HEADER)
        .unwrap_or(state.default_provider.as_str())
        .to_string();

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON payload: {e}")))?;
    let notification = PaymentNotification::from_payload(provider, payload)?;

    let outcome = state.ledger.record_payment_event(notification).await?;

    Ok(Json(WebhookResponse {
        ok: true,
        duplicate: outcome == LedgerOutcome::Duplicate,
    }))
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

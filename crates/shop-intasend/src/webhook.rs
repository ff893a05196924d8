//! # IntaSend Webhook Handling
//!
//! IntaSend posts collection events as JSON. Deliveries may repeat and may
//! arrive before or after the buyer's redirect confirmation; the order
//! reconciler makes both paths idempotent, this module only authenticates and
//! parses them.

use serde::Deserialize;
use shop_core::{EventSource, PaymentEvent, PaymentStatus, ShopError, ShopResult};
use tracing::debug;

/// Raw webhook body
#[derive(Debug, Deserialize)]
struct IntaSendWebhook {
    #[serde(default)]
    api_ref: Option<String>,
    #[serde(default, alias = "checkout_id")]
    id: Option<String>,
    #[serde(default, alias = "tracking_id")]
    invoice_id: Option<String>,
    state: String,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    failed_reason: Option<String>,
}

/// Authenticate a webhook body against the configured challenge and parse it.
pub fn parse_webhook(payload: &[u8], expected_challenge: Option<&str>) -> ShopResult<PaymentEvent> {
    let hook: IntaSendWebhook = serde_json::from_slice(payload)
        .map_err(|e| ShopError::WebhookParse(format!("Failed to parse webhook: {e}")))?;

    if let Some(expected) = expected_challenge {
        let received = hook.challenge.as_deref().ok_or_else(|| {
            ShopError::WebhookVerificationFailed("Missing challenge".to_string())
        })?;
        if !constant_time_compare(received, expected) {
            return Err(ShopError::WebhookVerificationFailed(
                "Challenge mismatch".to_string(),
            ));
        }
    }

    let api_ref = hook
        .api_ref
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| ShopError::WebhookParse("Missing api_ref".to_string()))?;

    let status = PaymentStatus::from_gateway_state(&hook.state);

    if let Some(reason) = &hook.failed_reason {
        debug!(api_ref = %api_ref, reason = %reason, "IntaSend reported failure reason");
    }

    Ok(
        PaymentEvent::new(api_ref, status, EventSource::Webhook)
            .with_gateway_ids(hook.id, hook.invoice_id),
    )
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

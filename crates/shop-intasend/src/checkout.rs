//! # IntaSend Hosted Checkout
//!
//! Implementation of the IntaSend checkout API.
//! One POST per attempt, bounded by the configured timeout and never retried
//! here: a second call would open a second provider session.

use crate::config::IntaSendConfig;
use crate::webhook::parse_webhook;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shop_core::{
    CheckoutRequest, CheckoutSession, PaymentEvent, PaymentGateway, PaymentStatus, ShopError,
    ShopResult,
};
use tracing::{debug, error, info, instrument};

const PROVIDER: &str = "intasend";

/// IntaSend hosted checkout gateway
pub struct IntaSendGateway {
    config: IntaSendConfig,
    client: Client,
}

impl IntaSendGateway {
    /// Create a new gateway with its own HTTP client
    pub fn new(config: IntaSendConfig) -> ShopResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ShopError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> ShopResult<Self> {
        Self::new(IntaSendConfig::from_env()?)
    }

    pub fn config(&self) -> &IntaSendConfig {
        &self.config
    }

    fn build_payload(request: &CheckoutRequest) -> IntaSendCheckoutPayload<'_> {
        IntaSendCheckoutPayload {
            first_name: &request.contact.first_name,
            last_name: &request.contact.last_name,
            email: &request.contact.email,
            phone_number: &request.contact.phone,
            amount: request.amount.as_decimal(),
            currency: request.amount.currency.as_str(),
            api_ref: &request.api_ref,
            redirect_url: &request.redirect_url,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> ShopError {
        if e.is_timeout() {
            ShopError::GatewayTimeout {
                timeout_secs: self.config.timeout.as_secs(),
            }
        } else {
            ShopError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl PaymentGateway for IntaSendGateway {
    #[instrument(skip(self, request), fields(api_ref = %request.api_ref))]
    async fn create_checkout(&self, request: &CheckoutRequest) -> ShopResult<CheckoutSession> {
        if request.amount.amount <= 0 {
            return Err(ShopError::Validation(
                "Checkout amount must be positive".to_string(),
            ));
        }

        let payload = Self::build_payload(request);
        debug!(
            "Creating IntaSend checkout: amount={}, redirect={}",
            request.amount.display(),
            request.redirect_url
        );

        let response = self
            .client
            .post(self.config.checkout_url())
            .header("X-IntaSend-Public-API-Key", &self.config.public_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            error!("IntaSend API error: status={}, body={}", status, body);
            return Err(ShopError::Gateway {
                provider: PROVIDER.to_string(),
                message: error_message(&body).unwrap_or_else(|| format!("HTTP {status}: {body}")),
            });
        }

        let created: IntaSendCheckoutResponse = serde_json::from_str(&body).map_err(|e| {
            ShopError::Gateway {
                provider: PROVIDER.to_string(),
                message: format!("Unreadable checkout response: {e}"),
            }
        })?;

        info!(
            "Created IntaSend checkout: id={}, url={}",
            created.id, created.url
        );

        if let Some(echoed) = created.api_ref.as_deref() {
            if echoed != request.api_ref {
                error!(
                    "IntaSend echoed api_ref {} for request {}",
                    echoed, request.api_ref
                );
            }
        }

        Ok(CheckoutSession {
            session_id: created.id,
            api_ref: request.api_ref.clone(),
            provider: PROVIDER.to_string(),
            checkout_url: created.url,
            state: created
                .state
                .as_deref()
                .map(PaymentStatus::from_gateway_state)
                .unwrap_or_default(),
            amount: request.amount,
            created_at: Utc::now(),
        })
    }

    #[instrument(skip(self, payload))]
    async fn verify_webhook(&self, payload: &[u8]) -> ShopResult<PaymentEvent> {
        let event = parse_webhook(payload, self.config.webhook_challenge.as_deref())?;
        debug!(
            "Verified IntaSend webhook: api_ref={}, status={}",
            event.api_ref, event.status
        );
        Ok(event)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Pull a human readable message out of an IntaSend error body
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    if let Some(detail) = value.get("detail").and_then(|v| v.as_str()) {
        return Some(detail.to_string());
    }
    value
        .get("errors")
        .and_then(|e| e.as_array())
        .and_then(|errors| errors.first())
        .and_then(|first| first.get("detail"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

// =============================================================================
// IntaSend API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct IntaSendCheckoutPayload<'a> {
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
    phone_number: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    currency: &'a str,
    api_ref: &'a str,
    redirect_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct IntaSendCheckoutResponse {
    id: String,
    url: String,
    #[serde(default)]
    api_ref: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

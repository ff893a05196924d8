//! # Payment Gateway Trait
//!
//! Strategy seam for hosted-checkout providers. The checkout initiator and
//! the webhook endpoint only see this trait; IntaSend is the shipped
//! implementation.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │        PaymentGateway (trait)            │
//! │  ├── create_checkout()                   │
//! │  ├── verify_webhook()                    │
//! │  └── provider_name()                     │
//! └──────────────────────────────────────────┘
//!                     ▲
//!          ┌──────────┴──────────┐
//!  ┌───────┴────────┐   ┌────────┴───────┐
//!  │ IntaSendGateway│   │  test doubles  │
//!  └────────────────┘   └────────────────┘
//! ```

use crate::checkout::{CheckoutRequest, CheckoutSession};
use crate::error::{ShopError, ShopResult};
use crate::order::PaymentEvent;
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// Core trait for payment provider implementations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted checkout session.
    ///
    /// Called once per attempt; implementations must bound the call with a
    /// timeout and must not retry on their own.
    async fn create_checkout(&self, request: &CheckoutRequest) -> ShopResult<CheckoutSession>;

    /// Verify a webhook delivery and parse it into a payment event.
    ///
    /// # Arguments
    /// * `payload` - Raw webhook body bytes
    async fn verify_webhook(&self, payload: &[u8]) -> ShopResult<PaymentEvent>;

    /// Get the provider name (for logging and routing).
    fn provider_name(&self) -> &'static str;
}

/// Type alias for a shared gateway (dynamic dispatch)
pub type BoxedPaymentGateway = Arc<dyn PaymentGateway>;

/// URLs the buyer is sent back to after the hosted checkout
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    /// Base URL of the storefront (e.g., "https://duka.example.co.ke")
    pub base_url: String,
    /// Success page path (e.g., "/checkout/success")
    pub success_path: String,
}

impl CheckoutUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            success_path: "/checkout/success".to_string(),
        }
    }

    pub fn success_url(&self) -> String {
        format!("{}{}", self.base_url, self.success_path)
    }

    /// Success URL carrying the reference so the landing page can confirm
    pub fn success_url_for(&self, api_ref: &str) -> ShopResult<String> {
        with_api_ref(&self.success_url(), api_ref)
    }
}

impl Default for CheckoutUrls {
    fn default() -> Self {
        Self::new("http://localhost:8080")
    }
}

/// Append `api_ref` as an encoded query pair, keeping any existing query
pub fn with_api_ref(url: &str, api_ref: &str) -> ShopResult<String> {
    let mut url = Url::parse(url)
        .map_err(|e| ShopError::Configuration(format!("Invalid redirect URL {url}: {e}")))?;
    url.query_pairs_mut().append_pair("api_ref", api_ref);
    Ok(url.into())
}

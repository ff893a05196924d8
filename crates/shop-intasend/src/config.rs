//! # IntaSend Configuration
//!
//! Configuration management for the IntaSend integration.
//! All secrets are loaded from environment variables.

use shop_core::ShopError;
use std::env;
use std::time::Duration;

const DEFAULT_API_URL: &str = "https://api.intasend.com/api/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// IntaSend API configuration
#[derive(Debug, Clone)]
pub struct IntaSendConfig {
    /// Public API key (ISPubKey_test_... or ISPubKey_live_...)
    pub public_key: String,

    /// API base URL (sandbox or live, overridable for testing)
    pub api_base_url: String,

    /// Challenge string configured on the IntaSend webhook, echoed in every delivery
    pub webhook_challenge: Option<String>,

    /// Upper bound for the checkout call
    pub timeout: Duration,
}

impl IntaSendConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `INTASEND_PUBLIC_KEY`
    ///
    /// Optional:
    /// - `INTASEND_API_URL`
    /// - `INTASEND_WEBHOOK_CHALLENGE`
    /// - `INTASEND_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, ShopError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let public_key = env::var("INTASEND_PUBLIC_KEY").map_err(|_| {
            ShopError::Configuration("INTASEND_PUBLIC_KEY not set".to_string())
        })?;

        if !public_key.starts_with("ISPubKey_") {
            return Err(ShopError::Configuration(
                "INTASEND_PUBLIC_KEY must start with ISPubKey_".to_string(),
            ));
        }

        let api_base_url =
            env::var("INTASEND_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let webhook_challenge = env::var("INTASEND_WEBHOOK_CHALLENGE")
            .ok()
            .filter(|c| !c.is_empty());

        let timeout_secs = match env::var("INTASEND_TIMEOUT_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                ShopError::Configuration(format!("INTASEND_TIMEOUT_SECS is not a number: {raw}"))
            })?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            public_key,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            webhook_challenge,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Create config with explicit values (for testing)
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            api_base_url: DEFAULT_API_URL.to_string(),
            webhook_challenge: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Check if using sandbox keys
    pub fn is_test_mode(&self) -> bool {
        self.public_key.starts_with("ISPubKey_test_")
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Builder: require this challenge on webhook deliveries
    pub fn with_webhook_challenge(mut self, challenge: impl Into<String>) -> Self {
        self.webhook_challenge = Some(challenge.into());
        self
    }

    /// Builder: set the checkout call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn checkout_url(&self) -> String {
        format!("{}/checkout/", self.api_base_url)
    }
}

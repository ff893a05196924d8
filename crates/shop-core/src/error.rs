//! # Shop Error Types
//!
//! Typed error handling for the storefront engine.
//! All catalog, cart and checkout operations return `Result<T, ShopError>`.

use thiserror::Error;

/// Broad category of a [`ShopError`], used for HTTP mapping and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before the store is touched
    Validation,
    /// Product, cart item, order or checkout session absent
    NotFound,
    /// Insufficient stock, inactive product
    BusinessRule,
    /// Payment gateway unreachable or returned an error
    ExternalService,
    /// Database, configuration and other unexpected failures
    Internal,
}

/// Core error type for all storefront operations
#[derive(Debug, Error)]
pub enum ShopError {
    /// Invalid request data
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Product not found in the catalog
    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: i64 },

    /// Cart line not found in the session's cart
    #[error("Cart item not found: {item_id}")]
    CartItemNotFound { item_id: i64 },

    /// Order not found
    #[error("Order not found: {reference}")]
    OrderNotFound { reference: String },

    /// No checkout session was opened for this reference
    #[error("Checkout session not found for api_ref {api_ref}")]
    CheckoutNotFound { api_ref: String },

    /// Requested quantity exceeds current stock
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: u32,
        available: u32,
    },

    /// Product is inactive or flagged out of stock
    #[error("Product is not available: {product_id}")]
    ProductUnavailable { product_id: i64 },

    /// Advisory stock check failed while editing a cart
    #[error("Only {available} of {product_id} available in stock")]
    OutOfStock { product_id: i64, available: u32 },

    /// Payment gateway API error
    #[error("Gateway error [{provider}]: {message}")]
    Gateway { provider: String, message: String },

    /// Network/HTTP error communicating with the gateway
    #[error("Network error: {0}")]
    Network(String),

    /// The bounded gateway call did not answer in time
    #[error("Gateway timed out after {timeout_secs}s")]
    GatewayTimeout { timeout_secs: u64 },

    /// Webhook verification failed
    #[error("Webhook verification failed: {0}")]
    WebhookVerificationFailed(String),

    /// Webhook payload parsing error
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Durable store error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShopError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShopError::Validation(_) => ErrorKind::Validation,
            ShopError::ProductNotFound { .. }
            | ShopError::CartItemNotFound { .. }
            | ShopError::OrderNotFound { .. }
            | ShopError::CheckoutNotFound { .. } => ErrorKind::NotFound,
            ShopError::InsufficientStock { .. }
            | ShopError::ProductUnavailable { .. }
            | ShopError::OutOfStock { .. } => ErrorKind::BusinessRule,
            ShopError::Gateway { .. }
            | ShopError::Network(_)
            | ShopError::GatewayTimeout { .. }
            | ShopError::WebhookVerificationFailed(_)
            | ShopError::WebhookParse(_) => ErrorKind::ExternalService,
            ShopError::Configuration(_)
            | ShopError::Database(_)
            | ShopError::Serialization(_)
            | ShopError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the same request may succeed when repeated later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ShopError::Network(_)
                | ShopError::GatewayTimeout { .. }
                | ShopError::Gateway { .. }
                | ShopError::Database(_)
        )
    }

    /// Whether a reconciliation failure should be redelivered by the gateway.
    ///
    /// Money has already moved once a payment event arrives, so anything
    /// except a forged or unreadable payload is worth another attempt.
    pub fn is_retryable_after_payment(&self) -> bool {
        !matches!(
            self,
            ShopError::Validation(_)
                | ShopError::WebhookVerificationFailed(_)
                | ShopError::WebhookParse(_)
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ShopError::WebhookVerificationFailed(_) => 401,
            ShopError::WebhookParse(_) => 400,
            ShopError::GatewayTimeout { .. } => 504,
            ShopError::Network(_) => 503,
            ShopError::Gateway { .. } => 502,
            _ => match self.kind() {
                ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::BusinessRule => 400,
                ErrorKind::ExternalService => 502,
                ErrorKind::Internal => 500,
            },
        }
    }
}

#[cfg(feature = "db")]
impl From<sqlx::Error> for ShopError {
    fn from(err: sqlx::Error) -> Self {
        ShopError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ShopError {
    fn from(err: serde_json::Error) -> Self {
        ShopError::Serialization(err.to_string())
    }
}

/// Result type alias for storefront operations
pub type ShopResult<T> = Result<T, ShopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(ShopError::Network("timeout".into()).is_retryable());
        assert!(ShopError::GatewayTimeout { timeout_secs: 30 }.is_retryable());
        assert!(!ShopError::Validation("bad data".into()).is_retryable());
        assert!(!ShopError::InsufficientStock {
            product_id: 1,
            requested: 5,
            available: 3
        }
        .is_retryable());
    }

    #[test]
    fn test_retryable_after_payment() {
        assert!(ShopError::ProductNotFound { product_id: 9 }.is_retryable_after_payment());
        assert!(ShopError::CheckoutNotFound {
            api_ref: "R1".into()
        }
        .is_retryable_after_payment());
        assert!(!ShopError::WebhookVerificationFailed("challenge".into())
            .is_retryable_after_payment());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ShopError::Validation("test".into()).status_code(), 400);
        assert_eq!(ShopError::ProductNotFound { product_id: 3 }.status_code(), 400);
        assert_eq!(ShopError::CartItemNotFound { item_id: 7 }.status_code(), 400);
        assert_eq!(
            ShopError::InsufficientStock {
                product_id: 3,
                requested: 2,
                available: 1
            }
            .status_code(),
            400
        );
        assert_eq!(
            ShopError::Gateway {
                provider: "intasend".into(),
                message: "nope".into()
            }
            .status_code(),
            502
        );
        assert_eq!(ShopError::Database("locked".into()).status_code(), 500);
        assert_eq!(ShopError::WebhookParse("not json".into()).status_code(), 400);
        assert_eq!(ShopError::WebhookVerificationFailed("bad".into()).status_code(), 401);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            ShopError::OutOfStock {
                product_id: 4,
                available: 0
            }
            .kind(),
            ErrorKind::BusinessRule
        );
        assert_eq!(
            ShopError::OrderNotFound {
                reference: "42".into()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(ShopError::Network("x".into()).kind(), ErrorKind::ExternalService);
    }
}

//! # shop-intasend
//!
//! IntaSend hosted-checkout gateway for the storefront.
//!
//! The buyer pays on IntaSend's page (M-PESA, card); this crate opens the
//! checkout session and authenticates the webhook deliveries that report the
//! outcome.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shop_intasend::IntaSendGateway;
//! use shop_core::PaymentGateway;
//!
//! let gateway = IntaSendGateway::from_env()?;
//! let session = gateway.create_checkout(&request).await?;
//! // Redirect user to session.checkout_url
//! ```
//!
//! ## Webhook Handling
//!
//! ```rust,ignore
//! let event = gateway.verify_webhook(&body).await?;
//! reconciler.reconcile(event).await?;
//! ```

pub mod checkout;
pub mod config;
pub mod webhook;

// Re-exports
pub use checkout::IntaSendGateway;
pub use config::IntaSendConfig;
pub use webhook::parse_webhook;

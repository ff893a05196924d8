//! # shop-core
//!
//! Core types and traits for the storefront checkout engine.
//!
//! This crate provides:
//! - `PaymentGateway` trait for hosted-checkout providers
//! - `Product`, `Price` and `Currency` for the catalog
//! - `Cart` and `CartLine` for session carts
//! - `CheckoutRequest`, `CheckoutSession` and `LineItem` for checkout
//! - `Order`, `OrderLine`, `PaymentEvent` for reconciliation
//! - `ShopError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use shop_core::{CheckoutRequest, ContactInfo, Currency, LineItem, lines_total};
//!
//! let amount = lines_total(&lines, Currency::KES)?;
//! let request = CheckoutRequest {
//!     contact: ContactInfo::new("Amina", "Odhiambo", "amina@example.com", "254700000000"),
//!     amount,
//!     api_ref: "order-7f3a".into(),
//!     redirect_url: urls.success_url_for("order-7f3a")?,
//! };
//!
//! let session = gateway.create_checkout(&request).await?;
//! // Redirect user to session.checkout_url
//! ```

pub mod cart;
pub mod checkout;
pub mod customer;
pub mod error;
pub mod gateway;
pub mod order;
pub mod product;

// Re-exports for convenience
pub use cart::{Cart, CartLine};
pub use checkout::{
    lines_total, CheckoutRecord, CheckoutRequest, CheckoutSession, ContactInfo, LineItem,
};
pub use customer::{normalize_email, Customer};
pub use error::{ErrorKind, ShopError, ShopResult};
pub use gateway::{with_api_ref, BoxedPaymentGateway, CheckoutUrls, PaymentGateway};
pub use order::{
    EventSource, Order, OrderDetails, OrderLine, PaymentEvent, PaymentStatus, ReconcileOutcome,
    Reconciliation,
};
pub use product::{Currency, NewProduct, Price, Product, ProductCatalog};

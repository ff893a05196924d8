//! # Checkout Types
//!
//! Hosted-checkout request and session types shared by the gateway
//! implementations and the checkout initiator.

use crate::error::{ShopError, ShopResult};
use crate::order::PaymentStatus;
use crate::product::{Currency, Price, Product};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Buyer contact details forwarded to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

impl ContactInfo {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            phone: phone.into(),
        }
    }

    /// Reject blank fields and obviously malformed emails
    pub fn validate(&self) -> ShopResult<()> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(ShopError::Validation("First and last name are required".into()));
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((user, domain)) if !user.is_empty() && domain.contains('.') => {}
            _ => {
                return Err(ShopError::Validation(format!(
                    "Invalid email address: {}",
                    self.email
                )))
            }
        }
        if self.phone.trim().is_empty() {
            return Err(ShopError::Validation("Phone number is required".into()));
        }
        Ok(())
    }
}

/// A priced line sent to the gateway and later snapshotted into the order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: i64,

    /// Product name (denormalized for display)
    pub name: String,

    /// Unit price at checkout time
    pub unit_price: Price,

    pub quantity: u32,
}

impl LineItem {
    /// Create a line item priced from the current product row
    pub fn from_product(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            unit_price: product.price,
            quantity,
        }
    }

    /// Calculate the total price for this line item
    pub fn total(&self) -> ShopResult<Price> {
        self.unit_price.times(self.quantity)
    }
}

/// Sum the lines in `currency`, rejecting empty input, zero quantities and
/// lines priced in another currency.
pub fn lines_total(lines: &[LineItem], currency: Currency) -> ShopResult<Price> {
    if lines.is_empty() {
        return Err(ShopError::Validation("Checkout has no items".to_string()));
    }
    lines.iter().try_fold(Price::zero(currency), |acc, line| {
        if line.quantity == 0 {
            return Err(ShopError::Validation(format!(
                "Quantity for product {} must be at least 1",
                line.product_id
            )));
        }
        if line.unit_price.currency != currency {
            return Err(ShopError::Validation(format!(
                "Product {} is priced in {}, checkout is in {}",
                line.product_id, line.unit_price.currency, currency
            )));
        }
        acc.checked_add(&line.total()?)
    })
}

/// Everything the gateway needs to open a hosted checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub contact: ContactInfo,

    /// Total computed server-side from the lines
    pub amount: Price,

    /// Idempotency reference, unique per attempted purchase
    pub api_ref: String,

    /// Where the gateway sends the buyer after payment
    pub redirect_url: String,
}

/// A checkout session opened by the payment gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider's session ID
    pub session_id: String,

    /// Idempotency reference the session was opened for
    pub api_ref: String,

    /// Provider name (e.g., "intasend")
    pub provider: String,

    /// URL to redirect customer to for payment
    pub checkout_url: String,

    /// State as reported by the gateway
    #[serde(default)]
    pub state: PaymentStatus,

    /// Amount the session was opened for
    pub amount: Price,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl CheckoutSession {
    /// Create a new pending checkout session
    pub fn new(
        session_id: impl Into<String>,
        api_ref: impl Into<String>,
        provider: impl Into<String>,
        checkout_url: impl Into<String>,
        amount: Price,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            api_ref: api_ref.into(),
            provider: provider.into(),
            checkout_url: checkout_url.into(),
            state: PaymentStatus::Pending,
            amount,
            created_at: Utc::now(),
        }
    }
}

/// The checkout intent stored after the gateway accepted a session.
///
/// Webhooks only carry the reference, so order creation reads contact and
/// lines from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRecord {
    pub api_ref: String,
    pub session_id: String,
    pub checkout_url: String,
    pub state: PaymentStatus,
    pub contact: ContactInfo,
    pub lines: Vec<LineItem>,
    pub amount: Price,
    pub created_at: DateTime<Utc>,
}

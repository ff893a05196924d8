//! # Product Types
//!
//! Catalog types for the storefront.
//! Products live in the durable store; `config/products.toml` seeds an empty one.

use crate::error::{ShopError, ShopResult};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    KES,
    USD,
    EUR,
    GBP,
    JPY,
    UGX,
    TZS,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::KES => "KES",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::UGX => "UGX",
            Currency::TZS => "TZS",
        }
    }

    /// Returns the number of decimal places for this currency
    /// (JPY and UGX have 0 decimals, the others have 2)
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY | Currency::UGX => 0,
            _ => 2,
        }
    }

    fn minor_factor(&self) -> i64 {
        10_i64.pow(self.decimal_places())
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::KES
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "KES" => Ok(Currency::KES),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "JPY" => Ok(Currency::JPY),
            "UGX" => Ok(Currency::UGX),
            "TZS" => Ok(Currency::TZS),
            other => Err(ShopError::Validation(format!("Unsupported currency: {other}"))),
        }
    }
}

/// Fixed-point money: amount in the smallest currency unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in smallest currency unit (cents for KES/USD)
    pub amount: i64,
    /// Currency
    pub currency: Currency,
}

impl Price {
    /// Create a price from smallest unit (cents)
    pub fn from_minor(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Zero in the given currency
    pub fn zero(currency: Currency) -> Self {
        Self::from_minor(0, currency)
    }

    /// Create a price from an exact decimal amount.
    ///
    /// Rejects amounts with more fractional digits than the currency allows.
    pub fn from_decimal(value: Decimal, currency: Currency) -> ShopResult<Self> {
        let places = currency.decimal_places();
        if value.normalize().scale() > places {
            return Err(ShopError::Validation(format!(
                "{value} has more than {places} decimal places for {currency}"
            )));
        }
        let minor = value
            .checked_mul(Decimal::from(currency.minor_factor()))
            .and_then(|v| v.trunc().to_i64())
            .ok_or_else(|| ShopError::Validation(format!("Amount out of range: {value}")))?;
        Ok(Self::from_minor(minor, currency))
    }

    /// Get the exact decimal amount
    pub fn as_decimal(&self) -> Decimal {
        Decimal::new(self.amount, self.currency.decimal_places())
    }

    /// Price of `quantity` units
    pub fn times(&self, quantity: u32) -> ShopResult<Self> {
        self.amount
            .checked_mul(i64::from(quantity))
            .map(|amount| Self::from_minor(amount, self.currency))
            .ok_or_else(|| ShopError::Validation("Line amount overflow".to_string()))
    }

    /// Sum of two prices in the same currency
    pub fn checked_add(&self, other: &Price) -> ShopResult<Self> {
        if self.currency != other.currency {
            return Err(ShopError::Validation(format!(
                "Cannot add {} to {}",
                other.currency, self.currency
            )));
        }
        self.amount
            .checked_add(other.amount)
            .map(|amount| Self::from_minor(amount, self.currency))
            .ok_or_else(|| ShopError::Validation("Amount overflow".to_string()))
    }

    /// Format for display (e.g., "KES 1,000.00" without grouping: "KES 1000.00")
    pub fn display(&self) -> String {
        format!("{} {}", self.currency, self.as_decimal())
    }
}

/// A product in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,

    /// Display name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub category: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    pub price: Price,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_price: Option<Price>,

    /// Units on hand, never negative
    pub stock_quantity: u32,

    /// Explicit status tag set by catalog management
    pub is_active: bool,

    /// Derived: active and stock above zero
    pub is_available: bool,

    pub rating: f64,
    pub rating_count: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Stock status label shown by the storefront
    pub fn stock_status(&self) -> &'static str {
        if self.is_available {
            "In Stock"
        } else {
            "Out of Stock"
        }
    }
}

/// Payload for creating a product (API and seed file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Decimal amount in major units (e.g. "1499.00")
    pub price: Decimal,
    #[serde(default)]
    pub old_price: Option<Decimal>,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub stock_quantity: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub rating_count: u32,
}

fn default_true() -> bool {
    true
}

impl NewProduct {
    /// Create a minimal active product payload
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        price: Decimal,
        stock_quantity: u32,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            category: category.into(),
            image_url: None,
            price,
            old_price: None,
            currency: Currency::default(),
            stock_quantity,
            is_active: true,
            rating: 0.0,
            rating_count: 0,
        }
    }

    /// Builder: set currency
    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Builder: set description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Validate and convert the decimal prices to fixed-point
    pub fn validate(&self) -> ShopResult<(Price, Option<Price>)> {
        if self.name.trim().is_empty() {
            return Err(ShopError::Validation("Product name is required".to_string()));
        }
        if self.category.trim().is_empty() {
            return Err(ShopError::Validation("Category is required".to_string()));
        }
        if self.price <= Decimal::ZERO {
            return Err(ShopError::Validation(
                "Price must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=5.0).contains(&self.rating) {
            return Err(ShopError::Validation(
                "Rating must be between 0.0 and 5.0".to_string(),
            ));
        }
        let price = Price::from_decimal(self.price, self.currency)?;
        let old_price = self
            .old_price
            .map(|p| Price::from_decimal(p, self.currency))
            .transpose()?;
        Ok((price, old_price))
    }
}

/// Seed catalog (loaded from `config/products.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductCatalog {
    #[serde(default)]
    pub products: Vec<NewProduct>,
}

impl ProductCatalog {
    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_from_decimal() {
        let price = Price::from_decimal(Decimal::new(1099, 2), Currency::KES).unwrap();
        assert_eq!(price.amount, 1099);

        let whole = Price::from_decimal(Decimal::from(10), Currency::USD).unwrap();
        assert_eq!(whole.amount, 1000);

        let jpy = Price::from_decimal(Decimal::from(1000), Currency::JPY).unwrap();
        assert_eq!(jpy.amount, 1000);
    }

    #[test]
    fn test_price_rejects_extra_precision() {
        let result = Price::from_decimal(Decimal::new(10999, 3), Currency::KES);
        assert!(matches!(result, Err(ShopError::Validation(_))));

        // trailing zeros are not extra precision
        let ok = Price::from_decimal(Decimal::new(10_000, 3), Currency::KES).unwrap();
        assert_eq!(ok.amount, 1000);
    }

    #[test]
    fn test_price_arithmetic() {
        let unit = Price::from_minor(1000, Currency::KES);
        assert_eq!(unit.times(2).unwrap().amount, 2000);
        assert_eq!(unit.as_decimal().to_string(), "10.00");

        let total = unit.checked_add(&Price::from_minor(550, Currency::KES)).unwrap();
        assert_eq!(total.amount, 1550);

        let mixed = unit.checked_add(&Price::from_minor(1, Currency::USD));
        assert!(mixed.is_err());
    }

    #[test]
    fn test_price_display() {
        let price = Price::from_minor(2999, Currency::KES);
        assert_eq!(price.display(), "KES 29.99");
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!("kes".parse::<Currency>().unwrap(), Currency::KES);
        assert_eq!(" USD ".parse::<Currency>().unwrap(), Currency::USD);
        assert!("XYZ".parse::<Currency>().is_err());
    }

    #[test]
    fn test_new_product_validation() {
        let product = NewProduct::new("Kikoi", "textiles", Decimal::new(150000, 2), 4)
            .with_description("Hand woven");
        let (price, old) = product.validate().unwrap();
        assert_eq!(price.amount, 150000);
        assert!(old.is_none());

        let free = NewProduct::new("Free", "misc", Decimal::ZERO, 1);
        assert!(free.validate().is_err());

        let nameless = NewProduct::new("  ", "misc", Decimal::ONE, 1);
        assert!(nameless.validate().is_err());
    }

    #[test]
    fn test_catalog_from_toml() {
        let toml_str = r#"
            [[products]]
            name = "Maasai Shuka"
            category = "textiles"
            price = 1200.00
            stock_quantity = 10

            [[products]]
            name = "Soapstone Bowl"
            category = "crafts"
            price = 850.5
            currency = "KES"
            stock_quantity = 0
            is_active = false
        "#;

        let catalog = ProductCatalog::from_toml(toml_str).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.products[0].is_active);
        assert!(!catalog.products[1].is_active);
        assert_eq!(
            catalog.products[1].validate().unwrap().0.amount,
            85050
        );
    }
}

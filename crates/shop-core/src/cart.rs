//! # Cart Types
//!
//! Session-scoped cart view returned by the cart store.

use crate::error::ShopResult;
use crate::product::{Currency, Price};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One product line in a cart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: u32,
    /// Price captured when the line was last added to
    pub unit_price: Price,
    pub subtotal: Price,
    /// Current availability of the product, advisory only
    pub is_available: bool,
    pub updated_at: DateTime<Utc>,
}

/// A cart keyed by an opaque session id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub session_id: String,
    pub lines: Vec<CartLine>,
    pub total_amount: Price,
    /// Number of distinct lines
    pub total_items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Cart {
    /// Empty view for a session that has no cart row yet
    pub fn empty(session_id: impl Into<String>, currency: Currency) -> Self {
        Self {
            id: None,
            session_id: session_id.into(),
            lines: Vec::new(),
            total_amount: Price::zero(currency),
            total_items: 0,
            created_at: None,
        }
    }

    /// Build a view from stored lines, totalling the subtotals
    pub fn from_lines(
        id: i64,
        session_id: impl Into<String>,
        lines: Vec<CartLine>,
        currency: Currency,
        created_at: DateTime<Utc>,
    ) -> ShopResult<Self> {
        let total_amount = lines
            .iter()
            .try_fold(Price::zero(currency), |acc, line| acc.checked_add(&line.subtotal))?;
        Ok(Self {
            id: Some(id),
            session_id: session_id.into(),
            total_items: lines.len(),
            lines,
            total_amount,
            created_at: Some(created_at),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total units across all lines
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

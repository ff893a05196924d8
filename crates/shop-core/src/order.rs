//! # Order Types
//!
//! Durable order records and the payment events that drive them.

use crate::customer::Customer;
use crate::error::ShopError;
use crate::product::{Currency, Price};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Payment status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Session opened or payment in flight
    Pending,
    /// Money captured
    Complete,
    /// Declined, cancelled or expired
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Complete => "COMPLETE",
            PaymentStatus::Failed => "FAILED",
        }
    }

    /// Terminal statuses are never left on a gateway event
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Map a raw gateway state string. Unknown in-flight states count as pending.
    pub fn from_gateway_state(state: &str) -> Self {
        match state.trim().to_uppercase().as_str() {
            "COMPLETE" | "COMPLETED" | "PAID" => PaymentStatus::Complete,
            "FAILED" | "CANCELED" | "CANCELLED" | "EXPIRED" => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        }
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "COMPLETE" => Ok(PaymentStatus::Complete),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(ShopError::Validation(format!(
                "Unknown payment status: {other}"
            ))),
        }
    }
}

/// Which delivery path produced a payment event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Client confirmation after the gateway redirect
    Redirect,
    /// Asynchronous gateway webhook
    Webhook,
    /// Pre-registration of a pending order by the client
    Manual,
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EventSource::Redirect => "redirect",
            EventSource::Webhook => "webhook",
            EventSource::Manual => "manual",
        })
    }
}

/// A payment confirmation keyed by the idempotency reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub api_ref: String,

    /// Gateway checkout/session id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_id: Option<String>,

    /// Gateway tracking/invoice id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,

    pub status: PaymentStatus,

    pub source: EventSource,

    pub received_at: DateTime<Utc>,
}

impl PaymentEvent {
    pub fn new(api_ref: impl Into<String>, status: PaymentStatus, source: EventSource) -> Self {
        Self {
            api_ref: api_ref.into(),
            checkout_id: None,
            tracking_id: None,
            status,
            source,
            received_at: Utc::now(),
        }
    }

    /// Builder: set gateway ids
    pub fn with_gateway_ids(
        mut self,
        checkout_id: Option<String>,
        tracking_id: Option<String>,
    ) -> Self {
        self.checkout_id = checkout_id;
        self.tracking_id = tracking_id;
        self
    }
}

/// A durable order, one per idempotency reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub api_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
    pub customer_id: i64,
    pub total_amount: Price,
    pub currency: Currency,
    pub payment_status: PaymentStatus,
    /// Inventory has been decremented for this order
    pub stock_committed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of a purchased product at order time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub unit_price: Price,
    pub quantity: u32,
    pub subtotal: Price,
    pub created_at: DateTime<Utc>,
}

/// Order with its customer and lines, as exposed to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub customer: Customer,
    pub lines: Vec<OrderLine>,
}

impl OrderDetails {
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

/// What a reconciliation did to the stored order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// First event for the reference created the order
    Created,
    /// Status moved from `from` to the event's status
    Updated { from: PaymentStatus },
    /// Duplicate or stale event, only timestamps refreshed
    Unchanged,
}

/// Result of reconciling one payment event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconciliation {
    pub outcome: ReconcileOutcome,
    /// Inventory was decremented while handling this event
    pub stock_committed_now: bool,
    pub order: OrderDetails,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_state_mapping() {
        assert_eq!(PaymentStatus::from_gateway_state("COMPLETE"), PaymentStatus::Complete);
        assert_eq!(PaymentStatus::from_gateway_state("failed"), PaymentStatus::Failed);
        assert_eq!(PaymentStatus::from_gateway_state("CANCELED"), PaymentStatus::Failed);
        assert_eq!(PaymentStatus::from_gateway_state("PROCESSING"), PaymentStatus::Pending);
        assert_eq!(PaymentStatus::from_gateway_state("RETRY"), PaymentStatus::Pending);
    }

    #[test]
    fn test_status_parse_and_terminal() {
        assert_eq!("complete".parse::<PaymentStatus>().unwrap(), PaymentStatus::Complete);
        assert!("PROCESSING".parse::<PaymentStatus>().is_err());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&PaymentStatus::Complete).unwrap();
        assert_eq!(json, "\"COMPLETE\"");
        let outcome = serde_json::to_value(ReconcileOutcome::Updated {
            from: PaymentStatus::Pending,
        })
        .unwrap();
        assert_eq!(outcome["kind"], "updated");
        assert_eq!(outcome["from"], "PENDING");
    }

    #[test]
    fn test_payment_event_builder() {
        let event = PaymentEvent::new("R1", PaymentStatus::Complete, EventSource::Webhook)
            .with_gateway_ids(Some("chk_1".into()), Some("trk_1".into()));
        assert_eq!(event.checkout_id.as_deref(), Some("chk_1"));
        assert_eq!(event.source.to_string(), "webhook");
    }
}

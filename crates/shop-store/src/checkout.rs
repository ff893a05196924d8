//! # Checkout Session Initiator
//!
//! Turns priced lines and buyer contact into a hosted-checkout session.
//! Nothing is written locally until the gateway has accepted the session, and
//! no order is created here: orders come from payment events.

use crate::cart;
use crate::inventory;
use chrono::{DateTime, Utc};
use shop_core::{
    lines_total, BoxedPaymentGateway, CheckoutRecord, CheckoutRequest, CheckoutSession,
    ContactInfo, Currency, LineItem, PaymentStatus, Price, ShopError, ShopResult,
};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{error, info, instrument, warn};

const MAX_API_REF_LEN: usize = 64;

#[derive(Debug, sqlx::FromRow)]
struct CheckoutRecordRow {
    api_ref: String,
    session_id: String,
    checkout_url: String,
    state: String,
    contact_json: String,
    lines_json: String,
    amount_minor: i64,
    currency: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CheckoutRecordRow> for CheckoutRecord {
    type Error = ShopError;

    fn try_from(row: CheckoutRecordRow) -> ShopResult<Self> {
        let currency = Currency::from_str(&row.currency)?;
        Ok(CheckoutRecord {
            api_ref: row.api_ref,
            session_id: row.session_id,
            checkout_url: row.checkout_url,
            state: PaymentStatus::from_str(&row.state)?,
            contact: serde_json::from_str(&row.contact_json)?,
            lines: serde_json::from_str(&row.lines_json)?,
            amount: Price::from_minor(row.amount_minor, currency),
            created_at: row.created_at,
        })
    }
}

/// The stored checkout intent for a reference, if the gateway accepted one
pub async fn find_record(pool: &SqlitePool, api_ref: &str) -> ShopResult<Option<CheckoutRecord>> {
    let row = sqlx::query_as::<_, CheckoutRecordRow>(
        "SELECT api_ref, session_id, checkout_url, state, contact_json, lines_json, \
             amount_minor, currency, created_at \
         FROM checkout_sessions WHERE api_ref = ?",
    )
    .bind(api_ref)
    .fetch_optional(pool)
    .await?;
    row.map(CheckoutRecord::try_from).transpose()
}

/// Opens hosted-checkout sessions through the injected gateway
#[derive(Clone)]
pub struct CheckoutInitiator {
    pool: SqlitePool,
    gateway: BoxedPaymentGateway,
}

impl CheckoutInitiator {
    pub fn new(pool: SqlitePool, gateway: BoxedPaymentGateway) -> Self {
        Self { pool, gateway }
    }

    pub fn gateway(&self) -> &BoxedPaymentGateway {
        &self.gateway
    }

    /// Validate, call the gateway once, then persist the checkout record.
    ///
    /// The total is always recomputed from `lines`. A reference already used
    /// by a checkout or an order is rejected before the gateway is called.
    #[instrument(skip(self, contact, lines, redirect_url), fields(provider = self.gateway.provider_name()))]
    pub async fn initiate(
        &self,
        contact: ContactInfo,
        lines: Vec<LineItem>,
        currency: Currency,
        api_ref: &str,
        redirect_url: String,
    ) -> ShopResult<CheckoutSession> {
        contact.validate()?;
        let api_ref = validate_api_ref(api_ref)?;
        let amount = lines_total(&lines, currency)?;
        if amount.amount <= 0 {
            return Err(ShopError::Validation(
                "Checkout total must be positive".to_string(),
            ));
        }

        if self.reference_in_use(api_ref).await? {
            return Err(ShopError::Validation(format!(
                "Reference {api_ref} has already been used"
            )));
        }

        let request = CheckoutRequest {
            contact,
            amount,
            api_ref: api_ref.to_string(),
            redirect_url,
        };

        let session = match self.gateway.create_checkout(&request).await {
            Ok(session) => session,
            Err(e) => {
                error!(api_ref, error = %e, "Gateway rejected checkout");
                return Err(e);
            }
        };

        self.store_record(&request, &lines, &session).await?;

        info!(
            api_ref,
            session_id = %session.session_id,
            amount = %amount.display(),
            "Checkout session opened"
        );
        Ok(session)
    }

    async fn reference_in_use(&self, api_ref: &str) -> ShopResult<bool> {
        let used: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM checkout_sessions WHERE api_ref = ?1) \
                  + (SELECT COUNT(*) FROM orders WHERE api_ref = ?1)",
        )
        .bind(api_ref)
        .fetch_one(&self.pool)
        .await?;
        Ok(used > 0)
    }

    async fn store_record(
        &self,
        request: &CheckoutRequest,
        lines: &[LineItem],
        session: &CheckoutSession,
    ) -> ShopResult<()> {
        let inserted = sqlx::query(
            "INSERT INTO checkout_sessions (api_ref, provider, session_id, checkout_url, state, \
                 contact_json, lines_json, amount_minor, currency, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.api_ref)
        .bind(&session.provider)
        .bind(&session.session_id)
        .bind(&session.checkout_url)
        .bind(session.state.as_str())
        .bind(serde_json::to_string(&request.contact)?)
        .bind(serde_json::to_string(lines)?)
        .bind(request.amount.amount)
        .bind(request.amount.currency.as_str())
        .bind(session.created_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                warn!(
                    api_ref = %request.api_ref,
                    session_id = %session.session_id,
                    "Concurrent checkout won the reference, gateway session left unused"
                );
                Err(ShopError::Validation(format!(
                    "Reference {} has already been used",
                    request.api_ref
                )))
            }
            Err(e) => {
                error!(
                    api_ref = %request.api_ref,
                    session_id = %session.session_id,
                    error = %e,
                    "Gateway session opened but checkout record not stored"
                );
                Err(e.into())
            }
        }
    }

    /// Price the session's cart at current catalog prices
    pub async fn lines_from_cart(&self, session_id: &str, currency: Currency) -> ShopResult<Vec<LineItem>> {
        let cart = cart::get(&self.pool, session_id, currency).await?;
        if cart.is_empty() {
            return Err(ShopError::Validation("Cart is empty".to_string()));
        }
        let items: Vec<(i64, u32)> = cart
            .lines
            .iter()
            .map(|line| (line.product_id, line.quantity))
            .collect();
        self.price_items(&items).await
    }

    /// Price explicit `(product_id, quantity)` pairs from the ledger.
    ///
    /// Stock is checked here as a courtesy only; it is reserved when the
    /// payment completes.
    pub async fn price_items(&self, items: &[(i64, u32)]) -> ShopResult<Vec<LineItem>> {
        if items.is_empty() {
            return Err(ShopError::Validation(
                "At least one item is required".to_string(),
            ));
        }
        let mut lines = Vec::with_capacity(items.len());
        for &(product_id, quantity) in items {
            if quantity < 1 {
                return Err(ShopError::Validation(
                    "Quantity must be at least 1".to_string(),
                ));
            }
            let product = inventory::get_active(&self.pool, product_id).await?;
            if quantity > product.stock_quantity {
                return Err(ShopError::OutOfStock {
                    product_id,
                    available: product.stock_quantity,
                });
            }
            lines.push(LineItem::from_product(&product, quantity));
        }
        Ok(lines)
    }
}

fn validate_api_ref(api_ref: &str) -> ShopResult<&str> {
    let api_ref = api_ref.trim();
    if api_ref.is_empty() {
        return Err(ShopError::Validation("api_ref is required".to_string()));
    }
    if api_ref.len() > MAX_API_REF_LEN {
        return Err(ShopError::Validation(format!(
            "api_ref must be at most {MAX_API_REF_LEN} characters"
        )));
    }
    Ok(api_ref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_db, seed_product, FakeGateway};
    use std::sync::Arc;

    fn contact() -> ContactInfo {
        ContactInfo::new("Amina", "Odhiambo", "amina@example.com", "254700000000")
    }

    #[tokio::test]
    async fn test_initiate_persists_record() {
        let db = memory_db().await;
        let gateway = Arc::new(FakeGateway::new());
        let initiator = CheckoutInitiator::new(db.pool.clone(), gateway.clone());
        let a = seed_product(&db, "Kikoy", 1000, 3).await;
        let b = seed_product(&db, "Basket", 1850, 3).await;

        let lines = initiator.price_items(&[(a, 2), (b, 1)]).await.unwrap();
        let session = initiator
            .initiate(contact(), lines, Currency::KES, "R1", "https://shop/ok".into())
            .await
            .unwrap();

        assert_eq!(session.api_ref, "R1");
        assert_eq!(session.amount.amount, 3850);
        assert_eq!(gateway.calls(), 1);

        let record = find_record(&db.pool, "R1").await.unwrap().unwrap();
        assert_eq!(record.session_id, session.session_id);
        assert_eq!(record.lines.len(), 2);
        assert_eq!(record.contact, contact());
        assert_eq!(record.amount.amount, 3850);
        assert_eq!(record.state, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_rejections_never_reach_gateway() {
        let db = memory_db().await;
        let gateway = Arc::new(FakeGateway::new());
        let initiator = CheckoutInitiator::new(db.pool.clone(), gateway.clone());
        let a = seed_product(&db, "Kikoy", 1000, 3).await;
        let lines = initiator.price_items(&[(a, 1)]).await.unwrap();

        let bad_contact = ContactInfo::new("Amina", "Odhiambo", "not-an-email", "2547");
        assert!(matches!(
            initiator
                .initiate(bad_contact, lines.clone(), Currency::KES, "R1", String::new())
                .await,
            Err(ShopError::Validation(_))
        ));
        assert!(matches!(
            initiator
                .initiate(contact(), Vec::new(), Currency::KES, "R1", String::new())
                .await,
            Err(ShopError::Validation(_))
        ));
        assert!(matches!(
            initiator
                .initiate(contact(), lines.clone(), Currency::USD, "R1", String::new())
                .await,
            Err(ShopError::Validation(_))
        ));
        assert!(matches!(
            initiator
                .initiate(contact(), lines, Currency::KES, "  ", String::new())
                .await,
            Err(ShopError::Validation(_))
        ));
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_reused_reference_is_rejected() {
        let db = memory_db().await;
        let gateway = Arc::new(FakeGateway::new());
        let initiator = CheckoutInitiator::new(db.pool.clone(), gateway.clone());
        let a = seed_product(&db, "Kikoy", 1000, 3).await;
        let lines = initiator.price_items(&[(a, 1)]).await.unwrap();

        initiator
            .initiate(contact(), lines.clone(), Currency::KES, "R1", String::new())
            .await
            .unwrap();
        let err = initiator
            .initiate(contact(), lines, Currency::KES, "R1", String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::Validation(_)));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_gateway_timeout_leaves_nothing_behind() {
        let db = memory_db().await;
        let gateway = Arc::new(FakeGateway::new());
        let initiator = CheckoutInitiator::new(db.pool.clone(), gateway.clone());
        let a = seed_product(&db, "Kikoy", 1000, 3).await;
        let lines = initiator.price_items(&[(a, 1)]).await.unwrap();

        gateway.fail_next(ShopError::GatewayTimeout { timeout_secs: 30 });
        let err = initiator
            .initiate(contact(), lines.clone(), Currency::KES, "R-timeout", String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::GatewayTimeout { .. }));
        assert!(find_record(&db.pool, "R-timeout").await.unwrap().is_none());
        assert!(!crate::order::exists(&db.pool, "R-timeout").await.unwrap());

        let session = initiator
            .initiate(contact(), lines, Currency::KES, "R-fresh", String::new())
            .await
            .unwrap();
        assert_eq!(session.api_ref, "R-fresh");
        assert!(find_record(&db.pool, "R-fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lines_from_cart_use_current_prices() {
        let db = memory_db().await;
        let initiator = CheckoutInitiator::new(db.pool.clone(), Arc::new(FakeGateway::new()));
        let a = seed_product(&db, "Kikoy", 1000, 3).await;

        assert!(matches!(
            initiator.lines_from_cart("s1", Currency::KES).await,
            Err(ShopError::Validation(_))
        ));

        cart::add_item(&db.pool, "s1", a, 2).await.unwrap();
        sqlx::query("UPDATE products SET price_minor = 900 WHERE id = ?")
            .bind(a)
            .execute(&db.pool)
            .await
            .unwrap();

        let lines = initiator.lines_from_cart("s1", Currency::KES).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].unit_price.amount, 900);
        assert_eq!(lines[0].quantity, 2);

        assert!(matches!(
            initiator.price_items(&[(a, 4)]).await,
            Err(ShopError::OutOfStock { available: 3, .. })
        ));
    }
}

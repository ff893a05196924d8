//! # Order Reconciler
//!
//! Folds payment events into durable orders. Per reference the status moves
//! `PENDING -> COMPLETE | FAILED` and never back on a gateway event.
//!
//! Exactly-once guarantees rest on two database facts rather than on locks
//! held in this process:
//!
//! - `orders.api_ref` is UNIQUE, so only one insert per reference commits;
//!   a losing concurrent insert rolls back and is handled as an update.
//! - Stock for an order is decremented only by the transaction that flips
//!   `stock_committed` from 0 to 1.
//!
//! Every write transaction opens with a write statement so SQLite takes the
//! write lock up front.

use crate::checkout::find_record;
use crate::customer;
use crate::inventory::{self, to_u32};
use crate::order::{self, load_details, OrderRow, ORDER_COLUMNS};
use chrono::Utc;
use shop_core::{
    CheckoutRecord, EventSource, OrderDetails, PaymentEvent, PaymentStatus, ReconcileOutcome,
    Reconciliation, ShopError, ShopResult,
};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

/// Applies payment events and explicit status changes to orders
#[derive(Clone)]
pub struct OrderReconciler {
    pool: SqlitePool,
}

impl OrderReconciler {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Reconcile one payment event. Safe to call any number of times for the
    /// same event, from the redirect and the webhook in either order.
    #[instrument(
        skip(self, event),
        fields(api_ref = %event.api_ref, status = %event.status, source = %event.source)
    )]
    pub async fn reconcile(&self, event: PaymentEvent) -> ShopResult<Reconciliation> {
        if event.api_ref.trim().is_empty() {
            return Err(ShopError::Validation("api_ref is required".to_string()));
        }

        if order::exists(&self.pool, &event.api_ref).await? {
            return self.apply_event(&event).await;
        }

        let record = find_record(&self.pool, &event.api_ref)
            .await?
            .ok_or_else(|| ShopError::CheckoutNotFound {
                api_ref: event.api_ref.clone(),
            })?;
        let customer = customer::find_or_create(&self.pool, &record.contact).await?;

        match self.create_order(&event, &record, customer.id).await? {
            Some(created) => Ok(created),
            None => self.apply_event(&event).await,
        }
    }

    /// Insert the order and its lines in one transaction.
    ///
    /// Returns `None` when a concurrent event for the same reference already
    /// created the order.
    async fn create_order(
        &self,
        event: &PaymentEvent,
        record: &CheckoutRecord,
        customer_id: i64,
    ) -> ShopResult<Option<Reconciliation>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (api_ref, checkout_id, tracking_id, customer_id, total_minor, \
                 currency, payment_status, stock_committed, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(&event.api_ref)
        .bind(event.checkout_id.as_deref().or(Some(record.session_id.as_str())))
        .bind(event.tracking_id.as_deref())
        .bind(customer_id)
        .bind(record.amount.amount)
        .bind(record.amount.currency.as_str())
        .bind(event.status.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                debug!("Order already created by a concurrent event");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        for line in &record.lines {
            let product_name: Option<String> =
                sqlx::query_scalar("SELECT name FROM products WHERE id = ?")
                    .bind(line.product_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let product_name = product_name.ok_or(ShopError::ProductNotFound {
                product_id: line.product_id,
            })?;

            sqlx::query(
                "INSERT INTO order_lines (order_id, product_id, product_name, unit_price_minor, \
                     quantity, subtotal_minor, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(row.id)
            .bind(line.product_id)
            .bind(product_name)
            .bind(line.unit_price.amount)
            .bind(i64::from(line.quantity))
            .bind(line.total()?.amount)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let stock_committed_now = if event.status == PaymentStatus::Complete {
            commit_stock(&mut *tx, row.id).await?
        } else {
            false
        };
        sync_checkout_state(&mut *tx, &event.api_ref, event.status).await?;

        let details = reload(&mut *tx, row.id).await?;
        tx.commit().await?;

        info!(
            order_id = details.order.id,
            total = %details.order.total_amount.display(),
            stock_committed_now,
            "Order created"
        );
        Ok(Some(Reconciliation {
            outcome: ReconcileOutcome::Created,
            stock_committed_now,
            order: details,
        }))
    }

    /// Fold an event into an existing order
    async fn apply_event(&self, event: &PaymentEvent) -> ShopResult<Reconciliation> {
        let mut tx = self.pool.begin().await?;
        let row = touch(&mut *tx, TouchKey::ApiRef(&event.api_ref)).await?;
        let order_id = row.id;
        let current = PaymentStatus::from_str(&row.payment_status)?;

        let outcome = if current == event.status {
            sqlx::query(&format!(
                "UPDATE orders SET {} WHERE id = ?",
                gateway_id_updates(event)
            ))
            .bind(event.checkout_id.as_deref())
            .bind(event.tracking_id.as_deref())
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
            ReconcileOutcome::Unchanged
        } else if current.is_terminal() {
            warn!(
                order_id,
                stored = %current,
                "Ignoring payment event for an order in a terminal status"
            );
            ReconcileOutcome::Unchanged
        } else {
            sqlx::query(&format!(
                "UPDATE orders SET payment_status = ?, {} WHERE id = ?",
                gateway_id_updates(event)
            ))
            .bind(event.status.as_str())
            .bind(event.checkout_id.as_deref())
            .bind(event.tracking_id.as_deref())
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
            sync_checkout_state(&mut *tx, &event.api_ref, event.status).await?;
            ReconcileOutcome::Updated { from: current }
        };

        let ignored = current != event.status && current.is_terminal();
        let stock_committed_now = !ignored
            && event.status == PaymentStatus::Complete
            && commit_stock(&mut *tx, order_id).await?;

        let details = reload(&mut *tx, order_id).await?;
        tx.commit().await?;

        match outcome {
            ReconcileOutcome::Updated { from } => info!(
                order_id,
                from = %from,
                to = %event.status,
                stock_committed_now,
                "Order status updated"
            ),
            _ => debug!(order_id, "Duplicate payment event"),
        }
        Ok(Reconciliation {
            outcome,
            stock_committed_now,
            order: details,
        })
    }

    /// Set an order's status explicitly.
    ///
    /// Unlike gateway events this may leave a terminal status. Entering
    /// COMPLETE decrements stock unless the order already did.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: i64,
        status: PaymentStatus,
    ) -> ShopResult<Reconciliation> {
        let mut tx = self.pool.begin().await?;
        let row = touch(&mut *tx, TouchKey::Id(order_id)).await?;
        let current = PaymentStatus::from_str(&row.payment_status)?;

        let outcome = if current == status {
            ReconcileOutcome::Unchanged
        } else {
            sqlx::query("UPDATE orders SET payment_status = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(order_id)
                .execute(&mut *tx)
                .await?;
            sync_checkout_state(&mut *tx, &row.api_ref, status).await?;
            ReconcileOutcome::Updated { from: current }
        };

        let stock_committed_now =
            status == PaymentStatus::Complete && commit_stock(&mut *tx, order_id).await?;

        let details = reload(&mut *tx, order_id).await?;
        tx.commit().await?;

        info!(order_id, from = %current, to = %status, stock_committed_now, "Order status set");
        Ok(Reconciliation {
            outcome,
            stock_committed_now,
            order: details,
        })
    }
}

/// Column updates for the gateway ids an event carries.
///
/// Webhook ids come from the gateway and replace whatever is stored; ids from
/// other sources only fill columns that are still empty. Binds checkout id
/// then tracking id.
fn gateway_id_updates(event: &PaymentEvent) -> &'static str {
    match event.source {
        EventSource::Webhook => {
            "checkout_id = COALESCE(?, checkout_id), tracking_id = COALESCE(?, tracking_id)"
        }
        EventSource::Redirect | EventSource::Manual => {
            "checkout_id = COALESCE(checkout_id, ?), tracking_id = COALESCE(tracking_id, ?)"
        }
    }
}

enum TouchKey<'a> {
    Id(i64),
    ApiRef(&'a str),
}

/// Refresh `updated_at` and return the row as it was before this transaction
async fn touch(conn: &mut SqliteConnection, key: TouchKey<'_>) -> ShopResult<OrderRow> {
    let now = Utc::now();
    let (row, reference) = match key {
        TouchKey::Id(id) => {
            let row = sqlx::query_as::<_, OrderRow>(&format!(
                "UPDATE orders SET updated_at = ? WHERE id = ? RETURNING {ORDER_COLUMNS}"
            ))
            .bind(now)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
            (row, id.to_string())
        }
        TouchKey::ApiRef(api_ref) => {
            let row = sqlx::query_as::<_, OrderRow>(&format!(
                "UPDATE orders SET updated_at = ? WHERE api_ref = ? RETURNING {ORDER_COLUMNS}"
            ))
            .bind(now)
            .bind(api_ref)
            .fetch_optional(&mut *conn)
            .await?;
            (row, api_ref.to_string())
        }
    };
    row.ok_or(ShopError::OrderNotFound { reference })
}

/// Decrement stock for every line of the order, once per order.
///
/// Returns false when the order had already committed its stock.
async fn commit_stock(conn: &mut SqliteConnection, order_id: i64) -> ShopResult<bool> {
    let flipped = sqlx::query(
        "UPDATE orders SET stock_committed = 1 WHERE id = ? AND stock_committed = 0",
    )
    .bind(order_id)
    .execute(&mut *conn)
    .await?;
    if flipped.rows_affected() == 0 {
        return Ok(false);
    }

    let lines: Vec<(i64, i64)> =
        sqlx::query_as("SELECT product_id, quantity FROM order_lines WHERE order_id = ? ORDER BY id")
            .bind(order_id)
            .fetch_all(&mut *conn)
            .await?;
    for (product_id, quantity) in lines {
        inventory::reserve_in(conn, product_id, to_u32(quantity)).await?;
    }
    Ok(true)
}

async fn sync_checkout_state(
    conn: &mut SqliteConnection,
    api_ref: &str,
    status: PaymentStatus,
) -> ShopResult<()> {
    sqlx::query("UPDATE checkout_sessions SET state = ? WHERE api_ref = ?")
        .bind(status.as_str())
        .bind(api_ref)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn reload(conn: &mut SqliteConnection, order_id: i64) -> ShopResult<OrderDetails> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"
    ))
    .bind(order_id)
    .fetch_one(&mut *conn)
    .await?;
    load_details(conn, row).await
}

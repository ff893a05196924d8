//! # Order Status Surface
//!
//! Read side of orders. Orders are written only by the reconciler.

use crate::customer::{self, CustomerRow};
use crate::inventory::to_u32;
use chrono::{DateTime, Utc};
use shop_core::{
    normalize_email, Currency, Order, OrderDetails, OrderLine, PaymentStatus, Price, ShopError,
    ShopResult,
};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;

pub(crate) const ORDER_COLUMNS: &str = "id, api_ref, checkout_id, tracking_id, customer_id, \
     total_minor, currency, payment_status, stock_committed, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderRow {
    pub(crate) id: i64,
    pub(crate) api_ref: String,
    pub(crate) checkout_id: Option<String>,
    pub(crate) tracking_id: Option<String>,
    pub(crate) customer_id: i64,
    pub(crate) total_minor: i64,
    pub(crate) currency: String,
    pub(crate) payment_status: String,
    pub(crate) stock_committed: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = ShopError;

    fn try_from(row: OrderRow) -> ShopResult<Self> {
        let currency = Currency::from_str(&row.currency)?;
        Ok(Order {
            id: row.id,
            api_ref: row.api_ref,
            checkout_id: row.checkout_id,
            tracking_id: row.tracking_id,
            customer_id: row.customer_id,
            total_amount: Price::from_minor(row.total_minor, currency),
            currency,
            payment_status: PaymentStatus::from_str(&row.payment_status)?,
            stock_committed: row.stock_committed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderLineRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    product_name: String,
    unit_price_minor: i64,
    quantity: i64,
    subtotal_minor: i64,
    created_at: DateTime<Utc>,
}

impl OrderLineRow {
    fn into_line(self, currency: Currency) -> OrderLine {
        OrderLine {
            id: self.id,
            order_id: self.order_id,
            product_id: self.product_id,
            product_name: self.product_name,
            unit_price: Price::from_minor(self.unit_price_minor, currency),
            quantity: to_u32(self.quantity),
            subtotal: Price::from_minor(self.subtotal_minor, currency),
            created_at: self.created_at,
        }
    }
}

/// Attach customer and lines to a stored order
pub(crate) async fn load_details(conn: &mut SqliteConnection, row: OrderRow) -> ShopResult<OrderDetails> {
    let order = Order::try_from(row)?;

    let customer = sqlx::query_as::<_, CustomerRow>(
        "SELECT id, first_name, last_name, email, phone, created_at FROM customers WHERE id = ?",
    )
    .bind(order.customer_id)
    .fetch_one(&mut *conn)
    .await?;

    let lines = sqlx::query_as::<_, OrderLineRow>(
        "SELECT id, order_id, product_id, product_name, unit_price_minor, quantity, \
             subtotal_minor, created_at \
         FROM order_lines WHERE order_id = ? ORDER BY id",
    )
    .bind(order.id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|row| row.into_line(order.currency))
    .collect();

    Ok(OrderDetails {
        customer: customer.into(),
        lines,
        order,
    })
}

async fn load_all(pool: &SqlitePool, rows: Vec<OrderRow>) -> ShopResult<Vec<OrderDetails>> {
    let mut conn = pool.acquire().await?;
    let mut details = Vec::with_capacity(rows.len());
    for row in rows {
        details.push(load_details(&mut conn, row).await?);
    }
    Ok(details)
}

pub async fn get(pool: &SqlitePool, order_id: i64) -> ShopResult<OrderDetails> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ShopError::OrderNotFound {
        reference: order_id.to_string(),
    })?;

    let mut conn = pool.acquire().await?;
    load_details(&mut conn, row).await
}

pub async fn get_by_ref(pool: &SqlitePool, api_ref: &str) -> ShopResult<OrderDetails> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE api_ref = ?"
    ))
    .bind(api_ref)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ShopError::OrderNotFound {
        reference: api_ref.to_string(),
    })?;

    let mut conn = pool.acquire().await?;
    load_details(&mut conn, row).await
}

/// Whether an order already exists for this reference
pub async fn exists(pool: &SqlitePool, api_ref: &str) -> ShopResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE api_ref = ?")
        .bind(api_ref)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// All orders, newest first
pub async fn list_all(pool: &SqlitePool) -> ShopResult<Vec<OrderDetails>> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders ORDER BY id DESC"
    ))
    .fetch_all(pool)
    .await?;
    load_all(pool, rows).await
}

pub async fn list_by_customer_email(pool: &SqlitePool, email: &str) -> ShopResult<Vec<OrderDetails>> {
    let Some(customer) = customer::find_by_email(pool, &normalize_email(email)).await? else {
        return Ok(Vec::new());
    };
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = ? ORDER BY id DESC"
    ))
    .bind(customer.id)
    .fetch_all(pool)
    .await?;
    load_all(pool, rows).await
}

pub async fn list_by_status(pool: &SqlitePool, status: PaymentStatus) -> ShopResult<Vec<OrderDetails>> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_status = ? ORDER BY id DESC"
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;
    load_all(pool, rows).await
}

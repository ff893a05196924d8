//! # Inventory Ledger
//!
//! Per-product stock and availability.
//!
//! `reserve` is the only stock decrement and is one conditional `UPDATE`, so
//! concurrent reservations against the same row can never oversell it.
//! Availability is a generated column and cannot drift from stock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shop_core::{Currency, NewProduct, Price, Product, ShopError, ShopResult};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, instrument};

const FEATURED_LIMIT: i64 = 12;

const PRODUCT_COLUMNS: &str = "id, name, description, category, image_url, price_minor, \
     old_price_minor, currency, stock_quantity, is_active, is_available, rating, rating_count, \
     created_at, updated_at";

/// A successful stock decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub product_id: i64,
    pub remaining: u32,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: i64,
    name: String,
    description: Option<String>,
    category: String,
    image_url: Option<String>,
    price_minor: i64,
    old_price_minor: Option<i64>,
    currency: String,
    stock_quantity: i64,
    is_active: bool,
    is_available: bool,
    rating: f64,
    rating_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = ShopError;

    fn try_from(row: ProductRow) -> ShopResult<Self> {
        let currency = Currency::from_str(&row.currency)?;
        Ok(Product {
            id: row.id,
            name: row.name,
            description: row.description,
            category: row.category,
            image_url: row.image_url,
            price: Price::from_minor(row.price_minor, currency),
            old_price: row.old_price_minor.map(|p| Price::from_minor(p, currency)),
            stock_quantity: to_u32(row.stock_quantity),
            is_active: row.is_active,
            is_available: row.is_available,
            rating: row.rating,
            rating_count: to_u32(row.rating_count),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn into_products(rows: Vec<ProductRow>) -> ShopResult<Vec<Product>> {
    rows.into_iter().map(Product::try_from).collect()
}

// =============================================================================
// Reservation
// =============================================================================

/// Atomically take `quantity` units of a product.
#[instrument(skip(pool))]
pub async fn reserve(pool: &SqlitePool, product_id: i64, quantity: u32) -> ShopResult<Reservation> {
    let mut conn = pool.acquire().await?;
    reserve_in(&mut conn, product_id, quantity).await
}

/// [`reserve`] on a caller-owned connection, usually inside a transaction.
pub async fn reserve_in(
    conn: &mut SqliteConnection,
    product_id: i64,
    quantity: u32,
) -> ShopResult<Reservation> {
    if quantity < 1 {
        return Err(ShopError::Validation(
            "Quantity must be at least 1".to_string(),
        ));
    }

    let remaining: Option<i64> = sqlx::query_scalar(
        "UPDATE products SET stock_quantity = stock_quantity - ?1, updated_at = ?3 \
         WHERE id = ?2 AND is_active = 1 AND stock_quantity >= ?1 \
         RETURNING stock_quantity",
    )
    .bind(i64::from(quantity))
    .bind(product_id)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?;

    match remaining {
        Some(remaining) => {
            debug!(product_id, quantity, remaining, "Reserved stock");
            Ok(Reservation {
                product_id,
                remaining: to_u32(remaining),
            })
        }
        None => Err(diagnose_rejection(conn, product_id, quantity).await?),
    }
}

/// Explain why the conditional decrement matched no row.
async fn diagnose_rejection(
    conn: &mut SqliteConnection,
    product_id: i64,
    quantity: u32,
) -> ShopResult<ShopError> {
    let row: Option<(i64, bool)> =
        sqlx::query_as("SELECT stock_quantity, is_active FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(match row {
        None => ShopError::ProductNotFound { product_id },
        Some((_, false)) => ShopError::ProductUnavailable { product_id },
        Some((stock, true)) => ShopError::InsufficientStock {
            product_id,
            requested: quantity,
            available: to_u32(stock),
        },
    })
}

// =============================================================================
// Reads
// =============================================================================

/// Any product by id, active or not
pub async fn get(pool: &SqlitePool, product_id: i64) -> ShopResult<Product> {
    let mut conn = pool.acquire().await?;
    fetch(&mut conn, product_id)
        .await?
        .ok_or(ShopError::ProductNotFound { product_id })
}

/// A product visible in the storefront; inactive products read as missing
pub async fn get_active(pool: &SqlitePool, product_id: i64) -> ShopResult<Product> {
    let product = get(pool, product_id).await?;
    if !product.is_active {
        return Err(ShopError::ProductNotFound { product_id });
    }
    Ok(product)
}

pub(crate) async fn fetch(
    conn: &mut SqliteConnection,
    product_id: i64,
) -> ShopResult<Option<Product>> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"
    ))
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(Product::try_from).transpose()
}

pub async fn list_active(pool: &SqlitePool) -> ShopResult<Vec<Product>> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1 ORDER BY name"
    ))
    .fetch_all(pool)
    .await?;
    into_products(rows)
}

pub async fn list_by_category(pool: &SqlitePool, category: &str) -> ShopResult<Vec<Product>> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE is_active = 1 AND category = ? COLLATE NOCASE ORDER BY name"
    ))
    .bind(category.trim())
    .fetch_all(pool)
    .await?;
    into_products(rows)
}

/// Case-insensitive substring match on name, description and category.
pub async fn search(pool: &SqlitePool, term: &str) -> ShopResult<Vec<Product>> {
    let term = term.trim();
    if term.is_empty() {
        return Err(ShopError::Validation("Search term is required".to_string()));
    }
    let pattern = format!("%{}%", escape_like(&term.to_lowercase()));

    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE is_active = 1 AND ( \
             lower(name) LIKE ?1 ESCAPE '\\' \
             OR lower(COALESCE(description, '')) LIKE ?1 ESCAPE '\\' \
             OR lower(category) LIKE ?1 ESCAPE '\\') \
         ORDER BY name"
    ))
    .bind(pattern)
    .fetch_all(pool)
    .await?;
    into_products(rows)
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Distinct categories of active products
pub async fn categories(pool: &SqlitePool) -> ShopResult<Vec<String>> {
    let categories = sqlx::query_scalar(
        "SELECT DISTINCT category FROM products WHERE is_active = 1 ORDER BY category",
    )
    .fetch_all(pool)
    .await?;
    Ok(categories)
}

/// Newest active products
pub async fn featured(pool: &SqlitePool) -> ShopResult<Vec<Product>> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1 \
         ORDER BY created_at DESC, id DESC LIMIT ?"
    ))
    .bind(FEATURED_LIMIT)
    .fetch_all(pool)
    .await?;
    into_products(rows)
}

// =============================================================================
// Catalog maintenance
// =============================================================================

#[instrument(skip(pool, product), fields(name = %product.name))]
pub async fn create(pool: &SqlitePool, product: &NewProduct) -> ShopResult<Product> {
    let (price, old_price) = product.validate()?;
    let now = Utc::now();

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO products (name, description, category, image_url, price_minor, \
             old_price_minor, currency, stock_quantity, is_active, rating, rating_count, \
             created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(product.name.trim())
    .bind(product.description.as_deref())
    .bind(product.category.trim())
    .bind(product.image_url.as_deref())
    .bind(price.amount)
    .bind(old_price.map(|p| p.amount))
    .bind(price.currency.as_str())
    .bind(i64::from(product.stock_quantity))
    .bind(product.is_active)
    .bind(product.rating)
    .bind(i64::from(product.rating_count))
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    info!(product_id = id, "Created product");
    get(pool, id).await
}

/// Add stock to a product
#[instrument(skip(pool))]
pub async fn restock(pool: &SqlitePool, product_id: i64, quantity: u32) -> ShopResult<Product> {
    if quantity < 1 {
        return Err(ShopError::Validation(
            "Restock quantity must be at least 1".to_string(),
        ));
    }
    let updated = sqlx::query(
        "UPDATE products SET stock_quantity = stock_quantity + ?, updated_at = ? WHERE id = ?",
    )
    .bind(i64::from(quantity))
    .bind(Utc::now())
    .bind(product_id)
    .execute(pool)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ShopError::ProductNotFound { product_id });
    }
    info!(product_id, quantity, "Restocked product");
    get(pool, product_id).await
}

/// Replace a product's catalog fields.
///
/// Stock is left to `restock` and `reserve`; `stock_quantity` in the payload
/// is ignored.
#[instrument(skip(pool, product), fields(name = %product.name))]
pub async fn update(
    pool: &SqlitePool,
    product_id: i64,
    product: &NewProduct,
) -> ShopResult<Product> {
    let (price, old_price) = product.validate()?;

    let updated = sqlx::query(
        "UPDATE products SET name = ?, description = ?, category = ?, image_url = ?, \
             price_minor = ?, old_price_minor = ?, currency = ?, is_active = ?, rating = ?, \
             rating_count = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(product.name.trim())
    .bind(product.description.as_deref())
    .bind(product.category.trim())
    .bind(product.image_url.as_deref())
    .bind(price.amount)
    .bind(old_price.map(|p| p.amount))
    .bind(price.currency.as_str())
    .bind(product.is_active)
    .bind(product.rating)
    .bind(i64::from(product.rating_count))
    .bind(Utc::now())
    .bind(product_id)
    .execute(pool)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ShopError::ProductNotFound { product_id });
    }
    info!(product_id, "Updated product");
    get(pool, product_id).await
}

/// Hide a product from the storefront; rows are never deleted
#[instrument(skip(pool))]
pub async fn deactivate(pool: &SqlitePool, product_id: i64) -> ShopResult<()> {
    let updated = sqlx::query("UPDATE products SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(product_id)
        .execute(pool)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(ShopError::ProductNotFound { product_id });
    }
    info!(product_id, "Deactivated product");
    Ok(())
}

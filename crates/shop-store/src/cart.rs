//! # Cart Store
//!
//! Session-keyed carts. A cart row is created by the first add and removed by
//! `clear`. Stock checks here are advisory; the reconciler re-checks stock
//! when the order is paid.

use crate::inventory::{self, to_u32};
use chrono::{DateTime, Utc};
use shop_core::{Cart, CartLine, Currency, Price, Product, ShopError, ShopResult};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::{info, instrument};

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    id: i64,
    currency: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    id: i64,
    product_id: i64,
    product_name: String,
    quantity: i64,
    unit_price_minor: i64,
    is_available: bool,
    updated_at: DateTime<Utc>,
}

impl CartLineRow {
    fn into_line(self, currency: Currency) -> ShopResult<CartLine> {
        let quantity = to_u32(self.quantity);
        let unit_price = Price::from_minor(self.unit_price_minor, currency);
        Ok(CartLine {
            id: self.id,
            product_id: self.product_id,
            product_name: self.product_name,
            quantity,
            subtotal: unit_price.times(quantity)?,
            unit_price,
            is_available: self.is_available,
            updated_at: self.updated_at,
        })
    }
}

fn require_session(session_id: &str) -> ShopResult<&str> {
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(ShopError::Validation("Session id is required".to_string()));
    }
    Ok(session_id)
}

fn require_quantity(quantity: u32) -> ShopResult<()> {
    if quantity < 1 {
        return Err(ShopError::Validation(
            "Quantity must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Rejects inactive products and quantities beyond current stock
fn check_stock(product: &Product, wanted: u32) -> ShopResult<()> {
    if !product.is_active {
        return Err(ShopError::ProductUnavailable {
            product_id: product.id,
        });
    }
    if product.stock_quantity == 0 || wanted > product.stock_quantity {
        return Err(ShopError::OutOfStock {
            product_id: product.id,
            available: product.stock_quantity,
        });
    }
    Ok(())
}

/// Add `quantity` units of a product, merging into an existing line.
///
/// A merge sums the quantities and refreshes the line to the current price.
#[instrument(skip(pool))]
pub async fn add_item(
    pool: &SqlitePool,
    session_id: &str,
    product_id: i64,
    quantity: u32,
) -> ShopResult<Cart> {
    let session_id = require_session(session_id)?;
    require_quantity(quantity)?;

    let product = inventory::get(pool, product_id).await?;
    check_stock(&product, quantity)?;

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let (cart_id, cart_currency): (i64, String) = sqlx::query_as(
        "INSERT INTO carts (session_id, currency, created_at, updated_at) VALUES (?1, ?2, ?3, ?3) \
         ON CONFLICT(session_id) DO UPDATE SET updated_at = excluded.updated_at \
         RETURNING id, currency",
    )
    .bind(session_id)
    .bind(product.price.currency.as_str())
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    if cart_currency != product.price.currency.as_str() {
        return Err(ShopError::Validation(format!(
            "Cart is priced in {cart_currency}, product {product_id} in {}",
            product.price.currency
        )));
    }

    // Re-read under the write lock so the advisory check sees current stock
    let product = inventory::fetch(&mut *tx, product_id)
        .await?
        .ok_or(ShopError::ProductNotFound { product_id })?;
    let in_cart: Option<i64> =
        sqlx::query_scalar("SELECT quantity FROM cart_items WHERE cart_id = ? AND product_id = ?")
            .bind(cart_id)
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;
    let wanted = quantity.saturating_add(in_cart.map(to_u32).unwrap_or(0));
    check_stock(&product, wanted)?;

    sqlx::query(
        "INSERT INTO cart_items (cart_id, product_id, quantity, unit_price_minor, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
         ON CONFLICT(cart_id, product_id) DO UPDATE SET \
             quantity = cart_items.quantity + excluded.quantity, \
             unit_price_minor = excluded.unit_price_minor, \
             updated_at = excluded.updated_at",
    )
    .bind(cart_id)
    .bind(product_id)
    .bind(i64::from(quantity))
    .bind(product.price.amount)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(product = %product.name, quantity, "Added item to cart");

    get(pool, session_id, product.price.currency).await
}

/// Set the quantity of one line in this session's cart
#[instrument(skip(pool))]
pub async fn update_item(
    pool: &SqlitePool,
    session_id: &str,
    item_id: i64,
    quantity: u32,
) -> ShopResult<Cart> {
    let session_id = require_session(session_id)?;
    require_quantity(quantity)?;

    let mut tx = pool.begin().await?;
    let (product_id, currency) = touch_item(&mut *tx, session_id, item_id).await?;

    let product = inventory::fetch(&mut *tx, product_id)
        .await?
        .ok_or(ShopError::ProductNotFound { product_id })?;
    check_stock(&product, quantity)?;

    sqlx::query("UPDATE cart_items SET quantity = ? WHERE id = ?")
        .bind(i64::from(quantity))
        .bind(item_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(item_id, quantity, "Updated cart item quantity");
    get(pool, session_id, currency).await
}

/// Claims the write lock and resolves the line's product and cart currency
async fn touch_item(
    conn: &mut SqliteConnection,
    session_id: &str,
    item_id: i64,
) -> ShopResult<(i64, Currency)> {
    let touched: Option<(i64, i64)> = sqlx::query_as(
        "UPDATE cart_items SET updated_at = ?1 \
         WHERE id = ?2 AND cart_id = (SELECT id FROM carts WHERE session_id = ?3) \
         RETURNING product_id, cart_id",
    )
    .bind(Utc::now())
    .bind(item_id)
    .bind(session_id)
    .fetch_optional(&mut *conn)
    .await?;
    let (product_id, cart_id) = touched.ok_or(ShopError::CartItemNotFound { item_id })?;

    let currency: String = sqlx::query_scalar("SELECT currency FROM carts WHERE id = ?")
        .bind(cart_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok((product_id, Currency::from_str(&currency)?))
}

/// Remove one line from this session's cart
#[instrument(skip(pool))]
pub async fn remove_item(pool: &SqlitePool, session_id: &str, item_id: i64) -> ShopResult<Cart> {
    let session_id = require_session(session_id)?;

    let cart: Option<(i64, String)> =
        sqlx::query_as("SELECT id, currency FROM carts WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(pool)
            .await?;
    let (cart_id, currency) = cart.ok_or(ShopError::CartItemNotFound { item_id })?;

    let deleted = sqlx::query("DELETE FROM cart_items WHERE id = ? AND cart_id = ?")
        .bind(item_id)
        .bind(cart_id)
        .execute(pool)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ShopError::CartItemNotFound { item_id });
    }

    info!(item_id, "Removed cart item");
    get(pool, session_id, Currency::from_str(&currency)?).await
}

/// Delete the session's cart and all its lines
#[instrument(skip(pool))]
pub async fn clear(pool: &SqlitePool, session_id: &str) -> ShopResult<()> {
    let session_id = require_session(session_id)?;
    let deleted = sqlx::query("DELETE FROM carts WHERE session_id = ?")
        .bind(session_id)
        .execute(pool)
        .await?;
    if deleted.rows_affected() > 0 {
        info!("Cleared cart");
    }
    Ok(())
}

/// The session's cart, or an empty view priced in `fallback` when none exists
pub async fn get(pool: &SqlitePool, session_id: &str, fallback: Currency) -> ShopResult<Cart> {
    let session_id = require_session(session_id)?;

    let cart = sqlx::query_as::<_, CartRow>(
        "SELECT id, currency, created_at FROM carts WHERE session_id = ?",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;
    let Some(cart) = cart else {
        return Ok(Cart::empty(session_id, fallback));
    };
    let currency = Currency::from_str(&cart.currency)?;

    let rows = sqlx::query_as::<_, CartLineRow>(
        "SELECT ci.id, ci.product_id, p.name AS product_name, ci.quantity, ci.unit_price_minor, \
             p.is_available, ci.updated_at \
         FROM cart_items ci JOIN products p ON p.id = ci.product_id \
         WHERE ci.cart_id = ? ORDER BY ci.id",
    )
    .bind(cart.id)
    .fetch_all(pool)
    .await?;
    let lines = rows
        .into_iter()
        .map(|row| row.into_line(currency))
        .collect::<ShopResult<Vec<_>>>()?;

    Cart::from_lines(cart.id, session_id, lines, currency, cart.created_at)
}

/// Number of distinct lines in the session's cart
pub async fn count(pool: &SqlitePool, session_id: &str) -> ShopResult<u32> {
    let session_id = require_session(session_id)?;
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM cart_items ci JOIN carts c ON c.id = ci.cart_id WHERE c.session_id = ?",
    )
    .bind(session_id)
    .fetch_one(pool)
    .await?;
    Ok(to_u32(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_db, seed_product};

    #[tokio::test]
    async fn test_add_merges_and_refreshes_price() {
        let db = memory_db().await;
        let id = seed_product(&db, "Kikoy", 1000, 10).await;

        let cart = add_item(&db.pool, "s1", id, 2).await.unwrap();
        assert_eq!(cart.total_items, 1);
        assert_eq!(cart.total_amount.amount, 2000);

        sqlx::query("UPDATE products SET price_minor = 1200 WHERE id = ?")
            .bind(id)
            .execute(&db.pool)
            .await
            .unwrap();

        let cart = add_item(&db.pool, "s1", id, 1).await.unwrap();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].quantity, 3);
        assert_eq!(cart.lines[0].unit_price.amount, 1200);
        assert_eq!(cart.total_amount.amount, 3600);
        assert_eq!(count(&db.pool, "s1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_rejections_leave_no_cart() {
        let db = memory_db().await;
        let sold_out = seed_product(&db, "Solar Lamp", 2999, 0).await;
        let few = seed_product(&db, "Chess Set", 5200, 2).await;

        assert!(matches!(
            add_item(&db.pool, "s1", 404, 1).await,
            Err(ShopError::ProductNotFound { product_id: 404 })
        ));
        assert!(matches!(
            add_item(&db.pool, "s1", sold_out, 1).await,
            Err(ShopError::OutOfStock { available: 0, .. })
        ));
        assert!(matches!(
            add_item(&db.pool, "s1", few, 0).await,
            Err(ShopError::Validation(_))
        ));
        assert!(get(&db.pool, "s1", Currency::KES).await.unwrap().id.is_none());

        add_item(&db.pool, "s1", few, 2).await.unwrap();
        assert!(matches!(
            add_item(&db.pool, "s1", few, 1).await,
            Err(ShopError::OutOfStock { available: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_update_and_remove_are_session_scoped() {
        let db = memory_db().await;
        let id = seed_product(&db, "Kikoy", 1000, 5).await;

        let cart = add_item(&db.pool, "mine", id, 1).await.unwrap();
        let item_id = cart.lines[0].id;

        assert!(matches!(
            update_item(&db.pool, "theirs", item_id, 2).await,
            Err(ShopError::CartItemNotFound { .. })
        ));
        assert!(matches!(
            update_item(&db.pool, "mine", item_id, 6).await,
            Err(ShopError::OutOfStock { available: 5, .. })
        ));

        let cart = update_item(&db.pool, "mine", item_id, 4).await.unwrap();
        assert_eq!(cart.item_count(), 4);

        assert!(matches!(
            remove_item(&db.pool, "theirs", item_id).await,
            Err(ShopError::CartItemNotFound { .. })
        ));
        let cart = remove_item(&db.pool, "mine", item_id).await.unwrap();
        assert!(cart.is_empty());
        assert!(matches!(
            remove_item(&db.pool, "mine", item_id).await,
            Err(ShopError::CartItemNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_clear_and_empty_view() {
        let db = memory_db().await;
        let a = seed_product(&db, "Kikoy", 1000, 5).await;
        let b = seed_product(&db, "Basket", 1850, 5).await;

        add_item(&db.pool, "s1", a, 1).await.unwrap();
        add_item(&db.pool, "s1", b, 2).await.unwrap();
        assert_eq!(count(&db.pool, "s1").await.unwrap(), 2);

        clear(&db.pool, "s1").await.unwrap();
        let cart = get(&db.pool, "s1", Currency::KES).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.total_amount, Price::zero(Currency::KES));
        assert_eq!(count(&db.pool, "s1").await.unwrap(), 0);

        assert!(matches!(get(&db.pool, " ", Currency::KES).await, Err(ShopError::Validation(_))));
    }
}

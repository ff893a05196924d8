//! # Customer Registry
//!
//! One customer per normalized email, shared across orders.

use chrono::{DateTime, Utc};
use shop_core::{normalize_email, ContactInfo, Customer, ShopError, ShopResult};
use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CustomerRow {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    created_at: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            created_at: row.created_at,
        }
    }
}

const CUSTOMER_COLUMNS: &str = "id, first_name, last_name, email, phone, created_at";

/// Return the customer for this email, creating it on first sight.
///
/// Existing rows win: names and phone of a returning customer are not
/// overwritten. Two concurrent creators race on the UNIQUE email; the loser
/// re-reads the winner's row.
#[instrument(skip(pool, contact), fields(email = %contact.email))]
pub async fn find_or_create(pool: &SqlitePool, contact: &ContactInfo) -> ShopResult<Customer> {
    let email = normalize_email(&contact.email);
    if email.is_empty() {
        return Err(ShopError::Validation("Email is required".to_string()));
    }

    if let Some(existing) = find_by_email(pool, &email).await? {
        debug!(customer_id = existing.id, "Found existing customer");
        return Ok(existing);
    }

    let inserted = sqlx::query_as::<_, CustomerRow>(&format!(
        "INSERT INTO customers (first_name, last_name, email, phone, created_at) \
         VALUES (?, ?, ?, ?, ?) RETURNING {CUSTOMER_COLUMNS}"
    ))
    .bind(contact.first_name.trim())
    .bind(contact.last_name.trim())
    .bind(&email)
    .bind(contact.phone.trim())
    .bind(Utc::now())
    .fetch_one(pool)
    .await;

    match inserted {
        Ok(row) => {
            info!(customer_id = row.id, "Created customer");
            Ok(row.into())
        }
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            debug!("Lost customer creation race, re-reading");
            find_by_email(pool, &email)
                .await?
                .ok_or_else(|| ShopError::Internal(format!("Customer {email} vanished after conflict")))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn get(pool: &SqlitePool, customer_id: i64) -> ShopResult<Option<Customer>> {
    let row = sqlx::query_as::<_, CustomerRow>(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?"
    ))
    .bind(customer_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Customer::from))
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> ShopResult<Option<Customer>> {
    let row = sqlx::query_as::<_, CustomerRow>(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE email = ?"
    ))
    .bind(normalize_email(email))
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Customer::from))
}

//! # Database
//!
//! SQLite connection pool, embedded migrations and catalog seeding.

use crate::inventory;
use shop_core::{ProductCatalog, ShopError, ShopResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the SQLite connection pool
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) a file database in WAL mode and run migrations.
    pub async fn connect(url: &str) -> ShopResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| ShopError::Configuration(format!("Invalid DATABASE_URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| ShopError::Database(format!("Failed to open database: {e}")))?;

        info!("Database connection established (SQLite WAL, busy_timeout=5000ms)");

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Private in-memory database on a single pinned connection.
    ///
    /// Every pool connection to `:memory:` is its own database, so the pool
    /// holds exactly one and never recycles it.
    pub async fn in_memory() -> ShopResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| ShopError::Configuration(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> ShopResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn migrate(&self) -> ShopResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ShopError::Database(format!("Failed to apply migrations: {e}")))?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Insert the seed catalog when the products table is empty.
    ///
    /// Returns the number of products inserted.
    pub async fn seed_catalog(&self, catalog: &ProductCatalog) -> ShopResult<usize> {
        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        if existing > 0 || catalog.is_empty() {
            return Ok(0);
        }

        for product in &catalog.products {
            inventory::create(&self.pool, product).await?;
        }
        info!("Seeded {} products", catalog.len());
        Ok(catalog.len())
    }
}

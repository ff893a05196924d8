//! # Application State
//!
//! Shared state for the Axum application.
//! Holds the database, the checkout initiator with its gateway, and the
//! order reconciler.

use anyhow::Context;
use shop_core::{
    with_api_ref, BoxedPaymentGateway, CheckoutUrls, Currency, ProductCatalog, ShopResult,
};
use shop_intasend::IntaSendGateway;
use shop_store::{CheckoutInitiator, Database, OrderReconciler};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Base URL for redirects
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// SQLite database URL
    pub database_url: String,
    /// Currency for carts and checkouts
    pub currency: Currency,
    /// Storefront page the gateway redirects to after payment.
    /// Defaults to the built-in success page.
    pub checkout_redirect_url: Option<String>,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let currency = match std::env::var("DEFAULT_CURRENCY") {
            Ok(raw) => Currency::from_str(&raw).unwrap_or_else(|e| {
                warn!("{e}, falling back to {}", Currency::default());
                Currency::default()
            }),
            Err(_) => Currency::default(),
        };

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://storefront.db".to_string()),
            currency,
            checkout_redirect_url: std::env::var("CHECKOUT_REDIRECT_URL")
                .ok()
                .filter(|u| !u.is_empty()),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid socket address {}:{}", self.host, self.port))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Durable store
    pub db: Database,
    /// Opens hosted-checkout sessions
    pub initiator: CheckoutInitiator,
    /// Applies payment events to orders
    pub reconciler: OrderReconciler,
    /// Checkout URLs
    pub urls: CheckoutUrls,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Connect the database, seed the catalog and wire the IntaSend gateway
    pub async fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();

        let db = Database::connect(&config.database_url)
            .await
            .with_context(|| format!("Failed to open {}", config.database_url))?;

        let catalog = load_product_catalog()?;
        let seeded = db.seed_catalog(&catalog).await?;
        if seeded > 0 {
            info!("Seeded {} products into an empty catalog", seeded);
        }

        let gateway = IntaSendGateway::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize IntaSend: {}", e))?;
        if gateway.config().is_test_mode() {
            warn!("IntaSend is running with a sandbox key");
        }

        Ok(Self::with_gateway(config, db, Arc::new(gateway)))
    }

    /// Assemble state around an existing database and gateway
    pub fn with_gateway(config: AppConfig, db: Database, gateway: BoxedPaymentGateway) -> Self {
        let urls = CheckoutUrls::new(&config.base_url);
        Self {
            initiator: CheckoutInitiator::new(db.pool.clone(), gateway),
            reconciler: OrderReconciler::new(db.pool.clone()),
            db,
            urls,
            config,
        }
    }

    /// Currency for carts and checkouts
    pub fn currency(&self) -> Currency {
        self.config.currency
    }

    /// Where the gateway sends the buyer back, carrying the reference
    pub fn redirect_url_for(&self, api_ref: &str) -> ShopResult<String> {
        match &self.config.checkout_redirect_url {
            Some(url) => with_api_ref(url, api_ref),
            None => self.urls.success_url_for(api_ref),
        }
    }
}

/// Load product catalog from config file
fn load_product_catalog() -> anyhow::Result<ProductCatalog> {
    let config_paths = [
        "config/products.toml",
        "../config/products.toml",
        "../../config/products.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let catalog = ProductCatalog::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            info!("Loaded {} seed products from {}", catalog.len(), path);
            return Ok(catalog);
        }
    }

    warn!("No product catalog found, starting without seed data");
    Ok(ProductCatalog::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            base_url: "http://localhost:3000/".to_string(),
            environment: "test".to_string(),
            database_url: "sqlite::memory:".to_string(),
            currency: Currency::KES,
            checkout_redirect_url: None,
        }
    }

    #[test]
    fn test_socket_addr() {
        let config = test_config();
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:3000");

        let bad = AppConfig {
            host: "not a host".to_string(),
            ..test_config()
        };
        assert!(bad.socket_addr().is_err());
        assert!(!config.is_production());
    }

    #[test]
    fn test_seed_catalog_is_found() {
        let catalog = load_product_catalog().unwrap();
        assert!(!catalog.is_empty());
    }
}

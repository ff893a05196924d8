//! # Storefront
//!
//! Checkout and order-reconciliation backend with IntaSend hosted checkout.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export INTASEND_PUBLIC_KEY=ISPubKey_test_...
//! export INTASEND_WEBHOOK_CHALLENGE=...
//! export DATABASE_URL=sqlite://storefront.db
//!
//! # Run the server
//! storefront
//! ```

use shop_api::{routes, state::AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    print_banner();

    // Initialize application state
    let state = AppState::new().await?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Database: {}", state.config.database_url);
    info!("Currency: {}", state.currency());
    info!(
        "Payment gateway: {}",
        state.initiator.gateway().provider_name()
    );

    let app = routes::create_router(state);

    info!("🛒 Storefront starting on http://{}", addr);

    if !is_prod {
        info!("📝 Health: http://{}/health", addr);
        info!("💳 Checkout: POST http://{}/api/orders/checkout", addr);
        info!("🔔 Webhook: POST http://{}/api/orders/webhook/intasend", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  🛒 Storefront 🛒
  ━━━━━━━━━━━━━━━━━━━━━━━
  Checkout & order reconciliation
  Version: {}
  
"#,
        env!("CARGO_PKG_VERSION")
    );
}

//! # shop-api
//!
//! HTTP API layer for the storefront.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints for the catalog, carts and orders
//! - The IntaSend webhook endpoint feeding the order reconciler
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/api/products` | List active products |
//! | GET | `/api/products/{id}` | Get product |
//! | POST | `/api/cart/add` | Add to cart |
//! | GET | `/api/cart/{session_id}` | Get cart |
//! | POST | `/api/orders/checkout` | Open hosted checkout |
//! | POST | `/api/orders/confirm` | Redirect confirmation |
//! | POST | `/api/orders/webhook/intasend` | IntaSend webhook |
//! | GET | `/api/orders/ref/{api_ref}` | Order by reference |
//!
//! All JSON responses use the `{ success, message, data }` envelope.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResponse};
pub use routes::create_router;
pub use state::{AppConfig, AppState};

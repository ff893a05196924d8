//! # shop-store
//!
//! Durable state and the checkout workflow for the storefront, on SQLite.
//!
//! - [`inventory`]: product stock with an atomic `reserve`
//! - [`cart`]: session-keyed carts
//! - [`customer`]: find-or-create by email
//! - [`checkout`]: [`CheckoutInitiator`] opens gateway sessions
//! - [`reconcile`]: [`OrderReconciler`] turns payment events into orders
//! - [`order`]: order reads
//!
//! ## Example
//!
//! ```rust,ignore
//! let db = Database::connect("sqlite://storefront.db").await?;
//! let initiator = CheckoutInitiator::new(db.pool.clone(), gateway);
//! let reconciler = OrderReconciler::new(db.pool.clone());
//!
//! let lines = initiator.lines_from_cart("session-1", Currency::KES).await?;
//! let session = initiator.initiate(contact, lines, Currency::KES, "R1", redirect).await?;
//! // ... later, from the webhook
//! let result = reconciler.reconcile(event).await?;
//! ```

pub mod cart;
pub mod checkout;
pub mod customer;
pub mod db;
pub mod inventory;
pub mod order;
pub mod reconcile;

pub use checkout::CheckoutInitiator;
pub use db::Database;
pub use inventory::Reservation;
pub use reconcile::OrderReconciler;

//! # Routes
//!
//! Axum router configuration for the storefront API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Catalog: `/api/products`, `/featured`, `/categories`, `/search?q=`,
///   `/category/{category}`, `/{id}` (GET, PUT, DELETE), `POST /{id}/restock`
/// - Cart: `/api/cart/add`, `/{session_id}`, `/{session_id}/count`,
///   `/update`, `/item/{item_id}?session_id=`, `/clear/{session_id}`
/// - Orders: `/api/orders/checkout`, `/confirm`, `/create-pending`,
///   `/webhook/intasend`, listing and lookups, `PUT /{id}/status`
///
/// - Static pages:
///   - GET /checkout/success - Success page
///   - GET /checkout/cancel - Cancel page
pub fn create_router(state: AppState) -> Router {
    // The storefront is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let checkout_routes = Router::new()
        .route("/success", get(handlers::checkout_success))
        .route("/cancel", get(handlers::checkout_cancel));

    let product_routes = Router::new()
        .route("/", get(handlers::list_products).post(handlers::create_product))
        .route("/featured", get(handlers::featured_products))
        .route("/categories", get(handlers::list_categories))
        .route("/search", get(handlers::search_products))
        .route("/category/{category}", get(handlers::products_by_category))
        .route(
            "/{product_id}",
            get(handlers::get_product)
                .put(handlers::update_product)
                .delete(handlers::delete_product),
        )
        .route("/{product_id}/restock", post(handlers::restock_product));

    let cart_routes = Router::new()
        .route("/add", post(handlers::add_to_cart))
        .route("/update", put(handlers::update_cart_item))
        .route("/item/{item_id}", delete(handlers::remove_cart_item))
        .route("/clear/{session_id}", delete(handlers::clear_cart))
        .route("/{session_id}", get(handlers::get_cart))
        .route("/{session_id}/count", get(handlers::cart_count));

    let order_routes = Router::new()
        .route("/", get(handlers::list_orders))
        .route("/checkout", post(handlers::create_checkout))
        .route("/confirm", post(handlers::confirm_order))
        .route("/create-pending", post(handlers::create_pending_order))
        .route("/webhook/intasend", post(handlers::intasend_webhook))
        .route("/ref/{api_ref}", get(handlers::get_order_by_ref))
        .route("/customer/{email}", get(handlers::orders_by_customer))
        .route("/status/{status}", get(handlers::orders_by_status))
        .route("/{order_id}", get(handlers::get_order))
        .route("/{order_id}/status", put(handlers::update_order_status));

    let api_routes = Router::new()
        .nest("/products", product_routes)
        .nest("/cart", cart_routes)
        .nest("/orders", order_routes);

    Router::new()
        // Health check at root
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/checkout", checkout_routes)
        .nest("/api", api_routes)
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // State
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppConfig;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use shop_core::{
        CheckoutRequest, CheckoutSession, Currency, PaymentEvent, PaymentGateway, ShopError,
        ShopResult,
    };
    use shop_store::Database;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    const CHALLENGE: &str = "s3cret";

    /// Accepts checkouts, verifies webhooks with the IntaSend parser
    #[derive(Default)]
    struct StubGateway {
        calls: AtomicUsize,
        time_out: AtomicBool,
        last_redirect: Mutex<Option<String>>,
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_checkout(&self, request: &CheckoutRequest) -> ShopResult<CheckoutSession> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_redirect.lock().unwrap() = Some(request.redirect_url.clone());
            if self.time_out.load(Ordering::SeqCst) {
                return Err(ShopError::GatewayTimeout { timeout_secs: 30 });
            }
            Ok(CheckoutSession::new(
                format!("CHK{n}"),
                &request.api_ref,
                "stub",
                format!("https://pay.example/{n}"),
                request.amount,
            ))
        }

        async fn verify_webhook(&self, payload: &[u8]) -> ShopResult<PaymentEvent> {
            shop_intasend::parse_webhook(payload, Some(CHALLENGE))
        }

        fn provider_name(&self) -> &'static str {
            "stub"
        }
    }

    async fn test_app() -> (Router, Arc<StubGateway>) {
        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            base_url: "http://shop.test".to_string(),
            environment: "test".to_string(),
            database_url: "sqlite::memory:".to_string(),
            currency: Currency::KES,
            checkout_redirect_url: None,
        };
        let db = Database::in_memory().await.unwrap();
        let gateway = Arc::new(StubGateway::default());
        let state = AppState::with_gateway(config, db, gateway.clone());
        (create_router(state), gateway)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create_product(app: &Router, name: &str, price: &str, stock: u32) -> i64 {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/products",
            Some(json!({"name": name, "category": "Kitchen", "price": price, "stock_quantity": stock})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["id"].as_i64().unwrap()
    }

    fn buyer(api_ref: &str, items: Value) -> Value {
        json!({
            "first_name": "Amina",
            "last_name": "Odhiambo",
            "email": "amina@example.com",
            "phone": "254700000000",
            "api_ref": api_ref,
            "items": items
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "ok");
    }

    #[tokio::test]
    async fn test_product_errors_use_envelope() {
        let (app, _) = test_app().await;

        let (status, body) = send(&app, Method::GET, "/api/products/999", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("999"));

        let (status, _) = send(&app, Method::GET, "/api/products/search?q=", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_catalog_listing() {
        let (app, _) = test_app().await;
        create_product(&app, "Cast Iron Pan", "2400.00", 4).await;

        let (status, body) = send(&app, Method::GET, "/api/products", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, body) = send(&app, Method::GET, "/api/products/categories", None).await;
        assert_eq!(body["data"], json!(["Kitchen"]));

        let (_, body) = send(&app, Method::GET, "/api/products/search?q=iron", None).await;
        assert_eq!(body["data"][0]["name"], "Cast Iron Pan");
    }

    #[tokio::test]
    async fn test_cart_flow() {
        let (app, _) = test_app().await;
        let kettle = create_product(&app, "Kettle", "1500.00", 5).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/cart/add",
            Some(json!({"session_id": "s-1", "product_id": kettle, "quantity": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let item_id = body["data"]["lines"][0]["id"].as_i64().unwrap();

        let (_, body) = send(&app, Method::GET, "/api/cart/s-1/count", None).await;
        assert_eq!(body["data"]["count"], 1);

        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/cart/update",
            Some(json!({"session_id": "s-1", "cart_item_id": item_id, "quantity": 9})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/api/cart/item/{item_id}?session_id=s-2"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, Method::GET, "/api/cart/s-1", None).await;
        assert_eq!(body["data"]["total_amount"]["amount"], 300000);

        let (status, _) = send(&app, Method::DELETE, "/api/cart/clear/s-1", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&app, Method::GET, "/api/cart/s-1/count", None).await;
        assert_eq!(body["data"]["count"], 0);
    }

    #[tokio::test]
    async fn test_checkout_then_duplicate_webhook() {
        let (app, gateway) = test_app().await;
        let pan = create_product(&app, "Pan", "10.00", 3).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/orders/checkout",
            Some(buyer("R1", json!([{"product_id": pan, "quantity": 2}]))),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["api_ref"], "R1");
        assert_eq!(body["data"]["state"], "PENDING");
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);

        let hook = json!({"api_ref": "R1", "invoice_id": "INV-1", "state": "COMPLETE", "challenge": CHALLENGE});
        let (status, body) = send(&app, Method::POST, "/api/orders/webhook/intasend", Some(hook.clone())).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["outcome"]["kind"], "created");
        assert_eq!(body["data"]["order"]["total_amount"]["amount"], 2000);

        let (status, body) = send(&app, Method::POST, "/api/orders/webhook/intasend", Some(hook)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["outcome"]["kind"], "unchanged");
        assert_eq!(body["data"]["stock_committed_now"], false);

        let (_, body) = send(&app, Method::GET, &format!("/api/products/{pan}"), None).await;
        assert_eq!(body["data"]["stock_quantity"], 1);

        let (_, body) = send(&app, Method::GET, "/api/orders", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_webhook_failures_are_not_acknowledged() {
        let (app, _) = test_app().await;

        let unknown = json!({"api_ref": "NOPE", "state": "COMPLETE", "challenge": CHALLENGE});
        let (status, body) = send(&app, Method::POST, "/api/orders/webhook/intasend", Some(unknown)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);

        let forged = json!({"api_ref": "NOPE", "state": "COMPLETE", "challenge": "guess"});
        let (status, _) = send(&app, Method::POST, "/api/orders/webhook/intasend", Some(forged)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, Method::POST, "/api/orders/webhook/intasend", Some(json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_gateway_timeout_leaves_no_order() {
        let (app, gateway) = test_app().await;
        let pan = create_product(&app, "Pan", "10.00", 3).await;
        gateway.time_out.store(true, Ordering::SeqCst);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/orders/checkout",
            Some(buyer("R-T", json!([{"product_id": pan}]))),
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);

        let (status, _) = send(&app, Method::GET, "/api/orders/ref/R-T", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        gateway.time_out.store(false, Ordering::SeqCst);
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/orders/checkout",
            Some(buyer("R-T2", json!([{"product_id": pan}]))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_confirm_lookup_and_status_update() {
        let (app, _) = test_app().await;
        let mug = create_product(&app, "Mug", "350.00", 10).await;

        send(
            &app,
            Method::POST,
            "/api/orders/checkout",
            Some(buyer("R9", json!([{"product_id": mug, "quantity": 3}]))),
        )
        .await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/orders/create-pending",
            Some(json!({"api_ref": "R9"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["order"]["payment_status"], "PENDING");
        let order_id = body["data"]["order"]["id"].as_i64().unwrap();

        let (_, body) = send(
            &app,
            Method::POST,
            "/api/orders/confirm",
            Some(json!({"api_ref": "R9", "tracking_id": "TRK-9", "state": "COMPLETE"})),
        )
        .await;
        assert_eq!(body["data"]["outcome"]["kind"], "updated");
        assert_eq!(body["data"]["order"]["tracking_id"], "TRK-9");

        let (_, body) = send(&app, Method::GET, "/api/orders/ref/R9", None).await;
        assert_eq!(body["data"]["payment_status"], "COMPLETE");

        let (_, body) = send(&app, Method::GET, "/api/orders/customer/AMINA@example.com", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, body) = send(&app, Method::GET, "/api/orders/status/COMPLETE", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/api/orders/{order_id}/status"),
            Some(json!({"status": "FAILED"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["order"]["payment_status"], "FAILED");

        let (status, _) = send(&app, Method::GET, "/api/orders/status/SHIPPED", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, Method::GET, &format!("/api/products/{mug}"), None).await;
        assert_eq!(body["data"]["stock_quantity"], 7);
    }

    #[tokio::test]
    async fn test_malformed_requests_use_envelope() {
        let (app, _) = test_app().await;

        let (status, body) = send(&app, Method::POST, "/api/cart/add", Some(json!({"quantity": -1}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().starts_with("Invalid request"));

        let (status, body) = send(&app, Method::GET, "/api/products/not-a-number", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/orders/abc/status",
            Some(json!({"status": "COMPLETE"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_redirect_carries_encoded_trimmed_reference() {
        let (app, gateway) = test_app().await;
        let pan = create_product(&app, "Pan", "10.00", 3).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/orders/checkout",
            Some(buyer("  A&B#1  ", json!([{"product_id": pan}]))),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["api_ref"], "A&B#1");

        let redirect = gateway.last_redirect.lock().unwrap().clone().unwrap();
        assert_eq!(redirect, "http://shop.test/checkout/success?api_ref=A%26B%231");
    }

    #[tokio::test]
    async fn test_update_and_soft_delete_product() {
        let (app, _) = test_app().await;
        let kettle = create_product(&app, "Kettle", "1500.00", 5).await;

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/api/products/{kettle}"),
            Some(json!({"name": "Electric Kettle", "category": "Kitchen", "price": "1750.00"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["name"], "Electric Kettle");
        assert_eq!(body["data"]["price"]["amount"], 175000);
        assert_eq!(body["data"]["stock_quantity"], 5);

        let (status, body) = send(&app, Method::DELETE, &format!("/api/products/{kettle}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["is_active"], false);

        let (status, _) = send(&app, Method::GET, &format!("/api/products/{kettle}"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/cart/add",
            Some(json!({"session_id": "s-9", "product_id": kettle})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("not available"));

        let (status, _) = send(&app, Method::DELETE, "/api/products/404", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

//! # Request Handlers
//!
//! Axum request handlers for the storefront API: catalog, carts, checkout
//! and order reconciliation.

use crate::error::{ApiError, ApiJson, ApiPath, ApiQuery, ApiResponse, ApiResult};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    response::{Html, IntoResponse},
    Json,
};
use serde::{Deserialize, Serialize};
use shop_core::{
    Cart, ContactInfo, EventSource, NewProduct, OrderDetails, PaymentEvent, PaymentStatus,
    Product, Reconciliation, ShopError,
};
use shop_store::{cart, inventory, order};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{error, info, instrument, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

fn default_quantity() -> u32 {
    1
}

/// Add-to-cart request
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub session_id: String,
    pub product_id: i64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

/// Cart line quantity change
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub session_id: String,
    pub cart_item_id: i64,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

/// Item in a direct checkout request
#[derive(Debug, Deserialize)]
pub struct CheckoutItem {
    pub product_id: i64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

/// Checkout request. Lines come from `items` when given, else from the
/// session's cart.
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    /// Idempotency reference; generated when absent
    #[serde(default)]
    pub api_ref: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub items: Vec<CheckoutItem>,
}

/// Create checkout response
#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    /// Gateway session id
    pub id: String,
    /// Hosted checkout URL (redirect the buyer here)
    pub url: String,
    pub api_ref: String,
    pub state: PaymentStatus,
    pub amount: String,
}

/// Client confirmation after the gateway redirect
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub api_ref: String,
    #[serde(default)]
    pub checkout_id: Option<String>,
    #[serde(default)]
    pub tracking_id: Option<String>,
    /// Gateway state as reported on the redirect
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PendingOrderRequest {
    pub api_ref: String,
    #[serde(default)]
    pub checkout_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct CartCount {
    pub count: u32,
}

// =============================================================================
// Health
// =============================================================================

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.db.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!("Health check database ping failed: {}", e);
            "unavailable"
        }
    };
    Json(serde_json::json!({
        "status": "healthy",
        "service": "storefront",
        "database": database,
        "gateway": state.initiator.gateway().provider_name(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// =============================================================================
// Products
// =============================================================================

pub async fn list_products(State(state): State<AppState>) -> ApiResult<Vec<Product>> {
    let products = inventory::list_active(&state.db.pool).await?;
    Ok(ApiResponse::ok(
        format!("{} products", products.len()),
        products,
    ))
}

pub async fn featured_products(State(state): State<AppState>) -> ApiResult<Vec<Product>> {
    let products = inventory::featured(&state.db.pool).await?;
    Ok(ApiResponse::ok("Featured products", products))
}

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    let categories = inventory::categories(&state.db.pool).await?;
    Ok(ApiResponse::ok("Categories", categories))
}

#[instrument(skip(state))]
pub async fn search_products(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult<Vec<Product>> {
    let products = inventory::search(&state.db.pool, &query.q).await?;
    Ok(ApiResponse::ok(
        format!("{} matches for '{}'", products.len(), query.q.trim()),
        products,
    ))
}

pub async fn products_by_category(
    State(state): State<AppState>,
    ApiPath(category): ApiPath<String>,
) -> ApiResult<Vec<Product>> {
    let products = inventory::list_by_category(&state.db.pool, &category).await?;
    Ok(ApiResponse::ok(format!("Products in {category}"), products))
}

pub async fn get_product(
    State(state): State<AppState>,
    ApiPath(product_id): ApiPath<i64>,
) -> ApiResult<Product> {
    let product = inventory::get_active(&state.db.pool, product_id).await?;
    Ok(ApiResponse::ok("Product found", product))
}

#[instrument(skip(state, product), fields(name = %product.name))]
pub async fn create_product(
    State(state): State<AppState>,
    ApiJson(product): ApiJson<NewProduct>,
) -> ApiResult<Product> {
    let product = inventory::create(&state.db.pool, &product).await?;
    info!("Created product {} ({})", product.id, product.name);
    Ok(ApiResponse::ok("Product created", product))
}

#[instrument(skip(state, product), fields(name = %product.name))]
pub async fn update_product(
    State(state): State<AppState>,
    ApiPath(product_id): ApiPath<i64>,
    ApiJson(product): ApiJson<NewProduct>,
) -> ApiResult<Product> {
    let product = inventory::update(&state.db.pool, product_id, &product).await?;
    Ok(ApiResponse::ok("Product updated", product))
}

/// Soft delete: the product leaves the storefront, past orders keep it
#[instrument(skip(state))]
pub async fn delete_product(
    State(state): State<AppState>,
    ApiPath(product_id): ApiPath<i64>,
) -> ApiResult<Product> {
    inventory::deactivate(&state.db.pool, product_id).await?;
    let product = inventory::get(&state.db.pool, product_id).await?;
    Ok(ApiResponse::ok("Product deactivated", product))
}

#[instrument(skip(state, request), fields(quantity = request.quantity))]
pub async fn restock_product(
    State(state): State<AppState>,
    ApiPath(product_id): ApiPath<i64>,
    ApiJson(request): ApiJson<RestockRequest>,
) -> ApiResult<Product> {
    let product = inventory::restock(&state.db.pool, product_id, request.quantity).await?;
    Ok(ApiResponse::ok(
        format!("Stock is now {}", product.stock_quantity),
        product,
    ))
}

// =============================================================================
// Cart
// =============================================================================

#[instrument(skip(state, request), fields(session_id = %request.session_id, product_id = request.product_id))]
pub async fn add_to_cart(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<AddToCartRequest>,
) -> ApiResult<Cart> {
    let cart = cart::add_item(
        &state.db.pool,
        &request.session_id,
        request.product_id,
        request.quantity,
    )
    .await?;
    Ok(ApiResponse::ok("Item added to cart", cart))
}

pub async fn get_cart(
    State(state): State<AppState>,
    ApiPath(session_id): ApiPath<String>,
) -> ApiResult<Cart> {
    let cart = cart::get(&state.db.pool, &session_id, state.currency()).await?;
    Ok(ApiResponse::ok("Cart", cart))
}

pub async fn cart_count(
    State(state): State<AppState>,
    ApiPath(session_id): ApiPath<String>,
) -> ApiResult<CartCount> {
    let count = cart::count(&state.db.pool, &session_id).await?;
    Ok(ApiResponse::ok("Cart count", CartCount { count }))
}

#[instrument(skip(state, request), fields(session_id = %request.session_id, item_id = request.cart_item_id))]
pub async fn update_cart_item(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UpdateCartRequest>,
) -> ApiResult<Cart> {
    let cart = cart::update_item(
        &state.db.pool,
        &request.session_id,
        request.cart_item_id,
        request.quantity,
    )
    .await?;
    Ok(ApiResponse::ok("Cart updated", cart))
}

#[instrument(skip(state, query), fields(session_id = %query.session_id))]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    ApiPath(item_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<SessionQuery>,
) -> ApiResult<Cart> {
    let cart = cart::remove_item(&state.db.pool, &query.session_id, item_id).await?;
    Ok(ApiResponse::ok("Item removed from cart", cart))
}

pub async fn clear_cart(
    State(state): State<AppState>,
    ApiPath(session_id): ApiPath<String>,
) -> ApiResult<Cart> {
    cart::clear(&state.db.pool, &session_id).await?;
    Ok(ApiResponse::ok(
        "Cart cleared",
        Cart::empty(session_id, state.currency()),
    ))
}

// =============================================================================
// Checkout
// =============================================================================

/// Open a hosted checkout for the given items or the session's cart
#[instrument(skip(state, request), fields(items = request.items.len()))]
pub async fn create_checkout(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateCheckoutRequest>,
) -> ApiResult<CreateCheckoutResponse> {
    let currency = state.currency();

    let lines = if !request.items.is_empty() {
        let items: Vec<(i64, u32)> = request
            .items
            .iter()
            .map(|i| (i.product_id, i.quantity))
            .collect();
        state.initiator.price_items(&items).await?
    } else if let Some(session_id) = request.session_id.as_deref() {
        state.initiator.lines_from_cart(session_id, currency).await?
    } else {
        return Err(ShopError::Validation(
            "No items in checkout request (provide 'items' or 'session_id')".to_string(),
        )
        .into());
    };

    let api_ref = request
        .api_ref
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let redirect_url = state.redirect_url_for(&api_ref)?;
    let contact = ContactInfo::new(
        request.first_name,
        request.last_name,
        request.email,
        request.phone,
    );

    let session = state
        .initiator
        .initiate(contact, lines, currency, &api_ref, redirect_url)
        .await
        .map_err(|e| {
            error!(
                api_ref = %api_ref,
                retryable = e.is_retryable(),
                "Failed to create checkout: {}",
                e
            );
            e
        })?;

    info!(
        "Created checkout session {} for {} ({})",
        session.session_id,
        session.api_ref,
        session.amount.display()
    );

    Ok(ApiResponse::ok(
        "Checkout created",
        CreateCheckoutResponse {
            id: session.session_id,
            url: session.checkout_url,
            api_ref: session.api_ref,
            state: session.state,
            amount: session.amount.display(),
        },
    ))
}

/// Redirect confirmation from the storefront
#[instrument(skip(state, request), fields(api_ref = %request.api_ref))]
pub async fn confirm_order(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ConfirmRequest>,
) -> ApiResult<Reconciliation> {
    let status = request
        .state
        .as_deref()
        .map(PaymentStatus::from_gateway_state)
        .unwrap_or(PaymentStatus::Pending);
    let event = PaymentEvent::new(request.api_ref, status, EventSource::Redirect)
        .with_gateway_ids(request.checkout_id, request.tracking_id);

    let result = state.reconciler.reconcile(event).await?;
    Ok(ApiResponse::ok(
        format!("Order {} is {}", result.order.order.api_ref, result.order.order.payment_status),
        result,
    ))
}

/// Register a pending order before payment completes
#[instrument(skip(state, request), fields(api_ref = %request.api_ref))]
pub async fn create_pending_order(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PendingOrderRequest>,
) -> ApiResult<Reconciliation> {
    let event = PaymentEvent::new(request.api_ref, PaymentStatus::Pending, EventSource::Manual)
        .with_gateway_ids(request.checkout_id, None);

    let result = state.reconciler.reconcile(event).await?;
    Ok(ApiResponse::ok("Pending order recorded", result))
}

/// Handle IntaSend webhook
///
/// Any failure answers non-2xx so the gateway redelivers the event.
#[instrument(skip(state, body), fields(bytes = body.len()))]
pub async fn intasend_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Reconciliation> {
    let event = state
        .initiator
        .gateway()
        .verify_webhook(&body)
        .await
        .map_err(|e| {
            warn!("Rejected webhook: {}", e);
            e
        })?;

    info!(
        "Received webhook: api_ref={}, status={}",
        event.api_ref, event.status
    );

    let result = state
        .reconciler
        .reconcile(event)
        .await
        .map_err(ApiError::Reconciliation)?;

    Ok(ApiResponse::ok("received", result))
}

// =============================================================================
// Orders
// =============================================================================

pub async fn list_orders(State(state): State<AppState>) -> ApiResult<Vec<OrderDetails>> {
    let orders = order::list_all(&state.db.pool).await?;
    Ok(ApiResponse::ok(format!("{} orders", orders.len()), orders))
}

pub async fn get_order(
    State(state): State<AppState>,
    ApiPath(order_id): ApiPath<i64>,
) -> ApiResult<OrderDetails> {
    let details = order::get(&state.db.pool, order_id).await?;
    Ok(ApiResponse::ok("Order found", details))
}

pub async fn get_order_by_ref(
    State(state): State<AppState>,
    ApiPath(api_ref): ApiPath<String>,
) -> ApiResult<OrderDetails> {
    let details = order::get_by_ref(&state.db.pool, &api_ref).await?;
    Ok(ApiResponse::ok("Order found", details))
}

pub async fn orders_by_customer(
    State(state): State<AppState>,
    ApiPath(email): ApiPath<String>,
) -> ApiResult<Vec<OrderDetails>> {
    let orders = order::list_by_customer_email(&state.db.pool, &email).await?;
    Ok(ApiResponse::ok(format!("{} orders", orders.len()), orders))
}

pub async fn orders_by_status(
    State(state): State<AppState>,
    ApiPath(status): ApiPath<String>,
) -> ApiResult<Vec<OrderDetails>> {
    let status = PaymentStatus::from_str(&status)?;
    let orders = order::list_by_status(&state.db.pool, status).await?;
    Ok(ApiResponse::ok(format!("{} {} orders", orders.len(), status), orders))
}

#[instrument(skip(state, request), fields(status = %request.status))]
pub async fn update_order_status(
    State(state): State<AppState>,
    ApiPath(order_id): ApiPath<i64>,
    ApiJson(request): ApiJson<UpdateStatusRequest>,
) -> ApiResult<Reconciliation> {
    let status = PaymentStatus::from_str(&request.status)?;
    let result = state.reconciler.update_status(order_id, status).await?;
    Ok(ApiResponse::ok(format!("Order {order_id} is {status}"), result))
}

// =============================================================================
// Landing pages
// =============================================================================

/// Checkout success page
pub async fn checkout_success(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    let api_ref = params
        .get("api_ref")
        .map(|s| html_escape(s))
        .unwrap_or_else(|| "unknown".to_string());
    Html(format!(r#"
<!DOCTYPE html>
<html>
<head><title>Payment Received</title></head>
<body style="font-family: system-ui; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: linear-gradient(135deg, #1a1a2e 0%, #16213e 100%);">
    <div style="background: white; padding: 60px; border-radius: 16px; text-align: center;">
        <div style="font-size: 60px;">✅</div>
        <h1>Thank you for your order!</h1>
        <p>Reference: <code>{}</code></p>
        <p style="color: #666;">We will confirm your order as soon as the payment clears.</p>
    </div>
</body>
</html>
"#, api_ref))
}

/// Checkout cancel page
pub async fn checkout_cancel() -> impl IntoResponse {
    Html(r#"
<!DOCTYPE html>
<html>
<head><title>Payment Cancelled</title></head>
<body style="font-family: system-ui; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: linear-gradient(135deg, #1a1a2e 0%, #16213e 100%);">
    <div style="background: white; padding: 60px; border-radius: 16px; text-align: center;">
        <div style="font-size: 60px;">❌</div>
        <h1>Payment Cancelled</h1>
        <p style="color: #666;">No charges were made. Your cart is still saved.</p>
    </div>
</body>
</html>
"#)
}

fn html_escape(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '&' => "&amp;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#39;".to_string(),
            c => c.to_string(),
        })
        .collect()
}

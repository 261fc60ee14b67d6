// crates/api-server/src/routes.rs

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use drop_engine::ProductSnapshot;
use payment_gateway::Order;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ApiError;
use crate::session::ws_handler;
use crate::state::AppState;

pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Create the HTTP + WebSocket router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let razorpay = Router::new()
        .route("/create-order", post(create_order))
        .route("/verify-payment", post(verify_payment))
        .route("/webhook", post(webhook))
        .route("/orders/:order_id", get(get_order));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/products", get(list_products))
        .route("/products/:product_id", get(get_product))
        .route("/ws/auction/:product_id", get(ws_handler))
        .nest("/razorpay", razorpay)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn root() -> Json<Value> {
    Json(json!({"status": "ok", "message": "Welcome to the Reverse Auction API"}))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "products": state.registry.len(),
        "sessions": state.registry.hub().session_count(),
        "evicted_sessions": state.registry.hub().evicted_total(),
    }))
}

#[derive(Debug, Serialize)]
struct ProductList {
    data: Vec<ProductSnapshot>,
}

async fn list_products(State(state): State<Arc<AppState>>) -> Result<Json<ProductList>, ApiError> {
    let mut data = Vec::new();
    for handle in state.registry.handles() {
        data.push(handle.snapshot().await?);
    }
    Ok(Json(ProductList { data }))
}

async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
) -> Result<Json<ProductSnapshot>, ApiError> {
    let snapshot = state.registry.get(&product_id)?.snapshot().await?;
    Ok(Json(snapshot))
}

// ── Purchase ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateOrderRequest {
    #[serde(default)]
    product_id: Option<String>,
    amount: f64,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    receipt: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateOrderResponse {
    order_id: String,
    amount: u64,
    amount_minor: u64,
    currency: String,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    if !req.amount.is_finite() || req.amount <= 0.0 {
        return Err(ApiError::BadRequest("amount must be a positive number".into()));
    }

    let product_id = req.product_id.unwrap_or_else(|| state.default_product.clone());
    let product = state.registry.get(&product_id)?;

    // Harga dikunci dari ledger, bukan dari client. Quote client harus sama.
    let current = product.snapshot().await?.current_price;
    if (req.amount - current as f64).abs() > f64::EPSILON {
        return Err(ApiError::PriceMismatch {
            current,
            quoted: req.amount,
        });
    }

    let currency = req.currency.unwrap_or_else(|| state.currency.clone());
    // Network call ke gateway: di luar actor produk
    let order = state
        .gateway
        .create_order(&product_id, current, &currency, req.receipt)
        .await?;

    Ok(Json(CreateOrderResponse {
        order_id: order.order_id,
        amount: order.amount,
        amount_minor: order.amount_minor,
        currency: order.currency,
    }))
}

#[derive(Debug, Deserialize)]
struct VerifyPaymentRequest {
    #[serde(alias = "razorpay_order_id")]
    order_id: String,
    #[serde(alias = "razorpay_payment_id")]
    payment_id: String,
    #[serde(alias = "razorpay_signature")]
    signature: String,
}

async fn verify_payment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<Value>, ApiError> {
    let order = state
        .gateway
        .verify_payment(&req.order_id, &req.payment_id, &req.signature)?;

    info!(order_id = %order.order_id, amount = order.amount, "sale confirmed");
    Ok(Json(json!({
        "status": "success",
        "message": "Payment verified and recorded.",
        "order_id": order.order_id,
        "payment_id": req.payment_id,
    })))
}

async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing X-Razorpay-Signature header".into()))?;

    state.gateway.handle_webhook(&body, signature)?;
    // Selalu 200 cepat, gateway akan retry kalau tidak
    Ok(Json(json!({"status": "ok"})))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    state
        .gateway
        .order(&order_id)
        .map(Json)
        .ok_or_else(|| payment_gateway::PaymentError::OrderNotFound(order_id).into())
}

// crates/api-server/src/state.rs

use std::sync::Arc;

use drop_engine::LedgerRegistry;
use payment_gateway::OrderGateway;

/// Shared application state.
pub struct AppState {
    pub registry: Arc<LedgerRegistry>,
    pub gateway: Arc<OrderGateway>,
    // Produk yang dipakai create-order jika request tidak menyebut product_id
    pub default_product: String,
    pub currency: String,
    pub session_queue: usize,
}

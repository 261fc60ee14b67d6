// crates/api-server/src/main.rs

mod config;
mod error;
mod protocol;
mod routes;
mod session;
mod state;

use std::sync::Arc;

use clap::Parser;
use drop_engine::wal::{self, WalHandler};
use drop_engine::{BroadcastHub, LedgerRegistry, SystemClock, TimeSource};
use payment_gateway::{MockGatewayClient, OrderGateway};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    if config.uses_dev_secrets() {
        warn!("RAZORPAY_KEY_SECRET / RAZORPAY_WEBHOOK_SECRET not set, using development secrets");
    }

    // 1. Ledger registry + hub
    let time: Arc<dyn TimeSource> = Arc::new(SystemClock);
    let mut registry = LedgerRegistry::new(BroadcastHub::new(), time.clone());

    // 2. Recovery dari journal (jika ada), lalu buka writer
    let mut restored = Vec::new();
    if let Some(path) = &config.journal {
        let entries = WalHandler::read_all(path)?;
        info!(path = %path.display(), entries = entries.len(), "replaying share journal");
        restored = wal::replay(entries);

        let (journal_tx, _writer) = wal::spawn_writer(WalHandler::new(path)?);
        registry = registry.with_journal(journal_tx);
    }
    for ledger in restored {
        registry.restore(ledger);
    }

    // 3. Provision produk default (no-op kalau sudah dipulihkan)
    let product = registry.provision(config.product_config(time.now()))?;
    let snapshot = product.snapshot().await?;
    info!(
        product_id = %snapshot.id,
        price = snapshot.current_price,
        phase = ?snapshot.phase,
        drop_time = %snapshot.drop_time,
        "drop ready"
    );

    // 4. Payment gateway
    let gateway = OrderGateway::new(Arc::new(MockGatewayClient::new()), config.gateway_config());
    info!(client = gateway.client_name(), "payment gateway configured");

    let state = Arc::new(AppState {
        registry: Arc::new(registry),
        gateway: Arc::new(gateway),
        default_product: config.product_id.clone(),
        currency: config.currency.clone(),
        session_queue: config.session_queue,
    });

    // 5. Serve HTTP + WebSocket
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!("Price drop auction listening on {}", config.listen);

    axum::serve(listener, routes::create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

// crates/api-server/src/config.rs

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;
use drop_engine::ProductConfig;
use payment_gateway::GatewayConfig;

pub const DEV_KEY_SECRET: &str = "dev_key_secret";
pub const DEV_WEBHOOK_SECRET: &str = "dev_webhook_secret";

#[derive(Parser, Debug, Clone)]
#[command(name = "Price Drop Auction Server")]
#[command(about = "Collaborative price-drop auction: share to drop the price, pay to buy", long_about = None)]
pub struct Config {
    // Alamat HTTP + WebSocket
    #[arg(long, env = "DROP_LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    // Produk default yang diprovision saat boot
    #[arg(long, env = "DROP_PRODUCT_ID", default_value = "6ca22814-c1a4-42e2-bec5-fdb388806692")]
    pub product_id: String,

    #[arg(long, env = "DROP_BASE_PRICE", default_value_t = 500)]
    pub base_price: u64,

    #[arg(long, env = "DROP_FLOOR_PRICE", default_value_t = 0)]
    pub floor_price: u64,

    #[arg(long, env = "DROP_STEP", default_value_t = 1)]
    pub step: u64,

    // RFC 3339. Jika kosong: sekarang + 60 detik
    #[arg(long, env = "DROP_START")]
    pub drop_start: Option<DateTime<Utc>>,

    #[arg(long, env = "DROP_DURATION_SECS", default_value_t = 86_400)]
    pub drop_duration_secs: i64,

    #[arg(long, env = "DROP_BRAND_URL")]
    pub brand_url: Option<String>,

    // Kapasitas antrian outbound per session sebelum di-evict
    #[arg(long, env = "DROP_SESSION_QUEUE", default_value_t = 256)]
    pub session_queue: usize,

    #[arg(long, env = "DROP_JOURNAL")]
    pub journal: Option<PathBuf>,

    #[arg(long, env = "DROP_CURRENCY", default_value = "INR")]
    pub currency: String,

    #[arg(long, env = "GATEWAY_TIMEOUT_MS", default_value_t = 5_000)]
    pub gateway_timeout_ms: u64,

    #[arg(long, env = "RAZORPAY_KEY_SECRET", default_value = DEV_KEY_SECRET, hide_env_values = true)]
    pub key_secret: String,

    #[arg(long, env = "RAZORPAY_WEBHOOK_SECRET", default_value = DEV_WEBHOOK_SECRET, hide_env_values = true)]
    pub webhook_secret: String,
}

impl Config {
    pub fn product_config(&self, now: DateTime<Utc>) -> ProductConfig {
        ProductConfig {
            id: self.product_id.clone(),
            base_price: self.base_price,
            floor_price: self.floor_price,
            step: self.step,
            drop_start: self.drop_start.unwrap_or(now + chrono::Duration::seconds(60)),
            drop_duration_secs: self.drop_duration_secs,
            brand_url: self.brand_url.clone(),
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            key_secret: self.key_secret.clone(),
            webhook_secret: self.webhook_secret.clone(),
            timeout: Duration::from_millis(self.gateway_timeout_ms),
        }
    }

    pub fn uses_dev_secrets(&self) -> bool {
        self.key_secret == DEV_KEY_SECRET || self.webhook_secret == DEV_WEBHOOK_SECRET
    }
}

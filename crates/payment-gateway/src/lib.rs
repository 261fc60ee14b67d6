// crates/payment-gateway/src/lib.rs

pub mod client;
pub mod error;
pub mod gateway;
pub mod order;
pub mod signature;

pub use client::{GatewayClient, MockGatewayClient, RemoteOrder, RemoteOrderRequest};
pub use error::PaymentError;
pub use gateway::{GatewayConfig, OrderGateway, WebhookOutcome};
pub use order::{Order, OrderStatus, Sale};

/// Gateway menerima amount dalam minor unit (paise untuk INR).
pub const MINOR_UNITS_PER_MAJOR: u64 = 100;

// crates/payment-gateway/src/client.rs

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::PaymentError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOrderRequest {
    pub amount_minor: u64,
    pub currency: String,
    pub receipt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOrder {
    pub id: String,
    pub amount_minor: u64,
    pub currency: String,
}

/// Batas ke hosted payment gateway. Satu-satunya operasi yang memakai
/// jaringan sungguhan; selalu dipanggil di luar jalur serialisasi harga.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_order(&self, request: RemoteOrderRequest) -> Result<RemoteOrder, PaymentError>;
}

/// Client tiruan: meniru bentuk order id Razorpay tanpa network call.
/// Suffix 64-bit acak.
#[derive(Debug, Clone, Default)]
pub struct MockGatewayClient {
    latency: Duration,
}

impl MockGatewayClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl GatewayClient for MockGatewayClient {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_order(&self, request: RemoteOrderRequest) -> Result<RemoteOrder, PaymentError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        // `rng` tidak boleh menyeberang .await, jadi dibuat setelah sleep
        let suffix: u64 = rand::rng().random();
        Ok(RemoteOrder {
            id: format!("order_mock_{suffix:016x}"),
            amount_minor: request.amount_minor,
            currency: request.currency,
        })
    }
}

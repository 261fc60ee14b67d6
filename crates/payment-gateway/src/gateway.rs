// crates/payment-gateway/src/gateway.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::client::{GatewayClient, RemoteOrderRequest};
use crate::order::{Order, OrderStatus, Sale};
use crate::signature;
use crate::{PaymentError, MINOR_UNITS_PER_MAJOR};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub key_secret: String,
    pub webhook_secret: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Captured { order_id: String, payment_id: String },
    Failed { order_id: String },
    Ignored { event: String },
}

// Struktur minimal payload webhook yang kita butuhkan
#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(default)]
    event: String,
    #[serde(default)]
    payload: Option<WebhookPayload>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    payment: Option<WebhookEntity<PaymentEntity>>,
}

#[derive(Debug, Deserialize)]
struct WebhookEntity<T> {
    entity: T,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: String,
}

/// Membuat order di payment gateway dan memverifikasi signature pembayaran.
///
/// Lock internal tidak pernah ditahan melewati `.await`, dan gateway ini
/// tidak pernah menyentuh actor produk.
pub struct OrderGateway {
    client: Arc<dyn GatewayClient>,
    config: GatewayConfig,
    orders: Mutex<HashMap<String, Order>>,
    sales: Mutex<Vec<Sale>>,
    receipts: AtomicU64,
}

impl OrderGateway {
    pub fn new(client: Arc<dyn GatewayClient>, config: GatewayConfig) -> Self {
        Self {
            client,
            config,
            orders: Mutex::new(HashMap::new()),
            sales: Mutex::new(Vec::new()),
            receipts: AtomicU64::new(0),
        }
    }

    pub fn client_name(&self) -> &'static str {
        self.client.name()
    }

    /// `amount` harus snapshot harga ledger saat ini; nilainya dikunci di order.
    pub async fn create_order(
        &self,
        product_id: &str,
        amount: u64,
        currency: &str,
        receipt: Option<String>,
    ) -> Result<Order, PaymentError> {
        if amount == 0 {
            return Err(PaymentError::InvalidAmount("amount must be positive".into()));
        }
        let amount_minor = amount
            .checked_mul(MINOR_UNITS_PER_MAJOR)
            .ok_or_else(|| PaymentError::InvalidAmount(format!("{amount} is too large")))?;

        // 1. Catat order lokal (CREATED) sebelum memanggil gateway
        let seq = self.receipts.fetch_add(1, Ordering::Relaxed) + 1;
        let pending_key = format!("pending_{seq}");
        let receipt = receipt.unwrap_or_else(|| format!("rcpt_{seq}"));
        let pending = Order {
            order_id: pending_key.clone(),
            receipt: receipt.clone(),
            product_id: product_id.to_string(),
            amount,
            amount_minor,
            currency: currency.to_string(),
            status: OrderStatus::Created,
            payment_id: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.orders.lock().insert(pending_key.clone(), pending);

        // 2. Panggil gateway dengan batas waktu
        let request = RemoteOrderRequest {
            amount_minor,
            currency: currency.to_string(),
            receipt,
        };
        let result = tokio::time::timeout(self.config.timeout, self.client.create_order(request)).await;

        // 3. Finalisasi record lokal
        let mut orders = self.orders.lock();
        match result {
            Ok(Ok(remote)) => {
                // Id gateway tidak boleh menimpa order yang sudah ada
                if orders.contains_key(&remote.id) {
                    if let Some(order) = orders.get_mut(&pending_key) {
                        order.mark_failed(Utc::now());
                    }
                    warn!(receipt = %pending_key, order_id = %remote.id, "gateway returned a duplicate order id");
                    return Err(PaymentError::Gateway(format!("duplicate order id {}", remote.id)));
                }
                let mut order = orders
                    .remove(&pending_key)
                    .ok_or_else(|| PaymentError::OrderNotFound(pending_key.clone()))?;
                order.order_id = remote.id;
                orders.insert(order.order_id.clone(), order.clone());
                info!(order_id = %order.order_id, product_id, amount, currency, "order created");
                Ok(order)
            }
            Ok(Err(e)) => {
                if let Some(order) = orders.get_mut(&pending_key) {
                    order.mark_failed(Utc::now());
                }
                warn!(receipt = %pending_key, error = %e, "gateway rejected order");
                Err(e)
            }
            Err(_) => {
                if let Some(order) = orders.get_mut(&pending_key) {
                    order.mark_failed(Utc::now());
                }
                warn!(receipt = %pending_key, timeout_ms = self.config.timeout.as_millis() as u64, "gateway timed out");
                Err(PaymentError::GatewayTimeout)
            }
        }
    }

    /// Satu-satunya otoritas untuk mengonfirmasi penjualan.
    pub fn verify_payment(&self, order_id: &str, payment_id: &str, signature_hex: &str) -> Result<Order, PaymentError> {
        let now = Utc::now();
        let (verified, sale) = {
            let mut orders = self.orders.lock();
            let order = orders
                .get_mut(order_id)
                .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_string()))?;

            if !signature::verify_payment(&self.config.key_secret, order_id, payment_id, signature_hex) {
                warn!(order_id, payment_id, "payment signature mismatch");
                return Err(PaymentError::SignatureMismatch);
            }

            order.mark_verified(payment_id, now)?;
            (order.clone(), Sale::from_order(order, payment_id, now))
        };

        info!(order_id, payment_id, amount = sale.amount, "payment verified, sale recorded");
        self.sales.lock().push(sale);
        Ok(verified)
    }

    /// Webhook dari gateway: signature HMAC atas raw body dengan webhook secret.
    pub fn handle_webhook(&self, body: &[u8], signature_hex: &str) -> Result<WebhookOutcome, PaymentError> {
        if !signature::verify(&self.config.webhook_secret, body, signature_hex) {
            warn!("webhook signature mismatch");
            return Err(PaymentError::SignatureMismatch);
        }

        let event: WebhookEvent =
            serde_json::from_slice(body).map_err(|e| PaymentError::InvalidWebhook(e.to_string()))?;

        let payment = || {
            event
                .payload
                .as_ref()
                .and_then(|p| p.payment.as_ref())
                .map(|p| &p.entity)
                .ok_or_else(|| PaymentError::InvalidWebhook(format!("{} without payment entity", event.event)))
        };

        match event.event.as_str() {
            "payment.captured" => {
                let payment = payment()?;
                let now = Utc::now();
                let sale = match self.orders.lock().get_mut(&payment.order_id) {
                    Some(order) if order.status == OrderStatus::Created => {
                        order.mark_verified(&payment.id, now)?;
                        Some(Sale::from_order(order, &payment.id, now))
                    }
                    Some(_) => {
                        info!(order_id = %payment.order_id, "payment.captured for finalized order, ignoring");
                        None
                    }
                    None => {
                        warn!(order_id = %payment.order_id, "payment.captured for unknown order");
                        None
                    }
                };
                if let Some(sale) = sale {
                    info!(order_id = %payment.order_id, payment_id = %payment.id, "payment.captured");
                    self.sales.lock().push(sale);
                }
                Ok(WebhookOutcome::Captured {
                    order_id: payment.order_id.clone(),
                    payment_id: payment.id.clone(),
                })
            }
            "payment.failed" => {
                let payment = payment()?;
                match self.orders.lock().get_mut(&payment.order_id) {
                    Some(order) => {
                        if order.mark_failed(Utc::now()) {
                            info!(order_id = %payment.order_id, "payment.failed");
                        }
                    }
                    None => warn!(order_id = %payment.order_id, "payment.failed for unknown order"),
                }
                Ok(WebhookOutcome::Failed {
                    order_id: payment.order_id.clone(),
                })
            }
            other => {
                info!(event = other, "webhook event acknowledged");
                Ok(WebhookOutcome::Ignored { event: other.to_string() })
            }
        }
    }

    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.orders.lock().get(order_id).cloned()
    }

    pub fn sales(&self) -> Vec<Sale> {
        self.sales.lock().clone()
    }
}

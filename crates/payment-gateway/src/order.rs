// crates/payment-gateway/src/order.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PaymentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Verified,
    Failed,
}

/// Satu order per intent pembelian.
///
/// `amount` adalah snapshot harga ledger saat order dibuat dan tidak pernah
/// dihitung ulang. Status hanya bisa berpindah sekali: CREATED -> VERIFIED
/// atau CREATED -> FAILED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub order_id: String,
    pub receipt: String,
    pub product_id: String,
    pub amount: u64,
    pub amount_minor: u64,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn mark_verified(&mut self, payment_id: &str, now: DateTime<Utc>) -> Result<(), PaymentError> {
        match self.status {
            OrderStatus::Created => {
                self.status = OrderStatus::Verified;
                self.payment_id = Some(payment_id.to_string());
                self.updated_at = Some(now);
                Ok(())
            }
            OrderStatus::Verified => Err(PaymentError::AlreadyVerified(self.order_id.clone())),
            OrderStatus::Failed => Err(PaymentError::OrderFailed(self.order_id.clone())),
        }
    }

    /// Return false jika order sudah final (tidak pernah revert).
    pub fn mark_failed(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != OrderStatus::Created {
            return false;
        }
        self.status = OrderStatus::Failed;
        self.updated_at = Some(now);
        true
    }
}

/// Penjualan yang sudah terkonfirmasi lewat verifikasi signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sale {
    pub order_id: String,
    pub payment_id: String,
    pub product_id: String,
    pub amount: u64,
    pub currency: String,
    pub recorded_at: DateTime<Utc>,
}

impl Sale {
    pub fn from_order(order: &Order, payment_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            order_id: order.order_id.clone(),
            payment_id: payment_id.to_string(),
            product_id: order.product_id.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            recorded_at: now,
        }
    }
}

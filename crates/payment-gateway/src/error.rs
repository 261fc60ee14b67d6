// crates/payment-gateway/src/error.rs

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Invalid payment signature.")]
    SignatureMismatch,
    #[error("Order {0} not found")]
    OrderNotFound(String),
    #[error("Order {0} is already verified")]
    AlreadyVerified(String),
    #[error("Order {0} has failed and cannot be verified")]
    OrderFailed(String),
    #[error("Payment gateway timed out, please retry")]
    GatewayTimeout,
    #[error("Razorpay error: {0}")]
    Gateway(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid webhook: {0}")]
    InvalidWebhook(String),
    #[error("Invalid signing key")]
    InvalidKey,
}

impl PaymentError {
    /// Hanya kegagalan dependency eksternal yang boleh di-retry oleh client.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::GatewayTimeout | PaymentError::Gateway(_))
    }
}

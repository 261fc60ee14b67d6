// crates/api-server/src/error.rs

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use drop_engine::{DropError, Price};
use payment_gateway::PaymentError;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Drop(#[from] DropError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error("Price has changed from {quoted} to {current}, please retry with the current price")]
    PriceMismatch { current: Price, quoted: f64 },
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Drop(DropError::UnknownProduct(_)) => StatusCode::NOT_FOUND,
            ApiError::Drop(DropError::EngineDown | DropError::Journal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Drop(_) => StatusCode::BAD_REQUEST,
            ApiError::Payment(PaymentError::OrderNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Payment(PaymentError::AlreadyVerified(_) | PaymentError::OrderFailed(_)) => StatusCode::CONFLICT,
            ApiError::Payment(PaymentError::GatewayTimeout) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Payment(PaymentError::Gateway(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Payment(_) => StatusCode::BAD_REQUEST,
            ApiError::PriceMismatch { .. } | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

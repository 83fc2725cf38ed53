//! Webhook error type and its HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::models::signal::SignalError;
use crate::services::exchange::ExchangeError;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid passphrase")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Signal(#[from] SignalError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::Unauthorized => StatusCode::FORBIDDEN,
            WebhookError::BadRequest(_) | WebhookError::Signal(_) => StatusCode::BAD_REQUEST,
            WebhookError::Exchange(ExchangeError::InvalidOrder(_)) => StatusCode::BAD_REQUEST,
            WebhookError::Exchange(ExchangeError::Signing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            WebhookError::Exchange(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Label used for the `webhook_signals_total` metric
    pub fn outcome(&self) -> &'static str {
        match self.status_code() {
            StatusCode::FORBIDDEN => "unauthorized",
            StatusCode::BAD_REQUEST => "invalid",
            _ => "failed",
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({
            "status": "error",
            "error": self.to_string(),
        });
        if let WebhookError::Exchange(ExchangeError::Rejected {
            body: exchange_body,
            ..
        }) = &self
        {
            body["exchange_response"] = exchange_body.clone();
        }
        (status, Json(body)).into_response()
    }
}

//! Exchange provider interface shared by the BitMart and CoinEx clients.

use std::fmt;
use std::str::FromStr;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::models::signal::{Direction, OrderType};
use crate::services::signing::SigningError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Bitmart,
    Coinex,
}

impl ExchangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExchangeKind::Bitmart => "bitmart",
            ExchangeKind::Coinex => "coinex",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bitmart" => Ok(ExchangeKind::Bitmart),
            "coinex" => Ok(ExchangeKind::Coinex),
            other => Err(format!(
                "unsupported exchange '{}', expected 'bitmart' or 'coinex'",
                other
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("request to exchange failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("exchange rejected request (http {status}, code {code:?}): {message}")]
    Rejected {
        status: u16,
        code: Option<i64>,
        message: String,
        body: Value,
    },
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),
    #[error("could not decode exchange response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub order_type: OrderType,
    pub size: String,
    pub price: Option<String>,
    pub leverage: u32,
}

/// Position-level stop-loss or take-profit trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectiveOrder {
    pub symbol: String,
    pub direction: Direction,
    pub trigger_price: String,
    pub size: Option<String>,
}

/// Capabilities every supported exchange exposes to the executor.
///
/// Successful calls return the exchange's payload untouched so it can be
/// echoed back to the webhook caller.
#[async_trait::async_trait]
pub trait ExchangeProvider: Send + Sync {
    fn kind(&self) -> ExchangeKind;

    /// Signature for a request whose exact body string is `body`
    fn sign(
        &self,
        method: &str,
        path: &str,
        body: &str,
        timestamp_ms: i64,
    ) -> Result<String, ExchangeError>;

    /// Provider-specific checks that must pass before any outbound call
    fn validate_order(&self, order: &OrderRequest) -> Result<(), ExchangeError>;

    /// Checks on an explicit close size; `None` means the whole position
    fn validate_close(&self, _size: Option<&str>) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<Value, ExchangeError>;

    async fn cancel_open_orders(&self, symbol: &str) -> Result<Value, ExchangeError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<Value, ExchangeError>;

    /// Close the `direction` position; `size` of `None` closes all of it
    async fn close_position(
        &self,
        symbol: &str,
        direction: Direction,
        size: Option<&str>,
    ) -> Result<Value, ExchangeError>;

    async fn set_stop_loss(&self, order: &ProtectiveOrder) -> Result<Value, ExchangeError>;

    async fn set_take_profit(&self, order: &ProtectiveOrder) -> Result<Value, ExchangeError>;
}

/// Validate an exchange response envelope, passing the body through on success.
///
/// Both exchanges answer `{"code": .., "message": .., "data": ..}`; anything
/// other than a 2xx status with `code == success_code` is a rejection.
pub fn check_envelope(
    status: StatusCode,
    body: Value,
    success_code: i64,
) -> Result<Value, ExchangeError> {
    let code = body.get("code").and_then(Value::as_i64);
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if !status.is_success() || code != Some(success_code) {
        return Err(ExchangeError::Rejected {
            status: status.as_u16(),
            code,
            message: if message.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                message
            },
            body,
        });
    }

    Ok(body)
}

/// Read a response body as JSON, keeping non-JSON error pages as text
pub async fn read_json(response: reqwest::Response) -> Result<(StatusCode, Value), ExchangeError> {
    let status = response.status();
    let text = response.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => Ok((status, value)),
        Err(_) if !status.is_success() => Err(ExchangeError::Rejected {
            status: status.as_u16(),
            code: None,
            message: text.chars().take(200).collect(),
            body: Value::String(text),
        }),
        Err(e) => Err(ExchangeError::Decode(e.to_string())),
    }
}

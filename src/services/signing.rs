//! HMAC-SHA256 request signing for the supported exchanges
//!
//! Each exchange concatenates the request parts differently before hashing:
//! - BitMart: `timestamp#memo#body`
//! - CoinEx: `METHOD + path + body + timestamp`
//!
//! The body passed in must be the exact string that goes on the wire.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
#[error("invalid HMAC key")]
pub struct SigningError;

/// Lowercase hex HMAC-SHA256 of `message` keyed with `secret`
pub fn hmac_sha256_hex(secret: &str, message: &str) -> Result<String, SigningError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SigningError)?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn bitmart_signature(
    secret: &str,
    timestamp_ms: i64,
    memo: &str,
    body: &str,
) -> Result<String, SigningError> {
    hmac_sha256_hex(secret, &format!("{}#{}#{}", timestamp_ms, memo, body))
}

pub fn coinex_signature(
    secret: &str,
    method: &str,
    path: &str,
    body: &str,
    timestamp_ms: i64,
) -> Result<String, SigningError> {
    let prepared = format!(
        "{}{}{}{}",
        method.to_ascii_uppercase(),
        path,
        body,
        timestamp_ms
    );
    hmac_sha256_hex(secret, &prepared)
}

pub fn timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

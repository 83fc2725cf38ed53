//! Outbound integrations: exchange providers, request signing, notifications

pub mod bitmart;
pub mod coinex;
pub mod exchange;
pub mod signing;
pub mod telegram;

use std::sync::Arc;

use crate::config::ExchangeConfig;
use bitmart::BitmartProvider;
use coinex::CoinexProvider;
use exchange::{ExchangeError, ExchangeProvider};

/// Build the provider selected by configuration
pub fn build_provider(
    config: &ExchangeConfig,
) -> Result<Arc<dyn ExchangeProvider>, ExchangeError> {
    let provider: Arc<dyn ExchangeProvider> = match config {
        ExchangeConfig::Bitmart(c) => Arc::new(BitmartProvider::new(c.clone())?),
        ExchangeConfig::Coinex(c) => Arc::new(CoinexProvider::new(c.clone())?),
    };
    Ok(provider)
}

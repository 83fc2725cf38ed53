//! Environment-driven configuration
//!
//! Every setting comes from an environment variable (a `.env` file is loaded by
//! the binary before this runs). `Config::from_lookup` takes the lookup as a
//! closure so tests can feed a plain map instead of mutating the process env.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::services::bitmart::{BitmartConfig, DEFAULT_BITMART_URL};
use crate::services::coinex::{CoinexConfig, DEFAULT_COINEX_URL};
use crate::services::exchange::ExchangeKind;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_LEVERAGE: u32 = 5;
pub const DEFAULT_COOLDOWN_SECONDS: u64 = 10;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_KEEPALIVE_SECONDS: u64 = 600;
pub const MAX_LEVERAGE: u32 = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Deployment environment name, lower-cased (`production`, `sandbox`, ...)
pub fn get_environment() -> String {
    std::env::var("APP_ENV")
        .or_else(|_| std::env::var("ENVIRONMENT"))
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_else(|_| "sandbox".to_string())
}

#[derive(Clone)]
pub enum ExchangeConfig {
    Bitmart(BitmartConfig),
    Coinex(CoinexConfig),
}

impl ExchangeConfig {
    pub fn kind(&self) -> ExchangeKind {
        match self {
            ExchangeConfig::Bitmart(_) => ExchangeKind::Bitmart,
            ExchangeConfig::Coinex(_) => ExchangeKind::Coinex,
        }
    }
}

impl fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeConfig::Bitmart(c) => f
                .debug_struct("Bitmart")
                .field("base_url", &c.base_url)
                .field("open_type", &c.open_type)
                .finish_non_exhaustive(),
            ExchangeConfig::Coinex(c) => f
                .debug_struct("Coinex")
                .field("base_url", &c.base_url)
                .field("margin_mode", &c.margin_mode)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
    pub api_url: Option<String>,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"***")
            .field("chat_id", &self.chat_id)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct KeepAliveConfig {
    pub url: String,
    pub interval: Duration,
}

#[derive(Clone)]
pub struct Config {
    pub environment: String,
    pub port: u16,
    pub webhook_passphrase: String,
    pub exchange: ExchangeConfig,
    pub default_leverage: u32,
    pub cooldown: Duration,
    pub cancel_open_orders: bool,
    pub close_opposite: bool,
    pub adjust_leverage: bool,
    pub telegram: Option<TelegramConfig>,
    pub keepalive: Option<KeepAliveConfig>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("port", &self.port)
            .field("webhook_passphrase", &"***")
            .field("exchange", &self.exchange)
            .field("default_leverage", &self.default_leverage)
            .field("cooldown", &self.cooldown)
            .field("cancel_open_orders", &self.cancel_open_orders)
            .field("close_opposite", &self.close_opposite)
            .field("adjust_leverage", &self.adjust_leverage)
            .field("telegram", &self.telegram)
            .field("keepalive", &self.keepalive)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let environment = env
            .get("APP_ENV")
            .or_else(|| env.get("ENVIRONMENT"))
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| "sandbox".to_string());

        let webhook_passphrase = env.require("WEBHOOK_PASSPHRASE")?;
        let timeout = Duration::from_secs(
            env.parse("EXCHANGE_TIMEOUT_SECONDS", DEFAULT_TIMEOUT_SECONDS)?
                .max(1),
        );

        let kind = match env.get("EXCHANGE") {
            Some(value) => value.parse::<ExchangeKind>().map_err(|reason| ConfigError::Invalid {
                key: "EXCHANGE",
                reason,
            })?,
            None => ExchangeKind::Bitmart,
        };

        let exchange = match kind {
            ExchangeKind::Bitmart => ExchangeConfig::Bitmart(BitmartConfig {
                base_url: env
                    .get("BITMART_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_BITMART_URL.to_string()),
                api_key: env.require("BITMART_API_KEY")?,
                secret_key: env.require("BITMART_SECRET_KEY")?,
                memo: env.require("BITMART_MEMO")?,
                open_type: env.margin_mode("BITMART_OPEN_TYPE")?,
                timeout,
            }),
            ExchangeKind::Coinex => ExchangeConfig::Coinex(CoinexConfig {
                base_url: env
                    .get("COINEX_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_COINEX_URL.to_string()),
                api_key: env
                    .get("COINEX_API_KEY")
                    .or_else(|| env.get("COINEX_ACCESS_ID"))
                    .ok_or(ConfigError::Missing("COINEX_API_KEY"))?,
                secret_key: env.require("COINEX_SECRET_KEY")?,
                margin_mode: env.margin_mode("COINEX_MARGIN_MODE")?,
                timeout,
            }),
        };

        let default_leverage: u32 = env.parse("DEFAULT_LEVERAGE", DEFAULT_LEVERAGE)?;
        if default_leverage == 0 || default_leverage > MAX_LEVERAGE {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_LEVERAGE",
                reason: format!("must be between 1 and {}", MAX_LEVERAGE),
            });
        }

        let telegram = match (env.get("TELEGRAM_BOT_TOKEN"), env.get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig {
                bot_token,
                chat_id: chat_id.parse().map_err(|_| ConfigError::Invalid {
                    key: "TELEGRAM_CHAT_ID",
                    reason: "must be a number".to_string(),
                })?,
                api_url: env.get("TELEGRAM_API_URL"),
            }),
            _ => None,
        };

        let keepalive_interval: u64 =
            env.parse("KEEPALIVE_INTERVAL_SECONDS", DEFAULT_KEEPALIVE_SECONDS)?;
        let keepalive = env
            .get("KEEPALIVE_URL")
            .or_else(|| env.get("RENDER_EXTERNAL_URL"))
            .filter(|_| keepalive_interval > 0)
            .map(|url| KeepAliveConfig {
                url,
                interval: Duration::from_secs(keepalive_interval),
            });

        Ok(Self {
            environment,
            port: env.parse("PORT", DEFAULT_PORT)?,
            webhook_passphrase,
            exchange,
            default_leverage,
            cooldown: Duration::from_secs(
                env.parse("SIGNAL_COOLDOWN_SECONDS", DEFAULT_COOLDOWN_SECONDS)?,
            ),
            cancel_open_orders: env.flag("CANCEL_OPEN_ORDERS", false)?,
            close_opposite: env.flag("CLOSE_OPPOSITE_POSITION", false)?,
            adjust_leverage: env.flag("ADJUST_LEVERAGE", true)?,
            telegram,
            keepalive,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key).map(|v| v.to_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(ConfigError::Invalid {
                    key,
                    reason: format!("expected a boolean, got '{}'", other),
                }),
            },
        }
    }

    fn margin_mode(&self, key: &'static str) -> Result<String, ConfigError> {
        match self.get(key).map(|v| v.to_lowercase()) {
            None => Ok("cross".to_string()),
            Some(v) if v == "cross" || v == "isolated" => Ok(v),
            Some(other) => Err(ConfigError::Invalid {
                key,
                reason: format!("expected 'cross' or 'isolated', got '{}'", other),
            }),
        }
    }
}

//! Inbound webhook signal and its validated form

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::config::MAX_LEVERAGE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("invalid signal: {0}")]
    InvalidAction(String),
    #[error("invalid order type: {0}")]
    InvalidOrderType(String),
    #[error("invalid {field}: '{value}'")]
    InvalidNumber { field: &'static str, value: String },
}

/// Raw alert payload as posted by the charting service.
///
/// Field names vary between alert templates, so the common spellings are
/// accepted as aliases. Numeric fields may arrive as JSON numbers or strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Signal {
    #[serde(default, deserialize_with = "scalar")]
    pub passphrase: Option<String>,
    #[serde(default, alias = "market", alias = "ticker", deserialize_with = "scalar")]
    pub symbol: Option<String>,
    #[serde(default, alias = "side", alias = "action", deserialize_with = "scalar")]
    pub signal: Option<String>,
    #[serde(default, rename = "type", alias = "order_type", deserialize_with = "scalar")]
    pub order_type: Option<String>,
    #[serde(
        default,
        alias = "amount",
        alias = "qty",
        alias = "quantity",
        deserialize_with = "scalar"
    )]
    pub size: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    pub price: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    pub leverage: Option<String>,
    #[serde(default, alias = "sl", deserialize_with = "scalar")]
    pub stop_loss: Option<String>,
    #[serde(
        default,
        alias = "take_profit_1",
        alias = "tp",
        deserialize_with = "scalar"
    )]
    pub take_profit: Option<String>,
}

fn scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeAction {
    Open(Direction),
    Close(Direction),
}

impl TradeAction {
    /// Map a direction token from the alert onto an action
    pub fn parse(token: &str) -> Result<Self, SignalError> {
        let action = match token.trim().to_ascii_lowercase().as_str() {
            "buy" | "buy_long" | "long" => TradeAction::Open(Direction::Long),
            "sell" | "sell_short" | "short" => TradeAction::Open(Direction::Short),
            "close_long" | "exit_long" => TradeAction::Close(Direction::Long),
            "close_short" | "exit_short" => TradeAction::Close(Direction::Short),
            _ => return Err(SignalError::InvalidAction(token.to_string())),
        };
        Ok(action)
    }

    pub fn direction(self) -> Direction {
        match self {
            TradeAction::Open(d) | TradeAction::Close(d) => d,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Open(d) => write!(f, "open_{}", d),
            TradeAction::Close(d) => write!(f, "close_{}", d),
        }
    }
}

impl Serialize for TradeAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn parse(raw: &str) -> Result<Self, SignalError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            _ => Err(SignalError::InvalidOrderType(raw.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signal that passed validation. Quantities and prices keep the caller's
/// decimal text so nothing is lost to float formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeIntent {
    pub symbol: String,
    pub action: TradeAction,
    pub order_type: OrderType,
    pub size: Option<String>,
    pub price: Option<String>,
    pub leverage: Option<u32>,
    pub stop_loss: Option<String>,
    pub take_profit: Option<String>,
}

impl TradeIntent {
    /// Key under which structurally identical signals collide
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.symbol,
            self.action,
            self.order_type,
            self.size.as_deref().unwrap_or(""),
            self.price.as_deref().unwrap_or(""),
            self.stop_loss.as_deref().unwrap_or(""),
            self.take_profit.as_deref().unwrap_or(""),
        )
    }
}

impl Signal {
    pub fn into_intent(self) -> Result<TradeIntent, SignalError> {
        let symbol = non_empty(self.symbol)
            .map(|s| s.to_uppercase())
            .ok_or(SignalError::MissingField("symbol"))?;
        let token = non_empty(self.signal).ok_or(SignalError::MissingField("signal"))?;
        let action = TradeAction::parse(&token)?;

        let order_type = match non_empty(self.order_type) {
            Some(raw) => OrderType::parse(&raw)?,
            None => OrderType::Market,
        };

        let size = optional_decimal("size", self.size)?;
        let price = optional_decimal("price", self.price)?;

        if let TradeAction::Open(_) = action {
            if size.is_none() {
                return Err(SignalError::MissingField("size"));
            }
            if order_type == OrderType::Limit && price.is_none() {
                return Err(SignalError::MissingField("price"));
            }
        }

        let leverage = match non_empty(self.leverage) {
            Some(raw) => Some(parse_leverage(&raw)?),
            None => None,
        };

        Ok(TradeIntent {
            symbol,
            action,
            order_type,
            size,
            price,
            leverage,
            stop_loss: optional_decimal("stop_loss", self.stop_loss)?,
            take_profit: optional_decimal("take_profit", self.take_profit)?,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn optional_decimal(
    field: &'static str,
    value: Option<String>,
) -> Result<Option<String>, SignalError> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => Ok(Some(raw)),
            _ => Err(SignalError::InvalidNumber { field, value: raw }),
        },
    }
}

fn parse_leverage(raw: &str) -> Result<u32, SignalError> {
    let digits = raw.trim_end_matches(['x', 'X']);
    match digits.parse::<u32>() {
        Ok(v) if (1..=MAX_LEVERAGE).contains(&v) => Ok(v),
        _ => Err(SignalError::InvalidNumber {
            field: "leverage",
            value: raw.to_string(),
        }),
    }
}

//! CoinEx futures (API v2) provider

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::models::signal::{Direction, OrderType};
use crate::services::exchange::{
    check_envelope, read_json, ExchangeError, ExchangeKind, ExchangeProvider, OrderRequest,
    ProtectiveOrder,
};
use crate::services::signing::{coinex_signature, timestamp_ms};

pub const DEFAULT_COINEX_URL: &str = "https://api.coinex.com";

const SUCCESS_CODE: i64 = 0;
const MARKET_TYPE: &str = "FUTURES";
const TRIGGER_PRICE_TYPE: &str = "latest_price";

const ORDER_PATH: &str = "/v2/futures/order";
const LEVERAGE_PATH: &str = "/v2/futures/adjust-position-leverage";
const CANCEL_ALL_PATH: &str = "/v2/futures/cancel-all-order";
const CLOSE_POSITION_PATH: &str = "/v2/futures/close-position";
const PENDING_POSITION_PATH: &str = "/v2/futures/pending-position";
const STOP_LOSS_PATH: &str = "/v2/futures/set-position-stop-loss";
const TAKE_PROFIT_PATH: &str = "/v2/futures/set-position-take-profit";

#[derive(Clone)]
pub struct CoinexConfig {
    pub base_url: String,
    pub api_key: String,
    pub secret_key: String,
    /// `cross` or `isolated`
    pub margin_mode: String,
    pub timeout: Duration,
}

pub fn side(direction: Direction) -> &'static str {
    match direction {
        Direction::Long => "buy",
        Direction::Short => "sell",
    }
}

pub struct CoinexProvider {
    client: Client,
    config: CoinexConfig,
}

impl CoinexProvider {
    pub fn new(config: CoinexConfig) -> Result<Self, ExchangeError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ExchangeError> {
        let body = body.to_string();
        let timestamp = timestamp_ms();
        let signature = self.sign("POST", path, &body, timestamp)?;

        debug!(path = path, body = %body, "CoinEx: POST");

        let response = self
            .client
            .post(format!(
                "{}{}",
                self.config.base_url.trim_end_matches('/'),
                path
            ))
            .header("X-COINEX-KEY", &self.config.api_key)
            .header("X-COINEX-SIGN", signature)
            .header("X-COINEX-TIMESTAMP", timestamp.to_string())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let (status, value) = read_json(response).await?;
        check_envelope(status, value, SUCCESS_CODE)
    }

    /// Signed GET; the query string is part of the signed path
    async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, ExchangeError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        let request_path = format!("{}?{}", path, query);
        let timestamp = timestamp_ms();
        let signature = self.sign("GET", &request_path, "", timestamp)?;

        debug!(path = %request_path, "CoinEx: GET");

        let response = self
            .client
            .get(format!(
                "{}{}",
                self.config.base_url.trim_end_matches('/'),
                request_path
            ))
            .header("X-COINEX-KEY", &self.config.api_key)
            .header("X-COINEX-SIGN", signature)
            .header("X-COINEX-TIMESTAMP", timestamp.to_string())
            .send()
            .await?;

        let (status, value) = read_json(response).await?;
        check_envelope(status, value, SUCCESS_CODE)
    }

    /// Fail unless the market's open position is on `direction`.
    ///
    /// Futures accounts run in one-way mode, so a market holds at most one
    /// position and `close-position` closes it whatever its side.
    async fn ensure_open_position(
        &self,
        symbol: &str,
        direction: Direction,
    ) -> Result<(), ExchangeError> {
        let response = self
            .get(
                PENDING_POSITION_PATH,
                &[("market", symbol), ("market_type", MARKET_TYPE)],
            )
            .await?;
        let wanted = direction.to_string();

        let open = response
            .get("data")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|p| p.get("side").and_then(Value::as_str) == Some(wanted.as_str()))
            .filter_map(|p| p.get("open_interest").and_then(quantity))
            .any(|amount| amount > 0.0);

        if open {
            Ok(())
        } else {
            Err(ExchangeError::InvalidOrder(format!(
                "no open {} position for {}",
                direction, symbol
            )))
        }
    }
}

fn quantity(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

#[async_trait::async_trait]
impl ExchangeProvider for CoinexProvider {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Coinex
    }

    fn sign(
        &self,
        method: &str,
        path: &str,
        body: &str,
        timestamp_ms: i64,
    ) -> Result<String, ExchangeError> {
        Ok(coinex_signature(
            &self.config.secret_key,
            method,
            path,
            body,
            timestamp_ms,
        )?)
    }

    fn validate_order(&self, order: &OrderRequest) -> Result<(), ExchangeError> {
        if order.order_type == OrderType::Limit && order.price.is_none() {
            return Err(ExchangeError::InvalidOrder(
                "limit orders need a price".to_string(),
            ));
        }
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<Value, ExchangeError> {
        info!(market = %symbol, leverage = leverage, "CoinEx: adjusting leverage");
        self.post(
            LEVERAGE_PATH,
            &json!({
                "market": symbol,
                "market_type": MARKET_TYPE,
                "margin_mode": self.config.margin_mode,
                "leverage": leverage,
            }),
        )
        .await
    }

    async fn cancel_open_orders(&self, symbol: &str) -> Result<Value, ExchangeError> {
        info!(market = %symbol, "CoinEx: cancelling open orders");
        self.post(
            CANCEL_ALL_PATH,
            &json!({ "market": symbol, "market_type": MARKET_TYPE }),
        )
        .await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<Value, ExchangeError> {
        self.validate_order(order)?;
        let mut body = json!({
            "market": order.symbol,
            "market_type": MARKET_TYPE,
            "side": side(order.direction),
            "type": order.order_type.as_str(),
            "amount": order.size,
        });
        if let (OrderType::Limit, Some(price)) = (order.order_type, &order.price) {
            body["price"] = json!(price);
        }

        info!(
            market = %order.symbol,
            side = side(order.direction),
            order_type = %order.order_type,
            amount = %order.size,
            "CoinEx: placing order"
        );
        self.post(ORDER_PATH, &body).await
    }

    async fn close_position(
        &self,
        symbol: &str,
        direction: Direction,
        size: Option<&str>,
    ) -> Result<Value, ExchangeError> {
        self.ensure_open_position(symbol, direction).await?;

        let mut body = json!({
            "market": symbol,
            "market_type": MARKET_TYPE,
            "type": "market",
        });
        if let Some(amount) = size {
            body["amount"] = json!(amount);
        }

        info!(market = %symbol, direction = %direction, amount = ?size, "CoinEx: closing position");
        self.post(CLOSE_POSITION_PATH, &body).await
    }

    async fn set_stop_loss(&self, order: &ProtectiveOrder) -> Result<Value, ExchangeError> {
        info!(market = %order.symbol, price = %order.trigger_price, "CoinEx: setting stop loss");
        self.post(
            STOP_LOSS_PATH,
            &json!({
                "market": order.symbol,
                "market_type": MARKET_TYPE,
                "stop_loss_type": TRIGGER_PRICE_TYPE,
                "stop_loss_price": order.trigger_price,
            }),
        )
        .await
    }

    async fn set_take_profit(&self, order: &ProtectiveOrder) -> Result<Value, ExchangeError> {
        info!(market = %order.symbol, price = %order.trigger_price, "CoinEx: setting take profit");
        self.post(
            TAKE_PROFIT_PATH,
            &json!({
                "market": order.symbol,
                "market_type": MARKET_TYPE,
                "take_profit_type": TRIGGER_PRICE_TYPE,
                "take_profit_price": order.trigger_price,
            }),
        )
        .await
    }
}

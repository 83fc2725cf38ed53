//! BitMart futures (contract API v2) provider

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::models::signal::{Direction, OrderType, TradeAction};
use crate::services::exchange::{
    check_envelope, read_json, ExchangeError, ExchangeKind, ExchangeProvider, OrderRequest,
    ProtectiveOrder,
};
use crate::services::signing::{bitmart_signature, timestamp_ms};

pub const DEFAULT_BITMART_URL: &str = "https://api-cloud-v2.bitmart.com";

const SUCCESS_CODE: i64 = 1000;
/// Good-till-cancel
const ORDER_MODE_GTC: u8 = 1;

const SUBMIT_ORDER_PATH: &str = "/contract/private/submit-order";
const SUBMIT_LEVERAGE_PATH: &str = "/contract/private/submit-leverage";
const CANCEL_ORDERS_PATH: &str = "/contract/private/cancel-orders";
const POSITION_PATH: &str = "/contract/private/position";
const TP_SL_PATH: &str = "/contract/private/submit-tp-sl-order";

#[derive(Clone)]
pub struct BitmartConfig {
    pub base_url: String,
    pub api_key: String,
    pub secret_key: String,
    pub memo: String,
    /// `cross` or `isolated`
    pub open_type: String,
    pub timeout: Duration,
}

/// Hedge-mode side code for an action
pub fn side_code(action: TradeAction) -> u8 {
    match action {
        TradeAction::Open(Direction::Long) => 1,
        TradeAction::Close(Direction::Short) => 2,
        TradeAction::Close(Direction::Long) => 3,
        TradeAction::Open(Direction::Short) => 4,
    }
}

pub struct BitmartProvider {
    client: Client,
    config: BitmartConfig,
}

impl BitmartProvider {
    pub fn new(config: BitmartConfig) -> Result<Self, ExchangeError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ExchangeError> {
        // Serialized once; the same string is signed and sent.
        let body = body.to_string();
        let timestamp = timestamp_ms();
        let signature = self.sign("POST", path, &body, timestamp)?;

        debug!(path = path, body = %body, "BitMart: POST");

        let response = self
            .client
            .post(self.url(path))
            .header("X-BM-KEY", &self.config.api_key)
            .header("X-BM-TIMESTAMP", timestamp.to_string())
            .header("X-BM-SIGN", signature)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let (status, value) = read_json(response).await?;
        check_envelope(status, value, SUCCESS_CODE)
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, ExchangeError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        let timestamp = timestamp_ms();
        let signature = self.sign("GET", path, &query, timestamp)?;

        debug!(path = path, query = %query, "BitMart: GET");

        let response = self
            .client
            .get(format!("{}?{}", self.url(path), query))
            .header("X-BM-KEY", &self.config.api_key)
            .header("X-BM-TIMESTAMP", timestamp.to_string())
            .header("X-BM-SIGN", signature)
            .send()
            .await?;

        let (status, value) = read_json(response).await?;
        check_envelope(status, value, SUCCESS_CODE)
    }

    /// Size of the open position on `direction`, in contracts
    async fn open_position_size(
        &self,
        symbol: &str,
        direction: Direction,
    ) -> Result<u64, ExchangeError> {
        let response = self.get(POSITION_PATH, &[("symbol", symbol)]).await?;
        let wanted = match direction {
            Direction::Long => 1,
            Direction::Short => 2,
        };

        let size = response
            .get("data")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|p| p.get("position_type").and_then(Value::as_i64) == Some(wanted))
            .filter_map(|p| p.get("current_amount").and_then(amount_of))
            .find(|amount| *amount > 0);

        size.ok_or_else(|| {
            ExchangeError::InvalidOrder(format!("no open {} position for {}", direction, symbol))
        })
    }
}

fn contracts(field: &str, raw: &str) -> Result<u64, ExchangeError> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ExchangeError::InvalidOrder(format!(
            "BitMart {} must be a whole number of contracts, got '{}'",
            field, raw
        ))),
    }
}

fn amount_of(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse::<f64>().ok().map(|v| v as u64),
        _ => None,
    }
}

#[async_trait::async_trait]
impl ExchangeProvider for BitmartProvider {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Bitmart
    }

    fn sign(
        &self,
        _method: &str,
        _path: &str,
        body: &str,
        timestamp_ms: i64,
    ) -> Result<String, ExchangeError> {
        Ok(bitmart_signature(
            &self.config.secret_key,
            timestamp_ms,
            &self.config.memo,
            body,
        )?)
    }

    fn validate_order(&self, order: &OrderRequest) -> Result<(), ExchangeError> {
        contracts("size", &order.size)?;
        if order.order_type == OrderType::Limit && order.price.is_none() {
            return Err(ExchangeError::InvalidOrder(
                "limit orders need a price".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_close(&self, size: Option<&str>) -> Result<(), ExchangeError> {
        if let Some(raw) = size {
            contracts("size", raw)?;
        }
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<Value, ExchangeError> {
        info!(symbol = %symbol, leverage = leverage, "BitMart: setting leverage");
        self.post(
            SUBMIT_LEVERAGE_PATH,
            &json!({
                "symbol": symbol,
                "leverage": leverage.to_string(),
                "open_type": self.config.open_type,
            }),
        )
        .await
    }

    async fn cancel_open_orders(&self, symbol: &str) -> Result<Value, ExchangeError> {
        info!(symbol = %symbol, "BitMart: cancelling open orders");
        self.post(CANCEL_ORDERS_PATH, &json!({ "symbol": symbol })).await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<Value, ExchangeError> {
        self.validate_order(order)?;
        let mut body = json!({
            "symbol": order.symbol,
            "side": side_code(TradeAction::Open(order.direction)),
            "type": order.order_type.as_str(),
            "leverage": order.leverage.to_string(),
            "open_type": self.config.open_type,
            "mode": ORDER_MODE_GTC,
            "size": contracts("size", &order.size)?,
        });
        if let (OrderType::Limit, Some(price)) = (order.order_type, &order.price) {
            body["price"] = json!(price);
        }

        info!(
            symbol = %order.symbol,
            direction = %order.direction,
            order_type = %order.order_type,
            size = %order.size,
            "BitMart: submitting order"
        );
        self.post(SUBMIT_ORDER_PATH, &body).await
    }

    async fn close_position(
        &self,
        symbol: &str,
        direction: Direction,
        size: Option<&str>,
    ) -> Result<Value, ExchangeError> {
        let size = match size {
            Some(raw) => contracts("size", raw)?,
            None => self.open_position_size(symbol, direction).await?,
        };

        info!(symbol = %symbol, direction = %direction, size = size, "BitMart: closing position");
        self.post(
            SUBMIT_ORDER_PATH,
            &json!({
                "symbol": symbol,
                "side": side_code(TradeAction::Close(direction)),
                "type": "market",
                "mode": ORDER_MODE_GTC,
                "size": size,
            }),
        )
        .await
    }

    async fn set_stop_loss(&self, order: &ProtectiveOrder) -> Result<Value, ExchangeError> {
        self.submit_tp_sl("stop_loss", order).await
    }

    async fn set_take_profit(&self, order: &ProtectiveOrder) -> Result<Value, ExchangeError> {
        self.submit_tp_sl("take_profit", order).await
    }
}

impl BitmartProvider {
    async fn submit_tp_sl(
        &self,
        kind: &str,
        order: &ProtectiveOrder,
    ) -> Result<Value, ExchangeError> {
        let mut body = json!({
            "symbol": order.symbol,
            "type": kind,
            "side": side_code(TradeAction::Close(order.direction)),
            "trigger_price": order.trigger_price,
            "executive_price": order.trigger_price,
            // last price trigger, position-level plan
            "price_type": 1,
            "plan_category": 2,
            "category": "market",
        });
        if let Some(size) = &order.size {
            body["size"] = json!(contracts("size", size)?);
        }

        info!(
            symbol = %order.symbol,
            kind = kind,
            trigger_price = %order.trigger_price,
            "BitMart: submitting {} order",
            kind
        );
        self.post(TP_SL_PATH, &body).await
    }
}

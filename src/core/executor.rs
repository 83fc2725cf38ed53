//! Turns a validated signal into the exchange call chain
//!
//! Opening a position runs, in order: optional cancel of open orders,
//! optional close of the opposite position, optional leverage adjustment,
//! the order itself, then any stop-loss / take-profit. Only the leverage call
//! and the order are fatal; the rest degrade to warnings in the report.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::metrics::Metrics;
use crate::models::signal::{Direction, TradeAction, TradeIntent};
use crate::services::exchange::{ExchangeError, ExchangeProvider, OrderRequest, ProtectiveOrder};
use crate::services::telegram::Notifier;

#[derive(Clone, Debug)]
pub struct ExecutionOptions {
    pub cancel_open_orders: bool,
    pub close_opposite: bool,
    pub adjust_leverage: bool,
    pub default_leverage: u32,
}

impl ExecutionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cancel_open_orders: config.cancel_open_orders,
            close_opposite: config.close_opposite,
            adjust_leverage: config.adjust_leverage,
            default_leverage: config.default_leverage,
        }
    }
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            cancel_open_orders: false,
            close_opposite: false,
            adjust_leverage: true,
            default_leverage: crate::config::DEFAULT_LEVERAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    /// Order placed but a protective order failed
    Partial,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtectiveOutcome {
    pub kind: &'static str,
    pub trigger_price: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub status: ReportStatus,
    pub exchange: &'static str,
    pub action: TradeAction,
    pub symbol: String,
    pub order_result: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub protective_orders: Vec<ProtectiveOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub struct TradeExecutor {
    provider: Arc<dyn ExchangeProvider>,
    options: ExecutionOptions,
    notifier: Option<Notifier>,
    metrics: Option<Arc<Metrics>>,
}

impl TradeExecutor {
    pub fn new(provider: Arc<dyn ExchangeProvider>, options: ExecutionOptions) -> Self {
        Self {
            provider,
            options,
            notifier: None,
            metrics: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn provider(&self) -> &Arc<dyn ExchangeProvider> {
        &self.provider
    }

    /// Provider-side checks, run before a signal is admitted past the cooldown
    pub fn validate(&self, intent: &TradeIntent) -> Result<(), ExchangeError> {
        match intent.action {
            TradeAction::Open(direction) => self
                .provider
                .validate_order(&self.order_request(intent, direction)?),
            TradeAction::Close(_) => self.provider.validate_close(intent.size.as_deref()),
        }
    }

    fn order_request(
        &self,
        intent: &TradeIntent,
        direction: Direction,
    ) -> Result<OrderRequest, ExchangeError> {
        let size = intent.size.clone().ok_or_else(|| {
            ExchangeError::InvalidOrder("size is required to open a position".to_string())
        })?;
        Ok(OrderRequest {
            symbol: intent.symbol.clone(),
            direction,
            order_type: intent.order_type,
            size,
            price: intent.price.clone(),
            leverage: intent.leverage.unwrap_or(self.options.default_leverage),
        })
    }

    pub async fn execute(&self, intent: &TradeIntent) -> Result<ExecutionReport, ExchangeError> {
        let result = match intent.action {
            TradeAction::Open(direction) => self.open(intent, direction).await,
            TradeAction::Close(direction) => self.close(intent, direction).await,
        };

        match &result {
            Ok(report) => {
                info!(
                    exchange = report.exchange,
                    symbol = %report.symbol,
                    action = %report.action,
                    status = ?report.status,
                    "Signal executed"
                );
                self.notify(self.success_message(intent, report));
            }
            Err(e) => {
                error!(
                    exchange = %self.provider.kind(),
                    symbol = %intent.symbol,
                    action = %intent.action,
                    error = %e,
                    "Signal execution failed"
                );
                self.notify(format!(
                    "❌ {} {} failed on {}: {}",
                    intent.action,
                    intent.symbol,
                    self.provider.kind(),
                    e
                ));
            }
        }

        result
    }

    async fn open(
        &self,
        intent: &TradeIntent,
        direction: Direction,
    ) -> Result<ExecutionReport, ExchangeError> {
        let order = self.order_request(intent, direction)?;
        self.provider.validate_order(&order)?;

        let symbol = order.symbol.as_str();
        let mut warnings = Vec::new();

        if self.options.cancel_open_orders {
            if let Err(e) = self
                .call("cancel_open_orders", self.provider.cancel_open_orders(symbol))
                .await
            {
                warn!(symbol = %symbol, error = %e, "Cancelling open orders failed, continuing");
                warnings.push(format!("cancel open orders failed: {}", e));
            }
        }

        if self.options.close_opposite {
            let opposite = direction.opposite();
            if let Err(e) = self
                .call(
                    "close_position",
                    self.provider.close_position(symbol, opposite, None),
                )
                .await
            {
                warn!(symbol = %symbol, side = %opposite, error = %e, "Closing opposite position failed, continuing");
                warnings.push(format!("close {} position failed: {}", opposite, e));
            }
        }

        if self.options.adjust_leverage {
            self.call(
                "set_leverage",
                self.provider.set_leverage(symbol, order.leverage),
            )
            .await?;
        }

        let order_result = self
            .call("place_order", self.provider.place_order(&order))
            .await?;

        let mut protective_orders = Vec::new();
        if let Some(price) = &intent.stop_loss {
            let protective = ProtectiveOrder {
                symbol: order.symbol.clone(),
                direction,
                trigger_price: price.clone(),
                size: None,
            };
            let result = self
                .call("set_stop_loss", self.provider.set_stop_loss(&protective))
                .await;
            protective_orders.push(outcome("stop_loss", price, result));
        }
        if let Some(price) = &intent.take_profit {
            let protective = ProtectiveOrder {
                symbol: order.symbol.clone(),
                direction,
                trigger_price: price.clone(),
                size: None,
            };
            let result = self
                .call("set_take_profit", self.provider.set_take_profit(&protective))
                .await;
            protective_orders.push(outcome("take_profit", price, result));
        }

        let status = if protective_orders.iter().any(|p| p.status == "error") {
            ReportStatus::Partial
        } else {
            ReportStatus::Success
        };

        Ok(ExecutionReport {
            status,
            exchange: self.provider.kind().as_str(),
            action: intent.action,
            symbol: order.symbol,
            order_result,
            protective_orders,
            warnings,
        })
    }

    async fn close(
        &self,
        intent: &TradeIntent,
        direction: Direction,
    ) -> Result<ExecutionReport, ExchangeError> {
        self.provider.validate_close(intent.size.as_deref())?;
        let order_result = self
            .call(
                "close_position",
                self.provider
                    .close_position(&intent.symbol, direction, intent.size.as_deref()),
            )
            .await?;

        Ok(ExecutionReport {
            status: ReportStatus::Success,
            exchange: self.provider.kind().as_str(),
            action: intent.action,
            symbol: intent.symbol.clone(),
            order_result,
            protective_orders: Vec::new(),
            warnings: Vec::new(),
        })
    }

    async fn call<F>(&self, operation: &str, request: F) -> Result<Value, ExchangeError>
    where
        F: Future<Output = Result<Value, ExchangeError>>,
    {
        let result = request.await;
        if let Some(metrics) = &self.metrics {
            metrics.record_exchange_call(self.provider.kind().as_str(), operation, result.is_ok());
        }
        result
    }

    fn notify(&self, text: String) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(text);
        }
    }

    fn success_message(&self, intent: &TradeIntent, report: &ExecutionReport) -> String {
        let mut lines = vec![format!(
            "✅ {} {} on {}",
            report.action, report.symbol, report.exchange
        )];
        if let TradeAction::Open(_) = intent.action {
            lines.push(format!("Type: {}", intent.order_type));
            if let Some(size) = &intent.size {
                lines.push(format!("Size: {}", size));
            }
            if let Some(price) = &intent.price {
                lines.push(format!("Price: {}", price));
            }
            lines.push(format!(
                "Leverage: {}x",
                intent.leverage.unwrap_or(self.options.default_leverage)
            ));
        }
        for p in &report.protective_orders {
            lines.push(format!("{}: {} ({})", p.kind, p.trigger_price, p.status));
        }
        lines.join("\n")
    }
}

fn outcome(
    kind: &'static str,
    trigger_price: &str,
    result: Result<Value, ExchangeError>,
) -> ProtectiveOutcome {
    match result {
        Ok(value) => ProtectiveOutcome {
            kind,
            trigger_price: trigger_price.to_string(),
            status: "ok",
            result: Some(value),
            error: None,
        },
        Err(e) => {
            warn!(kind = kind, trigger_price = %trigger_price, error = %e, "Protective order failed");
            ProtectiveOutcome {
                kind,
                trigger_price: trigger_price.to_string(),
                status: "error",
                result: None,
                error: Some(e.to_string()),
            }
        }
    }
}

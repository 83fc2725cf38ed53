//! Unit tests for the trade execution chain

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use signal_relay::core::executor::{ExecutionOptions, ReportStatus, TradeExecutor};
use signal_relay::models::signal::{Direction, OrderType, TradeAction, TradeIntent};
use signal_relay::services::exchange::{
    ExchangeError, ExchangeKind, ExchangeProvider, OrderRequest, ProtectiveOrder,
};
use tokio_test::{assert_err, assert_ok};

/// Provider that records each call and fails the operations it is told to
#[derive(Default)]
struct RecordingProvider {
    calls: Mutex<Vec<String>>,
    failing: HashSet<&'static str>,
    reject_validation: bool,
}

impl RecordingProvider {
    fn failing(ops: &[&'static str]) -> Self {
        Self {
            failing: ops.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String, op: &'static str) -> Result<Value, ExchangeError> {
        self.calls.lock().unwrap().push(call);
        if self.failing.contains(op) {
            return Err(ExchangeError::Rejected {
                status: 200,
                code: Some(1),
                message: format!("{} refused", op),
                body: json!({"code": 1}),
            });
        }
        Ok(json!({"code": 0, "op": op}))
    }
}

#[async_trait]
impl ExchangeProvider for RecordingProvider {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Coinex
    }

    fn sign(&self, _: &str, _: &str, _: &str, _: i64) -> Result<String, ExchangeError> {
        Ok("sig".to_string())
    }

    fn validate_order(&self, _order: &OrderRequest) -> Result<(), ExchangeError> {
        if self.reject_validation {
            return Err(ExchangeError::InvalidOrder("size below minimum".to_string()));
        }
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<Value, ExchangeError> {
        self.record(format!("set_leverage {} {}", symbol, leverage), "set_leverage")
    }

    async fn cancel_open_orders(&self, symbol: &str) -> Result<Value, ExchangeError> {
        self.record(format!("cancel_open_orders {}", symbol), "cancel_open_orders")
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<Value, ExchangeError> {
        self.record(
            format!(
                "place_order {} {} {} {}",
                order.symbol, order.direction, order.order_type, order.size
            ),
            "place_order",
        )
    }

    async fn close_position(
        &self,
        symbol: &str,
        direction: Direction,
        size: Option<&str>,
    ) -> Result<Value, ExchangeError> {
        self.record(
            format!("close_position {} {} {}", symbol, direction, size.unwrap_or("all")),
            "close_position",
        )
    }

    async fn set_stop_loss(&self, order: &ProtectiveOrder) -> Result<Value, ExchangeError> {
        self.record(format!("set_stop_loss {}", order.trigger_price), "set_stop_loss")
    }

    async fn set_take_profit(&self, order: &ProtectiveOrder) -> Result<Value, ExchangeError> {
        self.record(
            format!("set_take_profit {}", order.trigger_price),
            "set_take_profit",
        )
    }
}

fn open_long() -> TradeIntent {
    TradeIntent {
        symbol: "BTCUSDT".to_string(),
        action: TradeAction::Open(Direction::Long),
        order_type: OrderType::Market,
        size: Some("0.01".to_string()),
        price: None,
        leverage: None,
        stop_loss: Some("58000".to_string()),
        take_profit: Some("72000".to_string()),
    }
}

fn all_steps() -> ExecutionOptions {
    ExecutionOptions {
        cancel_open_orders: true,
        close_opposite: true,
        adjust_leverage: true,
        default_leverage: 8,
    }
}

fn executor(provider: &Arc<RecordingProvider>, options: ExecutionOptions) -> TradeExecutor {
    TradeExecutor::new(provider.clone(), options)
}

#[tokio::test]
async fn open_runs_full_chain_in_order() {
    let provider = Arc::new(RecordingProvider::default());
    let report = assert_ok!(executor(&provider, all_steps()).execute(&open_long()).await);

    assert_eq!(
        provider.calls(),
        vec![
            "cancel_open_orders BTCUSDT",
            "close_position BTCUSDT short all",
            "set_leverage BTCUSDT 8",
            "place_order BTCUSDT long market 0.01",
            "set_stop_loss 58000",
            "set_take_profit 72000",
        ]
    );
    assert_eq!(report.status, ReportStatus::Success);
    assert_eq!(report.exchange, "coinex");
    assert_eq!(report.order_result["op"], "place_order");
    assert_eq!(report.protective_orders.len(), 2);
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn optional_steps_are_skipped_by_default() {
    let provider = Arc::new(RecordingProvider::default());
    let mut intent = open_long();
    intent.stop_loss = None;
    intent.take_profit = None;
    intent.leverage = Some(12);

    assert_ok!(
        executor(&provider, ExecutionOptions::default())
            .execute(&intent)
            .await
    );
    assert_eq!(
        provider.calls(),
        vec!["set_leverage BTCUSDT 12", "place_order BTCUSDT long market 0.01"]
    );
}

#[tokio::test]
async fn preparatory_failures_become_warnings() {
    let provider = Arc::new(RecordingProvider::failing(&[
        "cancel_open_orders",
        "close_position",
    ]));
    let report = assert_ok!(executor(&provider, all_steps()).execute(&open_long()).await);

    assert_eq!(report.status, ReportStatus::Success);
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings[0].contains("cancel open orders failed"));
    assert!(report.warnings[1].contains("close short position failed"));
    assert!(provider
        .calls()
        .contains(&"place_order BTCUSDT long market 0.01".to_string()));
}

#[tokio::test]
async fn leverage_failure_aborts_before_order() {
    let provider = Arc::new(RecordingProvider::failing(&["set_leverage"]));
    let err = assert_err!(
        executor(&provider, ExecutionOptions::default())
            .execute(&open_long())
            .await
    );

    assert!(matches!(err, ExchangeError::Rejected { .. }));
    assert_eq!(provider.calls(), vec!["set_leverage BTCUSDT 5"]);
}

#[tokio::test]
async fn order_failure_skips_protective_orders() {
    let provider = Arc::new(RecordingProvider::failing(&["place_order"]));
    assert_err!(
        executor(&provider, ExecutionOptions::default())
            .execute(&open_long())
            .await
    );
    assert!(!provider
        .calls()
        .iter()
        .any(|c| c.starts_with("set_stop_loss") || c.starts_with("set_take_profit")));
}

#[tokio::test]
async fn protective_failure_reports_partial() {
    let provider = Arc::new(RecordingProvider::failing(&["set_take_profit"]));
    let report = assert_ok!(
        executor(&provider, ExecutionOptions::default())
            .execute(&open_long())
            .await
    );

    assert_eq!(report.status, ReportStatus::Partial);
    let outcomes: Vec<_> = report
        .protective_orders
        .iter()
        .map(|p| (p.kind, p.status))
        .collect();
    assert_eq!(outcomes, vec![("stop_loss", "ok"), ("take_profit", "error")]);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "partial");
    assert!(json["protective_orders"][1]["error"]
        .as_str()
        .unwrap()
        .contains("set_take_profit refused"));
}

#[tokio::test]
async fn close_calls_close_position_only() {
    let provider = Arc::new(RecordingProvider::default());
    let intent = TradeIntent {
        symbol: "ETHUSDT".to_string(),
        action: TradeAction::Close(Direction::Short),
        order_type: OrderType::Market,
        size: Some("0.5".to_string()),
        price: None,
        leverage: None,
        stop_loss: None,
        take_profit: None,
    };

    let report = assert_ok!(executor(&provider, all_steps()).execute(&intent).await);
    assert_eq!(provider.calls(), vec!["close_position ETHUSDT short 0.5"]);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["action"], "close_short");
    assert!(json.get("protective_orders").is_none());
    assert!(json.get("warnings").is_none());
}

#[tokio::test]
async fn validation_failure_makes_no_calls() {
    let provider = Arc::new(RecordingProvider {
        reject_validation: true,
        ..RecordingProvider::default()
    });
    let err = assert_err!(executor(&provider, all_steps()).execute(&open_long()).await);

    assert!(matches!(err, ExchangeError::InvalidOrder(_)));
    assert!(provider.calls().is_empty());
}

#[test]
fn validate_checks_without_calling_exchange() {
    let provider = Arc::new(RecordingProvider {
        reject_validation: true,
        ..RecordingProvider::default()
    });
    let executor = executor(&provider, all_steps());

    assert_err!(executor.validate(&open_long()));

    let mut missing_size = open_long();
    missing_size.size = None;
    assert!(matches!(
        executor.validate(&missing_size),
        Err(ExchangeError::InvalidOrder(_))
    ));

    let mut close = open_long();
    close.action = TradeAction::Close(Direction::Long);
    assert_ok!(executor.validate(&close));
    assert!(provider.calls().is_empty());
}

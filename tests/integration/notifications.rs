//! Background services: Telegram notifications and the keepalive ping

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use signal_relay::config::TelegramConfig;
use signal_relay::core::executor::{ExecutionOptions, TradeExecutor};
use signal_relay::core::keepalive::KeepAlive;
use signal_relay::models::signal::{Direction, OrderType, TradeAction, TradeIntent};
use signal_relay::services::telegram::{Notifier, TelegramService};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::test_utils::{bitmart_provider, mock_bitmart_success, received};

async fn mock_telegram() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {
                "message_id": 1,
                "date": 1700000000,
                "chat": { "id": 42, "type": "private", "first_name": "relay" },
                "text": "ok"
            }
        })))
        .mount(&server)
        .await;
    server
}

/// Poll until a request whose body contains `needle` arrives
async fn wait_for_body(server: &MockServer, needle: &str) -> Option<Request> {
    for _ in 0..100 {
        if let Some(request) = received(server)
            .await
            .into_iter()
            .find(|r| String::from_utf8_lossy(&r.body).contains(needle))
        {
            return Some(request);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    None
}

fn telegram_service(server: &MockServer) -> TelegramService {
    TelegramService::new(&TelegramConfig {
        bot_token: "123456:TEST-TOKEN".to_string(),
        chat_id: 42,
        api_url: Some(server.uri()),
    })
    .expect("telegram service")
}

#[tokio::test]
async fn notifier_delivers_to_chat() {
    let telegram = mock_telegram().await;
    let (notifier, rx) = Notifier::channel();
    tokio::spawn(telegram_service(&telegram).start(rx));

    notifier.notify("relay online");

    let request = wait_for_body(&telegram, "relay online")
        .await
        .expect("message delivered");
    assert!(request.url.path().to_lowercase().ends_with("/sendmessage"));
    assert!(request.url.path().contains("123456:TEST-TOKEN"));
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["chat_id"], 42);
}

#[tokio::test]
async fn executed_trade_is_announced() {
    let exchange = MockServer::start().await;
    mock_bitmart_success(&exchange).await;
    let telegram = mock_telegram().await;

    let (notifier, rx) = Notifier::channel();
    tokio::spawn(telegram_service(&telegram).start(rx));

    let executor = TradeExecutor::new(
        Arc::new(bitmart_provider(&exchange)),
        ExecutionOptions::default(),
    )
    .with_notifier(notifier);

    let intent = TradeIntent {
        symbol: "SOLUSDT".to_string(),
        action: TradeAction::Open(Direction::Long),
        order_type: OrderType::Market,
        size: Some("4".to_string()),
        price: None,
        leverage: Some(7),
        stop_loss: None,
        take_profit: None,
    };
    executor.execute(&intent).await.expect("trade executed");

    let request = wait_for_body(&telegram, "SOLUSDT")
        .await
        .expect("notification delivered");
    let body = String::from_utf8_lossy(&request.body);
    assert!(body.contains("open_long"));
    assert!(body.contains("Leverage: 7x"));
}

#[tokio::test]
async fn closed_channel_stops_service() {
    let telegram = mock_telegram().await;
    let (notifier, rx) = Notifier::channel();
    let handle = tokio::spawn(telegram_service(&telegram).start(rx));

    drop(notifier);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("service exits once senders are gone")
        .unwrap();
}

#[tokio::test]
async fn keepalive_pings_until_stopped() {
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Signal relay is running!"))
        .mount(&target)
        .await;

    let keepalive = KeepAlive::new(target.uri(), Duration::from_millis(50)).unwrap();
    keepalive.start().await;
    assert!(keepalive.is_running().await);

    tokio::time::sleep(Duration::from_millis(300)).await;
    keepalive.stop().await;
    assert!(!keepalive.is_running().await);

    let pings = received(&target).await.len();
    assert!(pings >= 2, "expected repeated pings, got {}", pings);

    // At most one ping can still have been in flight when the task was aborted.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(received(&target).await.len() <= pings + 1);
}

//! Test utilities for webhook server integration tests

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use signal_relay::core::dedup::DuplicateGuard;
use signal_relay::core::executor::{ExecutionOptions, TradeExecutor};
use signal_relay::core::http::{create_router, AppState};
use signal_relay::metrics::Metrics;
use signal_relay::services::exchange::ExchangeProvider;
use wiremock::MockServer;

use crate::test_utils::{
    bitmart_provider, coinex_provider, mock_bitmart_success, mock_coinex_success, PASSPHRASE,
};

/// Webhook server wired to a wiremock-backed exchange
#[allow(dead_code)]
pub struct TestApp {
    pub server: TestServer,
    pub exchange: MockServer,
    pub metrics: Arc<Metrics>,
}

pub struct TestAppBuilder {
    options: ExecutionOptions,
    cooldown: Duration,
    coinex: bool,
    mock_success: bool,
}

impl TestAppBuilder {
    pub fn options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn coinex(mut self) -> Self {
        self.coinex = true;
        self
    }

    /// Leave the exchange without default mocks so a test can mount its own
    pub fn without_default_mocks(mut self) -> Self {
        self.mock_success = false;
        self
    }

    pub async fn build(self) -> TestApp {
        let exchange = MockServer::start().await;
        let provider: Arc<dyn ExchangeProvider> = if self.coinex {
            if self.mock_success {
                mock_coinex_success(&exchange).await;
            }
            Arc::new(coinex_provider(&exchange))
        } else {
            if self.mock_success {
                mock_bitmart_success(&exchange).await;
            }
            Arc::new(bitmart_provider(&exchange))
        };

        let metrics = Arc::new(Metrics::new().expect("metrics initialization"));
        let state = AppState::new(
            PASSPHRASE,
            TradeExecutor::new(provider, self.options),
            DuplicateGuard::new(self.cooldown),
            metrics.clone(),
        );

        let server = TestServer::new(create_router(state)).expect("start test server");

        TestApp {
            server,
            exchange,
            metrics,
        }
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            options: ExecutionOptions::default(),
            cooldown: Duration::from_secs(10),
            coinex: false,
            mock_success: true,
        }
    }

    /// BitMart-backed app with default options and every endpoint succeeding
    pub async fn new() -> Self {
        Self::builder().build().await
    }
}

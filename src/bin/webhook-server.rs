//! Signal relay webhook server
//!
//! Receives alert webhooks on `POST /webhook` and forwards them as signed
//! futures orders to the configured exchange. Optional Telegram notifications
//! and a self-ping keepalive run alongside the HTTP server.

use dotenvy::dotenv;
use signal_relay::config::Config;
use signal_relay::core::http::{start_server, AppState};
use signal_relay::core::keepalive::KeepAlive;
use signal_relay::logging;
use signal_relay::services::telegram::{Notifier, TelegramService};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env if present
    dotenv().ok();

    let config = Config::from_env()?;
    logging::init_logging_for(&config.environment);

    info!("Starting signal relay");
    info!(environment = %config.environment, "Environment");
    info!(exchange = %config.exchange.kind(), "Exchange");
    info!(
        cooldown_secs = config.cooldown.as_secs(),
        default_leverage = config.default_leverage,
        cancel_open_orders = config.cancel_open_orders,
        close_opposite = config.close_opposite,
        adjust_leverage = config.adjust_leverage,
        "Execution settings"
    );

    let notifier = match &config.telegram {
        Some(telegram) => {
            let service = TelegramService::new(telegram)?;
            let (notifier, rx) = Notifier::channel();
            tokio::spawn(service.start(rx));
            info!(chat_id = telegram.chat_id, "Telegram notifications enabled");
            Some(notifier)
        }
        None => {
            info!("Telegram notifications disabled (set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID to enable)");
            None
        }
    };

    let state = AppState::from_config(&config, notifier).map_err(|e| e.to_string())?;

    let keepalive = match &config.keepalive {
        Some(k) => {
            let keepalive = KeepAlive::new(k.url.clone(), k.interval)?;
            keepalive.start().await;
            Some(keepalive)
        }
        None => None,
    };

    let port = config.port;
    info!(port = port, "HTTP Server: http://0.0.0.0:{}", port);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, state).await {
            error!(error = %e, "HTTP server error");
        }
    });

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down signal relay...");
        }
        _ = server_handle => {
            warn!("HTTP server stopped");
        }
    }

    if let Some(keepalive) = keepalive {
        keepalive.stop().await;
    }
    info!("Signal relay stopped");

    Ok(())
}

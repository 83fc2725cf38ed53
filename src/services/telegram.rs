//! Telegram trade notifications
//!
//! The webhook never waits on Telegram: handlers push text into a bounded
//! queue through [`Notifier`] and a background [`TelegramService`] delivers it.

use teloxide::prelude::*;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use url::Url;

use crate::config::TelegramConfig;

const QUEUE_CAPACITY: usize = 64;

/// Sending half of the notification queue
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: mpsc::Sender<String>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    /// Queue a message; dropped with a warning if the queue is full or closed
    pub fn notify(&self, text: impl Into<String>) {
        if let Err(e) = self.tx.try_send(text.into()) {
            warn!(error = %e, "Telegram notification dropped");
        }
    }
}

pub struct TelegramService {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramService {
    pub fn new(config: &TelegramConfig) -> Result<Self, url::ParseError> {
        let mut bot = Bot::new(&config.bot_token);
        if let Some(api_url) = &config.api_url {
            bot = bot.set_api_url(Url::parse(api_url)?);
        }

        Ok(Self {
            bot,
            chat_id: ChatId(config.chat_id),
        })
    }

    pub async fn start(self, mut rx: mpsc::Receiver<String>) {
        info!("Starting Telegram notification service");

        while let Some(msg) = rx.recv().await {
            if let Err(e) = self.bot.send_message(self.chat_id, msg).await {
                error!(error = %e, "Failed to send Telegram message");
            }
        }

        info!("Telegram notification channel closed. Stopping service.");
    }
}

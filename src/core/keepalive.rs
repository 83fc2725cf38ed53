//! Self-ping loop that keeps a sleeping hosting instance warm

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct KeepAlive {
    client: Client,
    url: String,
    interval: Duration,
    handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl KeepAlive {
    pub fn new(url: impl Into<String>, interval: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10).min(interval.max(Duration::from_secs(1))))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            interval,
            handle: Arc::new(RwLock::new(None)),
        })
    }

    /// Spawn the ping loop. The first ping goes out one interval after start.
    pub async fn start(&self) {
        let client = self.client.clone();
        let url = self.url.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            info!(url = %url, interval_secs = interval.as_secs_f64(), "KeepAlive: started");
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match client.get(&url).send().await {
                    Ok(response) => {
                        debug!(url = %url, status = %response.status(), "KeepAlive: ping sent");
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "KeepAlive: ping failed");
                    }
                }
            }
        });

        let mut h = self.handle.write().await;
        if let Some(previous) = h.replace(handle) {
            previous.abort();
        }
    }

    pub async fn stop(&self) {
        let mut handle = self.handle.write().await;
        if let Some(h) = handle.take() {
            h.abort();
            info!("KeepAlive: stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle.read().await.is_some()
    }
}

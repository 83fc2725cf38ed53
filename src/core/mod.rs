//! Webhook server core: HTTP surface, execution chain, cooldown and keepalive

pub mod dedup;
pub mod error;
pub mod executor;
pub mod http;
pub mod keepalive;

pub use dedup::DuplicateGuard;
pub use error::WebhookError;
pub use executor::{ExecutionOptions, ExecutionReport, TradeExecutor};
pub use http::{create_router, start_server, AppState};
pub use keepalive::KeepAlive;

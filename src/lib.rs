//! Signal relay: receives alert webhooks and forwards them as signed futures
//! orders to BitMart or CoinEx.

pub mod config;
pub mod core;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;

//! Logging initialization with environment-based formatters
//!
//! - Production: structured JSON logs for the hosting platform's log drain
//! - Anything else: colorful, human-readable logs

use crate::config::get_environment;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize logging based on the environment
///
/// - Production: JSON structured logs (suitable for log aggregation systems)
/// - Sandbox/Development: Colorful, human-readable logs
pub fn init_logging() {
    init_logging_for(&get_environment());
}

/// Initialize logging for an explicit environment name
///
/// `RUST_LOG` overrides the default filter (`info`, with hyper and reqwest
/// capped at `warn`).
pub fn init_logging_for(env: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

    let is_production = matches!(env, "production" | "prod");

    if is_production {
        // Production: Structured JSON logs
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::io::stdout),
            )
            .init();
    } else {
        // Sandbox/local: colorful, human-readable logs
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(true) // Enable colors
                    .with_writer(std::io::stdout),
            )
            .init();
    }
}

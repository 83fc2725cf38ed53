//! HTTP endpoint server using Axum

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use crate::config::Config;
use crate::core::dedup::DuplicateGuard;
use crate::core::error::WebhookError;
use crate::core::executor::{ExecutionOptions, ReportStatus, TradeExecutor};
use crate::metrics::Metrics;
use crate::models::signal::Signal;
use crate::services::build_provider;
use crate::services::telegram::Notifier;

pub const LIVENESS_MESSAGE: &str = "Signal relay is running!";

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<Metrics>,
    pub start_time: Arc<Instant>,
    pub passphrase: Arc<String>,
    pub executor: Arc<TradeExecutor>,
    pub dedup: Arc<DuplicateGuard>,
}

impl AppState {
    pub fn new(
        passphrase: impl Into<String>,
        executor: TradeExecutor,
        dedup: DuplicateGuard,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            executor: Arc::new(executor.with_metrics(metrics.clone())),
            metrics,
            start_time: Arc::new(Instant::now()),
            passphrase: Arc::new(passphrase.into()),
            dedup: Arc::new(dedup),
        }
    }

    /// Wire the provider, executor and cooldown described by `config`
    pub fn from_config(
        config: &Config,
        notifier: Option<Notifier>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let metrics = Arc::new(Metrics::new()?);
        let provider = build_provider(&config.exchange)?;
        let mut executor = TradeExecutor::new(provider, ExecutionOptions::from_config(config));
        if let Some(notifier) = notifier {
            executor = executor.with_notifier(notifier);
        }

        Ok(Self::new(
            config.webhook_passphrase.clone(),
            executor,
            DuplicateGuard::new(config.cooldown),
            metrics,
        ))
    }
}

pub async fn liveness() -> &'static str {
    LIVENESS_MESSAGE
}

/// Process-level health; the exchange is not probed
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let uptime_seconds = state.start_time.elapsed().as_secs();
    Json(json!({
        "status": "healthy",
        "uptime_seconds": uptime_seconds,
        "service": "signal-relay",
        "exchange": state.executor.provider().kind().as_str(),
    }))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Receive an alert and forward it to the exchange.
///
/// The body is read as raw bytes so alerts sent as `text/plain` are accepted too.
pub async fn webhook(State(state): State<AppState>, body: Bytes) -> Response {
    match handle_signal(&state, &body).await {
        Ok(response) => response,
        Err(e) => {
            state.metrics.record_signal(e.outcome());
            warn!(status = %e.status_code(), error = %e, "Webhook rejected");
            e.into_response()
        }
    }
}

async fn handle_signal(state: &AppState, body: &[u8]) -> Result<Response, WebhookError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| WebhookError::BadRequest(format!("no valid JSON received: {}", e)))?;
    if !payload.is_object() {
        return Err(WebhookError::BadRequest(
            "expected a JSON object".to_string(),
        ));
    }

    // Authenticate before looking at anything else in the payload.
    let received = match payload.get("passphrase") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    if !passphrase_matches(received.as_deref(), &state.passphrase) {
        return Err(WebhookError::Unauthorized);
    }

    let signal: Signal = serde_json::from_value(payload)
        .map_err(|e| WebhookError::BadRequest(format!("malformed signal: {}", e)))?;
    let intent = signal.into_intent()?;

    info!(
        symbol = %intent.symbol,
        action = %intent.action,
        order_type = %intent.order_type,
        size = ?intent.size,
        "Webhook signal received"
    );

    // Rejected signals must not take a cooldown slot.
    state.executor.validate(&intent)?;

    if !state.dedup.check_and_record(&intent.dedup_key()) {
        info!(
            symbol = %intent.symbol,
            action = %intent.action,
            window_secs = state.dedup.window().as_secs_f64(),
            "Duplicate signal ignored"
        );
        state.metrics.record_signal("ignored");
        return Ok(Json(json!({
            "status": "ignored",
            "reason": "duplicate signal within cooldown window",
            "symbol": intent.symbol,
            "action": intent.action,
        }))
        .into_response());
    }

    let report = state.executor.execute(&intent).await?;
    state.metrics.record_signal(match report.status {
        ReportStatus::Success => "executed",
        ReportStatus::Partial => "partial",
    });

    Ok((StatusCode::OK, Json(report)).into_response())
}

/// Constant-time comparison of the received passphrase
fn passphrase_matches(received: Option<&str>, expected: &str) -> bool {
    let Some(received) = received else {
        return false;
    };
    let (a, b) = (received.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Middleware to track HTTP request metrics
async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    state.metrics.http_requests_in_flight.inc();

    let response = next.run(request).await;
    let status = response.status();
    let duration = start.elapsed();

    state.metrics.http_requests_in_flight.dec();
    state.metrics.http_requests_total.inc();
    state
        .metrics
        .http_request_duration_seconds
        .observe(duration.as_secs_f64());

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = duration.as_millis(),
            "HTTP request error"
        );
    }

    response
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/webhook", post(webhook))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn start_server(
    port: u16,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!(port = port, "HTTP server listening on port {}", port);
    info!("Webhook endpoint available at http://0.0.0.0:{}/webhook", port);
    axum::serve(listener, app).await?;

    Ok(())
}

//! Prometheus metrics for the webhook server

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub http_requests_total: IntCounter,
    pub http_request_duration_seconds: Histogram,
    pub http_requests_in_flight: IntGauge,
    /// Webhook outcomes: executed, partial, ignored, unauthorized, invalid, failed
    pub webhook_signals_total: IntCounterVec,
    pub exchange_requests_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total =
            IntCounter::new("http_requests_total", "Total number of HTTP requests")?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
        ))?;
        let http_requests_in_flight =
            IntGauge::new("http_requests_in_flight", "HTTP requests currently being served")?;
        let webhook_signals_total = IntCounterVec::new(
            Opts::new("webhook_signals_total", "Webhook signals by outcome"),
            &["outcome"],
        )?;
        let exchange_requests_total = IntCounterVec::new(
            Opts::new("exchange_requests_total", "Exchange calls by operation and outcome"),
            &["exchange", "operation", "outcome"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(webhook_signals_total.clone()))?;
        registry.register(Box::new(exchange_requests_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
            webhook_signals_total,
            exchange_requests_total,
        })
    }

    pub fn record_signal(&self, outcome: &str) {
        self.webhook_signals_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_exchange_call(&self, exchange: &str, operation: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.exchange_requests_total
            .with_label_values(&[exchange, operation, outcome])
            .inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

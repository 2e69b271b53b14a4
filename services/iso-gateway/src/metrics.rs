// Prometheus Metrics for the ISO Gateway
// Tracks: throughput, latency, errors, transfer outcomes

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry, Counter, CounterVec,
    Encoder, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

pub struct Metrics {
    pub registry: Registry,

    // Request metrics
    pub http_requests_total: CounterVec,
    pub http_request_duration_seconds: HistogramVec,

    // ISO message metrics (by family)
    pub iso_messages_total: CounterVec,
    pub iso_parse_duration_seconds: Histogram,
    pub iso_rejections_total: CounterVec,

    // Transfer flow metrics
    pub transfers_total: CounterVec,
    pub transfer_flow_duration_seconds: Histogram,

    // Switch API metrics
    pub switch_requests_total: CounterVec,
    pub switch_request_duration_seconds: HistogramVec,

    // Correlation metrics
    pub status_reports_published_total: Counter,
    pub correlation_timeouts_total: Counter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let http_requests_total = register_counter_vec_with_registry!(
            Opts::new("iso_gateway_http_requests_total", "Total HTTP requests processed"),
            &["route", "status"],
            registry
        )?;

        let http_request_duration_seconds = register_histogram_vec_with_registry!(
            HistogramOpts::new(
                "iso_gateway_http_request_duration_seconds",
                "HTTP request duration in seconds"
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["route"],
            registry
        )?;

        let iso_messages_total = register_counter_vec_with_registry!(
            Opts::new("iso_gateway_iso_messages_total", "ISO 20022 messages received"),
            &["family"],
            registry
        )?;

        let iso_parse_duration_seconds = register_histogram_with_registry!(
            HistogramOpts::new(
                "iso_gateway_iso_parse_duration_seconds",
                "ISO message validation and parsing duration in seconds"
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
            registry
        )?;

        let iso_rejections_total = register_counter_vec_with_registry!(
            Opts::new(
                "iso_gateway_iso_rejections_total",
                "ISO messages rejected before reaching the switch"
            ),
            &["family", "kind"],
            registry
        )?;

        let transfers_total = register_counter_vec_with_registry!(
            Opts::new("iso_gateway_transfers_total", "Transfers by terminal state"),
            &["flow", "state"],
            registry
        )?;

        let transfer_flow_duration_seconds = register_histogram_with_registry!(
            HistogramOpts::new(
                "iso_gateway_transfer_flow_duration_seconds",
                "Time from receipt to terminal state in seconds"
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
            registry
        )?;

        let switch_requests_total = register_counter_vec_with_registry!(
            Opts::new("iso_gateway_switch_requests_total", "Switch API calls"),
            &["operation", "outcome"],
            registry
        )?;

        let switch_request_duration_seconds = register_histogram_vec_with_registry!(
            HistogramOpts::new(
                "iso_gateway_switch_request_duration_seconds",
                "Switch API call duration in seconds"
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["operation"],
            registry
        )?;

        let status_reports_published_total = register_counter_with_registry!(
            Opts::new(
                "iso_gateway_status_reports_published_total",
                "Status reports published on correlation channels"
            ),
            registry
        )?;

        let correlation_timeouts_total = register_counter_with_registry!(
            Opts::new(
                "iso_gateway_correlation_timeouts_total",
                "Asynchronous legs that timed out waiting for a status report"
            ),
            registry
        )?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            iso_messages_total,
            iso_parse_duration_seconds,
            iso_rejections_total,
            transfers_total,
            transfer_flow_duration_seconds,
            switch_requests_total,
            switch_request_duration_seconds,
            status_reports_published_total,
            correlation_timeouts_total,
        })
    }

    /// Export gateway and message bus metrics in Prometheus text format
    pub fn export(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut metric_families = self.registry.gather();
        metric_families.extend(prometheus::gather());
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn track_iso_message(&self, family: &str) {
        self.iso_messages_total.with_label_values(&[family]).inc();
    }

    pub fn track_switch_call(&self, operation: &str, success: bool, seconds: f64) {
        let outcome = if success { "success" } else { "error" };
        self.switch_requests_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.switch_request_duration_seconds
            .with_label_values(&[operation])
            .observe(seconds);
    }
}

// Global metrics instance
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

//! Prometheus metrics for message bus

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, HistogramVec,
    IntGauge,
};

lazy_static! {
    /// Total messages published
    pub static ref MESSAGE_PUBLISH_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_publish_total",
        "Total messages published",
        &["status"]
    )
    .unwrap();

    /// Total messages received
    pub static ref MESSAGE_RECEIVE_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_receive_total",
        "Total messages received",
        &["status"]
    )
    .unwrap();

    /// Correlated waits by outcome (resolved/timeout/closed/cancelled)
    pub static ref CORRELATION_WAIT_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_correlation_wait_total",
        "Correlated waits by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Time from timer start to resolution or timeout
    pub static ref CORRELATION_WAIT_DURATION: HistogramVec = register_histogram_vec!(
        "message_bus_correlation_wait_duration_seconds",
        "Correlated wait duration in seconds",
        &["outcome"]
    )
    .unwrap();

    /// Waiters currently registered
    pub static ref CORRELATION_PENDING: IntGauge = register_int_gauge!(
        "message_bus_correlation_pending",
        "Correlated waiters currently registered"
    )
    .unwrap();
}

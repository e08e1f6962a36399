//! Prometheus metrics for webhook events

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static! {
    /// Handled entries by outcome
    pub static ref EVENTS_TOTAL: CounterVec = register_counter_vec!(
        "webhook_events_total",
        "Handled entries by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Webhook calls by kind and status
    pub static ref WEBHOOK_CALLS_TOTAL: CounterVec = register_counter_vec!(
        "webhook_calls_total",
        "Webhook calls",
        &["kind", "status"]
    )
    .unwrap();

    /// Webhook call duration
    pub static ref WEBHOOK_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "webhook_call_duration_seconds",
        "Webhook call duration in seconds",
        &["kind"]
    )
    .unwrap();
}

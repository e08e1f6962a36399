//! Prometheus metrics for message bus

use crate::error::HandlerError;
use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static! {
    /// Total tasks submitted
    pub static ref MESSAGE_SUBMIT_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_submit_total",
        "Total tasks submitted",
        &["message_type", "status"]
    )
    .unwrap();

    /// Task submit duration
    pub static ref MESSAGE_SUBMIT_DURATION: HistogramVec = register_histogram_vec!(
        "message_bus_submit_duration_seconds",
        "Task submit duration in seconds",
        &["message_type"]
    )
    .unwrap();

    /// Total deliveries handled, by outcome (success/transient/permanent)
    pub static ref MESSAGE_PROCESS_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_process_total",
        "Total deliveries handled",
        &["message_type", "outcome"]
    )
    .unwrap();

    /// Handler duration
    pub static ref MESSAGE_PROCESS_DURATION: HistogramVec = register_histogram_vec!(
        "message_bus_process_duration_seconds",
        "Handler duration in seconds",
        &["message_type"]
    )
    .unwrap();

    /// Total redeliveries scheduled
    pub static ref MESSAGE_REDELIVERY_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_redelivery_total",
        "Total redeliveries scheduled",
        &["message_type"]
    )
    .unwrap();

    /// Total tasks dead-lettered, by reason (permanent/exhausted)
    pub static ref MESSAGE_DEAD_LETTER_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_dead_letter_total",
        "Total tasks moved to the dead-letter queue",
        &["message_type", "reason"]
    )
    .unwrap();
}

/// Outcome label for a handler result
pub(crate) fn outcome_label(result: &Result<(), HandlerError>) -> &'static str {
    match result {
        Ok(()) => "success",
        Err(HandlerError::Transient(_)) => "transient",
        Err(HandlerError::Permanent(_)) => "permanent",
    }
}

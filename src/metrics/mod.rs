//! Prometheus metrics for the notification dispatcher.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "jobboard_notify";

lazy_static! {
    /// Jobs accepted by the enqueue API
    pub static ref JOBS_ENQUEUED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_enqueued_total", METRIC_PREFIX),
        "Total notification jobs enqueued"
    ).unwrap();

    /// Jobs delivered by the transport
    pub static ref JOBS_SENT_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sent_total", METRIC_PREFIX),
        "Total notification jobs delivered"
    ).unwrap();

    /// Individual failed delivery attempts
    pub static ref SEND_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_send_failures_total", METRIC_PREFIX),
        "Total failed delivery attempts"
    ).unwrap();

    /// Jobs discarded after exhausting their attempts
    pub static ref JOBS_GAVE_UP_TOTAL: IntCounter = register_int_counter!(
        format!("{}_gave_up_total", METRIC_PREFIX),
        "Total notification jobs abandoned after their last attempt"
    ).unwrap();

    /// Template resolutions that did not find the requested template
    pub static ref TEMPLATE_FALLBACKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_template_fallbacks_total", METRIC_PREFIX),
        "Template resolutions that used a fallback",
        &["kind"]
    ).unwrap();

    /// Jobs currently waiting in the queue
    pub static ref QUEUE_DEPTH: IntGauge = register_int_gauge!(
        format!("{}_queue_depth", METRIC_PREFIX),
        "Number of notification jobs in the queue"
    ).unwrap();

    /// Transport send latency
    pub static ref SEND_DURATION_SECONDS: Histogram = register_histogram!(
        format!("{}_send_duration_seconds", METRIC_PREFIX),
        "Time spent in a single transport send",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();
}

/// Encode all registered metrics in the Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

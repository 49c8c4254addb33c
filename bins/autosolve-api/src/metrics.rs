//! Prometheus counters for the API, exposed via GET /metrics.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    /// Accepted submissions, cached or not.
    pub static ref SUBMISSIONS: IntCounter = register_int_counter!(
        "autosolve_submissions_total",
        "Total number of accepted challenge submissions"
    )
    .expect("metric registration");

    /// Submissions answered straight from the solution cache.
    pub static ref CACHE_HITS: IntCounter = register_int_counter!(
        "autosolve_cache_hits_total",
        "Total number of submissions served from the solution cache"
    )
    .expect("metric registration");

    /// Finished solve loops by final status.
    pub static ref OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "autosolve_outcomes_total",
        "Total number of finished solve loops by status",
        &["status"]
    )
    .expect("metric registration");
}

pub fn record_outcome(status: &str) {
    OUTCOMES.with_label_values(&[status]).inc();
}

/// Render the default registry in Prometheus text format.
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

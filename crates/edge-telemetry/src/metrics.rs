//! Prometheus metrics for the edge router and the fan-out layer.
//!
//! All metrics follow the naming convention: `edge_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // EDGE ROUTER
    // =========================================================================

    /// Routing decisions by outcome
    pub static ref ROUTER_DECISIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("edge_router_decisions_total", "Routing decisions by outcome"),
        &["decision"]  // forward/reject/fixed_response
    ).expect("metric creation failed");

    /// Auth decision cache lookups
    pub static ref AUTH_CACHE_LOOKUPS: IntCounterVec = IntCounterVec::new(
        Opts::new("edge_auth_cache_lookups_total", "Auth decision cache lookups"),
        &["outcome"]  // hit/miss/expired
    ).expect("metric creation failed");

    /// Identity provider failures (each one is a reject)
    pub static ref AUTH_PROVIDER_ERRORS: IntCounter = IntCounter::new(
        "edge_auth_provider_errors_total",
        "Identity provider calls that failed"
    ).expect("metric creation failed");

    // =========================================================================
    // EVENT FAN-OUT
    // =========================================================================

    /// Events accepted for publish
    pub static ref EVENTS_PUBLISHED: IntCounterVec = IntCounterVec::new(
        Opts::new("edge_fanout_events_published_total", "Events accepted for publish"),
        &["topic"]
    ).expect("metric creation failed");

    /// Messages enqueued into delivery queues
    pub static ref MESSAGES_ENQUEUED: IntCounterVec = IntCounterVec::new(
        Opts::new("edge_fanout_messages_enqueued_total", "Messages enqueued per queue"),
        &["queue"]
    ).expect("metric creation failed");

    /// Delivery outcomes
    pub static ref DELIVERIES: IntCounterVec = IntCounterVec::new(
        Opts::new("edge_fanout_deliveries_total", "Delivery outcomes per queue"),
        &["queue", "outcome"]  // acknowledged/released/expired/abandoned
    ).expect("metric creation failed");

    /// Messages diverted to a dead-letter queue
    pub static ref DEAD_LETTERED: IntCounterVec = IntCounterVec::new(
        Opts::new("edge_fanout_dead_lettered_total", "Messages moved to the dead-letter queue"),
        &["queue"]
    ).expect("metric creation failed");

    /// Current dead-letter queue depth
    pub static ref DEAD_LETTER_DEPTH: IntGaugeVec = IntGaugeVec::new(
        Opts::new("edge_fanout_dead_letter_depth", "Records waiting in the dead-letter queue"),
        &["queue"]
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Metrics that are already registered are skipped, so repeated calls succeed.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Router
        Box::new(ROUTER_DECISIONS.clone()),
        Box::new(AUTH_CACHE_LOOKUPS.clone()),
        Box::new(AUTH_PROVIDER_ERRORS.clone()),
        // Fan-out
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(MESSAGES_ENQUEUED.clone()),
        Box::new(DELIVERIES.clone()),
        Box::new(DEAD_LETTERED.clone()),
        Box::new(DEAD_LETTER_DEPTH.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

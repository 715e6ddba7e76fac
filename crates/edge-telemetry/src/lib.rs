//! # Edge Telemetry
//!
//! Logging and metrics shared by the router, the fan-out layer and the node.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use edge_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_telemetry(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `EDGE_SERVICE_NAME` | `marketplace-edge` | Service name attached to every log line |
//! | `RUST_LOG` / `EDGE_LOG_LEVEL` | `info` | Log level filter |
//! | `EDGE_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `EDGE_JSON_LOGS` | `false` (`true` in containers) | JSON formatted logs |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    gather_metrics, register_metrics, AUTH_CACHE_LOOKUPS, AUTH_PROVIDER_ERRORS, DEAD_LETTERED,
    DEAD_LETTER_DEPTH, DELIVERIES, EVENTS_PUBLISHED, MESSAGES_ENQUEUED, ROUTER_DECISIONS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and register all metrics.
///
/// Safe to call once per process; a second call fails with
/// [`TelemetryError::LoggingInit`] because the global subscriber is already set.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_logging(config)?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Telemetry initialized"
    );
    Ok(())
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

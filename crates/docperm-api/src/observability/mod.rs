//! Structured logging and the Prometheus endpoint.

mod logging;
mod metrics;

pub use logging::{init_logging, LoggingConfig};
pub use metrics::{init_metrics, metrics_handler, MetricsError, MetricsState};

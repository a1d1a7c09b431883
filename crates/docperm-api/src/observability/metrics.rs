//! Prometheus metrics exposition.
//!
//! Counters recorded by the broker and the initialization tracker:
//!
//! - `docperm_secret_cache_hits_total`
//! - `docperm_secret_cache_misses_total{reason}`
//! - `docperm_permissions_minted_total{mode}`
//! - `docperm_permission_conflicts_total`
//! - `docperm_initializations_total{level, outcome}`
//! - `docperm_warm_ticks_total{late}`

use std::sync::Arc;

use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Shared state containing the Prometheus handle for metrics rendering.
#[derive(Clone)]
pub struct MetricsState {
    handle: Arc<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Renders the current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: recorder already installed")]
    AlreadyInstalled,
}

/// Installs the global Prometheus recorder. Call once at startup, before
/// any request is served.
pub fn init_metrics() -> Result<MetricsState, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|_| MetricsError::AlreadyInstalled)?;

    register_default_metrics();

    Ok(MetricsState::new(handle))
}

fn register_default_metrics() {
    metrics::describe_counter!(
        "docperm_secret_cache_hits_total",
        "Permissions served from the secret cache"
    );
    metrics::describe_counter!(
        "docperm_secret_cache_misses_total",
        "Secret cache lookups that required the resource store, by reason"
    );
    metrics::describe_counter!(
        "docperm_permissions_minted_total",
        "Permissions created or renewed in the resource store, by mode"
    );
    metrics::describe_counter!(
        "docperm_permission_conflicts_total",
        "Permission creations rejected with a conflict"
    );
    metrics::describe_counter!(
        "docperm_initializations_total",
        "Database and collection initializations, by level and outcome"
    );
    metrics::describe_counter!(
        "docperm_warm_ticks_total",
        "Warm timer heartbeats, by lateness"
    );
}

/// Prometheus exposition format content type.
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handler for the metrics endpoint.
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], state.render())
}

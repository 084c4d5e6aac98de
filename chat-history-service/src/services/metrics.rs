//! Metrics collection and Prometheus export.
//!
//! Initializes the metrics exporter and renders the text served at /metrics.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::OnceLock;

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics recorder.
///
/// Call once at startup before any metrics are recorded. Until then every
/// counter below is a no-op.
pub fn init_metrics() -> Result<(), AppError> {
    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("failed to install Prometheus recorder: {}", e))
    })?;

    METRICS_HANDLE.set(handle).map_err(|_| {
        AppError::ConfigError(anyhow::anyhow!("metrics handle already initialized"))
    })
}

/// Get the current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized".to_string())
}

pub fn record_message_appended(created: bool) {
    metrics::counter!(
        "chat_messages_appended_total",
        "created" => if created { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_sessions_deleted(count: u64) {
    metrics::counter!("chat_sessions_deleted_total").increment(count);
}

pub fn record_storage_error(operation: &'static str) {
    metrics::counter!("chat_storage_errors_total", "operation" => operation).increment(1);
}

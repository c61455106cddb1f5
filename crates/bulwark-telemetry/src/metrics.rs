//! Prometheus metrics for Bulwark.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `bulwark_requests_total` | Counter | `status` | Requests leaving the pipeline |
//! | `bulwark_request_duration_seconds` | Histogram | - | Time spent in the pipeline |
//! | `bulwark_requests_blocked_total` | Counter | `stage`, `code` | Requests answered by a stage |
//! | `bulwark_log_shipments_failed_total` | Counter | `sink` | Access-log records that were not delivered |
//!
//! Recording functions are no-ops until a recorder is installed, so the
//! pipeline can call them unconditionally.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

/// Request counter name.
pub const REQUESTS_TOTAL: &str = "bulwark_requests_total";
/// Pipeline latency histogram name.
pub const REQUEST_DURATION: &str = "bulwark_request_duration_seconds";
/// Blocked request counter name.
pub const REQUESTS_BLOCKED: &str = "bulwark_requests_blocked_total";
/// Failed log shipment counter name.
pub const SHIPMENTS_FAILED: &str = "bulwark_log_shipments_failed_total";

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether the exporter is installed.
    pub enabled: bool,

    /// Listen address of the scrape endpoint, e.g. `0.0.0.0:9090`.
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

impl MetricsConfig {
    /// Parses [`addr`](Self::addr).
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::InvalidAddress` if it is not a socket address.
    pub fn socket_addr(&self) -> TelemetryResult<SocketAddr> {
        self.addr
            .parse()
            .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", self.addr)))
    }
}

/// Installs the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns an error if the address is invalid or a recorder is already
/// installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr = config.socket_addr()?;
    let handle = PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();
    Ok(())
}

/// Renders metrics in Prometheus format, if initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(REQUESTS_TOTAL, "Requests that left the pipeline, by status");
    describe_histogram!(REQUEST_DURATION, "Time spent in the pipeline in seconds");
    describe_counter!(
        REQUESTS_BLOCKED,
        "Requests answered by a stage instead of the handler"
    );
    describe_counter!(SHIPMENTS_FAILED, "Access-log records that could not be delivered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Records a request leaving the pipeline.
pub fn record_request(status_code: u16, duration: Duration) {
    counter!(REQUESTS_TOTAL, "status" => status_code.to_string()).increment(1);
    histogram!(REQUEST_DURATION).record(duration.as_secs_f64());
}

/// Records a request answered by `stage` with `code`.
pub fn record_blocked(stage: &'static str, code: &'static str) {
    counter!(REQUESTS_BLOCKED, "stage" => stage, "code" => code).increment(1);
}

/// Records a failed access-log shipment.
pub fn record_shipment_failure(sink: &'static str) {
    counter!(SHIPMENTS_FAILED, "sink" => sink).increment(1);
}

//! Prometheus export and the service's domain counters.

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::federation::StoreName;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global recorder. Call once at startup.
pub fn init_metrics() -> Result<(), anyhow::Error> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {}", e))?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| anyhow::anyhow!("metrics recorder already initialized"))
}

/// Current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized".to_string())
}

pub fn record_login(outcome: &'static str) {
    counter!("portal_login_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_lockout() {
    counter!("portal_account_lockouts_total").increment(1);
}

pub fn record_rotation(outcome: &'static str) {
    counter!("portal_refresh_rotations_total", "outcome" => outcome).increment(1);
}

pub fn record_degraded_section(source: StoreName) {
    counter!("portal_degraded_sections_total", "source" => source.as_str()).increment(1);
}

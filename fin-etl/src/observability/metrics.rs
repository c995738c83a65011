//! Prometheus metrics for the pipeline phases.
//!
//! Counters are recorded unconditionally; with no recorder installed (unit
//! tests) every call is a no-op.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::info;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Call once at startup, before any stage
/// runs.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("failed to install Prometheus recorder: {e}"))?;
    HANDLE.set(handle).ok();
    info!("metrics system initialized");
    Ok(())
}

/// Render the current metric values in the Prometheus text format.
#[allow(dead_code)]
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

pub mod fetch {
    /// Record a successfully fetched page
    pub fn page_success() {
        ::metrics::counter!("fin_fetch_pages_success_total").increment(1);
    }

    /// Record a failed page request
    pub fn page_error() {
        ::metrics::counter!("fin_fetch_pages_error_total").increment(1);
    }

    /// Record how many records an extract yielded
    pub fn records_fetched(count: usize) {
        ::metrics::counter!("fin_fetch_records_total").increment(count as u64);
    }
}

pub mod normalize {
    /// Record canonical records produced
    pub fn records_normalized(count: usize) {
        ::metrics::counter!("fin_normalize_records_total").increment(count as u64);
    }

    /// Record a raw record dropped as malformed
    pub fn record_dropped() {
        ::metrics::counter!("fin_normalize_dropped_total").increment(1);
    }
}

pub mod load {
    /// Record rows loaded into a staging table
    pub fn rows_loaded(count: usize) {
        ::metrics::counter!("fin_load_rows_total").increment(count as u64);
    }

    /// Record a fatal staging-load failure
    pub fn load_error() {
        ::metrics::counter!("fin_load_errors_total").increment(1);
    }
}

pub mod merge {
    /// Record rows inserted into a permanent table
    pub fn rows_inserted(count: usize) {
        ::metrics::counter!("fin_merge_rows_inserted_total").increment(count as u64);
    }

    /// Record a fatal merge failure
    pub fn merge_error() {
        ::metrics::counter!("fin_merge_errors_total").increment(1);
    }
}

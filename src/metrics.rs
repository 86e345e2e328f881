//! Run metrics.
//!
//! Counters go through the `metrics` facade and are no-ops until a recorder is
//! installed. The binary installs a Prometheus recorder only when a
//! Pushgateway is configured, then pushes one snapshot at the end of the run.

use crate::constants::PUSHGATEWAY_URL_ENV;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::{info, warn};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics for one pipeline run
pub struct PipelineMetrics;

impl PipelineMetrics {
    pub fn record_fetched(count: usize) {
        ::metrics::counter!("threat_feed_incidents_fetched_total").increment(count as u64);
    }

    pub fn record_malformed_response() {
        ::metrics::counter!("threat_feed_malformed_responses_total").increment(1);
    }

    pub fn record_validation_failure(rows: usize) {
        ::metrics::counter!("threat_feed_validation_failures_total").increment(1);
        ::metrics::counter!("threat_feed_invalid_rows_total").increment(rows as u64);
    }

    pub fn record_dedup(duplicates: usize, unique: usize) {
        ::metrics::counter!("threat_feed_duplicates_total").increment(duplicates as u64);
        ::metrics::counter!("threat_feed_unique_total").increment(unique as u64);
    }

    pub fn record_published(count: usize) {
        ::metrics::counter!("threat_feed_published_total").increment(count as u64);
    }

    pub fn record_publish_failure() {
        ::metrics::counter!("threat_feed_publish_failures_total").increment(1);
    }

    pub fn record_run_duration(seconds: f64) {
        ::metrics::histogram!("threat_feed_run_duration_seconds").record(seconds);
        ::metrics::gauge!("threat_feed_last_run_timestamp_seconds")
            .set(chrono::Utc::now().timestamp() as f64);
    }
}

/// Install the Prometheus recorder if `THREAT_FEED_PUSHGATEWAY_URL` is set.
/// Idempotent.
pub fn init_metrics() {
    let wanted = std::env::var(PUSHGATEWAY_URL_ENV).map_or(false, |v| !v.trim().is_empty());
    if !wanted || HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle);
            info!("Prometheus recorder installed");
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Push the current snapshot to the Pushgateway. Failures are logged only.
pub fn push_to_gateway(instance: &str) {
    let base = match std::env::var(PUSHGATEWAY_URL_ENV) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => return,
    };
    let Some(handle) = HANDLE.get() else {
        return;
    };

    let push_url = format!(
        "{}/metrics/job/threat_feed/instance/{}",
        base.trim_end_matches('/'),
        instance
    );
    let result = reqwest::blocking::Client::new()
        .post(&push_url)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(handle.render())
        .send();

    match result {
        Ok(r) if r.status().is_success() => info!("Pushed metrics to Pushgateway"),
        Ok(r) => warn!("Pushgateway responded with status {}", r.status().as_u16()),
        Err(e) => warn!("Failed to push metrics to Pushgateway: {}", e),
    }
}

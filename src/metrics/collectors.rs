//! High-level recording interface over the raw Prometheus metrics.
//!
//! Every method is a no-op until [`super::init_metrics`] has been called, so
//! library users who do not care about metrics pay nothing.

use super::prometheus::{
    LAST_TOTAL_ENERGY, PARSE_SKIPS_TOTAL, POLL_CYCLES_TOTAL, STAGE_DURATION, STAGE_RUNS_TOTAL,
};

/// Metrics collector for stage runs.
///
/// # Example
///
/// ```ignore
/// use espresso_forge::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
/// collector.record_stage("pw", "success", 812.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a finished stage run.
    ///
    /// # Arguments
    ///
    /// * `stage` - Stage label (e.g. "pw", "bands")
    /// * `status` - Outcome ("success", "failed", "cancelled", "timeout", "error")
    /// * `duration_secs` - Wall-clock duration in seconds
    pub fn record_stage(&self, stage: &str, status: &str, duration_secs: f64) {
        if let Some(runs) = STAGE_RUNS_TOTAL.get() {
            runs.with_label_values(&[stage, status]).inc();
        }

        if let Some(duration) = STAGE_DURATION.get() {
            duration.with_label_values(&[stage]).observe(duration_secs);
        }

        tracing::trace!(stage, status, duration_secs, "Recorded stage metric");
    }

    /// Record one poll cycle.
    pub fn record_poll(&self, stage: &str) {
        if let Some(polls) = POLL_CYCLES_TOTAL.get() {
            polls.with_label_values(&[stage]).inc();
        }
    }

    /// Record marker lines that were skipped during a run.
    pub fn record_parse_skips(&self, stage: &str, count: u64) {
        if count == 0 {
            return;
        }
        if let Some(skips) = PARSE_SKIPS_TOTAL.get() {
            skips.with_label_values(&[stage]).inc_by(count as f64);
        }
    }

    /// Record the latest total energy of a stage.
    pub fn record_energy(&self, stage: &str, energy_ry: f64) {
        if let Some(energy) = LAST_TOTAL_ENERGY.get() {
            energy.with_label_values(&[stage]).set(energy_ry);
        }
    }
}

//! Prometheus metrics registration and export.
//!
//! This module defines the Prometheus metrics used by espresso-forge and
//! provides functions for initializing, registering, and exporting them.

use prometheus::{CounterVec, Encoder, GaugeVec, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::{Mutex, OnceLock};

/// Serializes initialization so every static comes from the same registry.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Global Prometheus registry for all espresso-forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total number of stage runs, labeled by stage and status.
pub static STAGE_RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Stage wall-clock duration in seconds, labeled by stage.
pub static STAGE_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Total poll cycles performed while solvers were running, labeled by stage.
pub static POLL_CYCLES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Marker lines that matched but could not be parsed, labeled by stage.
pub static PARSE_SKIPS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Latest total energy in Rydberg reported by a stage.
pub static LAST_TOTAL_ENERGY: OnceLock<GaugeVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Calling this more than once is harmless: later calls leave the first
/// registry in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric creation or registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let stage_runs_total = CounterVec::new(
        Opts::new("espresso_forge_stage_runs_total", "Total number of stage runs"),
        &["stage", "status"],
    )?;

    let stage_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "espresso_forge_stage_duration_seconds",
            "Stage wall-clock duration in seconds",
        )
        .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0, 86400.0]),
        &["stage"],
    )?;

    let poll_cycles_total = CounterVec::new(
        Opts::new(
            "espresso_forge_poll_cycles_total",
            "Total poll cycles performed while solvers were running",
        ),
        &["stage"],
    )?;

    let parse_skips_total = CounterVec::new(
        Opts::new(
            "espresso_forge_parse_skips_total",
            "Marker lines that could not be parsed",
        ),
        &["stage"],
    )?;

    let last_total_energy = GaugeVec::new(
        Opts::new(
            "espresso_forge_last_total_energy_ry",
            "Latest total energy in Rydberg",
        ),
        &["stage"],
    )?;

    registry.register(Box::new(stage_runs_total.clone()))?;
    registry.register(Box::new(stage_duration.clone()))?;
    registry.register(Box::new(poll_cycles_total.clone()))?;
    registry.register(Box::new(parse_skips_total.clone()))?;
    registry.register(Box::new(last_total_energy.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = STAGE_RUNS_TOTAL.set(stage_runs_total);
    let _ = STAGE_DURATION.set(stage_duration);
    let _ = POLL_CYCLES_TOTAL.set(poll_cycles_total);
    let _ = PARSE_SKIPS_TOTAL.set(parse_skips_total);
    let _ = LAST_TOTAL_ENERGY.set(last_total_energy);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// If the registry has not been initialized or encoding fails, the returned
/// text is a Prometheus comment describing the problem.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

//! Metrics module for Prometheus-based monitoring.
//!
//! Counts stage runs and poll cycles, tracks stage durations, marker parse
//! skips, and the latest reported energy.
//!
//! # Example
//!
//! ```ignore
//! use espresso_forge::metrics::{init_metrics, export_metrics};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! // ... run stages ...
//! std::fs::write("metrics.prom", export_metrics())?;
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    LAST_TOTAL_ENERGY, PARSE_SKIPS_TOTAL, POLL_CYCLES_TOTAL, REGISTRY, STAGE_DURATION,
    STAGE_RUNS_TOTAL,
};

//! Timing configuration for monitored runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay before the output file is first read.
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(5);

/// Poll interval for the main solver.
pub const DEFAULT_SOLVER_POLL: Duration = Duration::from_secs(5);

/// Poll interval for post-processing tools.
pub const DEFAULT_POST_POLL: Duration = Duration::from_millis(500);

/// Settings shared by every run of a [`super::ProcessMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Wait between spawning the process and the first read.
    pub warmup: Duration,
    /// Hard limit on the wall-clock time of one run.
    pub timeout: Option<Duration>,
}

impl MonitorSettings {
    /// Creates settings with the default warm-up and no timeout.
    pub fn new() -> Self {
        Self {
            warmup: DEFAULT_WARMUP,
            timeout: None,
        }
    }

    /// Sets the warm-up delay.
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Sets the per-run timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::new()
    }
}

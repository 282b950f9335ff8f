//! Solver configuration.
//!
//! Executable names, launcher, worker count, pseudopotential directory and
//! monitor timings. Values are layered: built-in defaults, then an optional
//! YAML file, then `ESPRESSO_*` environment variables, then CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runner::config::{DEFAULT_POST_POLL, DEFAULT_SOLVER_POLL, DEFAULT_WARMUP};
use crate::runner::MonitorSettings;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The configuration file could not be parsed.
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration handed to the stage runner.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    // Launch settings
    /// Parallel launcher prefixed to every command (e.g. `mpirun`); `None` runs directly.
    pub launcher: Option<String>,
    /// Worker count passed to the launcher as `-np <N>`.
    pub workers: usize,

    // Executables
    /// Main solver executable.
    pub pw: String,
    /// Band-structure post-processor.
    pub bands: String,
    /// Density-of-states post-processor.
    pub dos: String,
    /// Projected density-of-states post-processor.
    pub projwfc: String,

    /// Pseudopotential directory, exported to solvers as `ESPRESSO_PSEUDO`.
    pub pseudo_dir: Option<PathBuf>,

    // Monitor timings
    /// Delay between launch and first read of the output file.
    pub warmup: Duration,
    /// Poll interval for the main solver.
    pub solver_poll_interval: Duration,
    /// Poll interval for post-processing tools.
    pub post_poll_interval: Duration,
    /// Optional wall-clock limit per stage.
    pub stage_timeout: Option<Duration>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            launcher: Some("mpirun".to_string()),
            workers: 4,

            pw: "pw.x".to_string(),
            bands: "bands.x".to_string(),
            dos: "dos.x".to_string(),
            projwfc: "projwfc.x".to_string(),

            pseudo_dir: None,

            warmup: DEFAULT_WARMUP,
            solver_poll_interval: DEFAULT_SOLVER_POLL,
            post_poll_interval: DEFAULT_POST_POLL,
            stage_timeout: None,
        }
    }
}

/// On-disk form of [`SolverConfig`]; every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub launcher: Option<String>,
    pub workers: Option<usize>,
    pub pw: Option<String>,
    pub bands: Option<String>,
    pub dos: Option<String>,
    pub projwfc: Option<String>,
    pub pseudo_dir: Option<PathBuf>,
    pub warmup_secs: Option<f64>,
    pub solver_poll_secs: Option<f64>,
    pub post_poll_secs: Option<f64>,
    pub stage_timeout_secs: Option<f64>,
}

impl SolverConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads defaults overlaid with a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let file: ConfigFile = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::default();
        config.apply_file(file)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies the values present in a parsed config file.
    pub fn apply_file(&mut self, file: ConfigFile) -> Result<(), ConfigError> {
        if let Some(launcher) = file.launcher {
            self.launcher = non_empty(launcher);
        }
        if let Some(workers) = file.workers {
            self.workers = workers;
        }
        if let Some(pw) = file.pw {
            self.pw = pw;
        }
        if let Some(bands) = file.bands {
            self.bands = bands;
        }
        if let Some(dos) = file.dos {
            self.dos = dos;
        }
        if let Some(projwfc) = file.projwfc {
            self.projwfc = projwfc;
        }
        if let Some(dir) = file.pseudo_dir {
            self.pseudo_dir = Some(dir);
        }
        if let Some(secs) = file.warmup_secs {
            self.warmup = seconds(secs, "warmup_secs")?;
        }
        if let Some(secs) = file.solver_poll_secs {
            self.solver_poll_interval = seconds(secs, "solver_poll_secs")?;
        }
        if let Some(secs) = file.post_poll_secs {
            self.post_poll_interval = seconds(secs, "post_poll_secs")?;
        }
        if let Some(secs) = file.stage_timeout_secs {
            self.stage_timeout = Some(seconds(secs, "stage_timeout_secs")?);
        }
        Ok(())
    }

    /// Creates configuration from defaults overlaid with environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ESPRESSO_LAUNCHER`: Parallel launcher, empty to disable (default: mpirun)
    /// - `ESPRESSO_WORKERS`: Worker count (default: 4)
    /// - `ESPRESSO_PW`, `ESPRESSO_BANDS`, `ESPRESSO_DOS`, `ESPRESSO_PROJWFC`: Executables
    /// - `ESPRESSO_PSEUDO_DIR`: Pseudopotential directory
    /// - `ESPRESSO_WARMUP_SECS`: Warm-up delay (default: 5)
    /// - `ESPRESSO_SOLVER_POLL_SECS`: Main solver poll interval (default: 5)
    /// - `ESPRESSO_POST_POLL_SECS`: Post-processing poll interval (default: 0.5)
    /// - `ESPRESSO_STAGE_TIMEOUT_SECS`: Per-stage time limit (default: none)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlays `ESPRESSO_*` environment variables onto this configuration.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("ESPRESSO_LAUNCHER") {
            self.launcher = non_empty(val);
        }

        if let Ok(val) = std::env::var("ESPRESSO_WORKERS") {
            self.workers = parse_env_value(&val, "ESPRESSO_WORKERS")?;
        }

        if let Ok(val) = std::env::var("ESPRESSO_PW") {
            self.pw = val;
        }

        if let Ok(val) = std::env::var("ESPRESSO_BANDS") {
            self.bands = val;
        }

        if let Ok(val) = std::env::var("ESPRESSO_DOS") {
            self.dos = val;
        }

        if let Ok(val) = std::env::var("ESPRESSO_PROJWFC") {
            self.projwfc = val;
        }

        if let Ok(val) = std::env::var("ESPRESSO_PSEUDO_DIR") {
            self.pseudo_dir = non_empty(val).map(PathBuf::from);
        }

        if let Ok(val) = std::env::var("ESPRESSO_WARMUP_SECS") {
            let secs: f64 = parse_env_value(&val, "ESPRESSO_WARMUP_SECS")?;
            self.warmup = seconds(secs, "ESPRESSO_WARMUP_SECS")?;
        }

        if let Ok(val) = std::env::var("ESPRESSO_SOLVER_POLL_SECS") {
            let secs: f64 = parse_env_value(&val, "ESPRESSO_SOLVER_POLL_SECS")?;
            self.solver_poll_interval = seconds(secs, "ESPRESSO_SOLVER_POLL_SECS")?;
        }

        if let Ok(val) = std::env::var("ESPRESSO_POST_POLL_SECS") {
            let secs: f64 = parse_env_value(&val, "ESPRESSO_POST_POLL_SECS")?;
            self.post_poll_interval = seconds(secs, "ESPRESSO_POST_POLL_SECS")?;
        }

        if let Ok(val) = std::env::var("ESPRESSO_STAGE_TIMEOUT_SECS") {
            let secs: f64 = parse_env_value(&val, "ESPRESSO_STAGE_TIMEOUT_SECS")?;
            self.stage_timeout = Some(seconds(secs, "ESPRESSO_STAGE_TIMEOUT_SECS")?);
        }

        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "workers must be greater than 0".to_string(),
            ));
        }

        for (name, exe) in [
            ("pw", &self.pw),
            ("bands", &self.bands),
            ("dos", &self.dos),
            ("projwfc", &self.projwfc),
        ] {
            if exe.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} executable cannot be empty",
                    name
                )));
            }
        }

        if self.solver_poll_interval.is_zero() || self.post_poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll intervals must be greater than 0".to_string(),
            ));
        }

        if let Some(timeout) = self.stage_timeout {
            if timeout <= self.warmup {
                return Err(ConfigError::ValidationFailed(
                    "stage_timeout must be longer than the warm-up delay".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Monitor settings derived from this configuration.
    pub fn monitor_settings(&self) -> MonitorSettings {
        let settings = MonitorSettings::new().with_warmup(self.warmup);
        match self.stage_timeout {
            Some(timeout) => settings.with_timeout(timeout),
            None => settings,
        }
    }

    /// Builder method to set the launcher.
    pub fn with_launcher(mut self, launcher: Option<String>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Builder method to set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Builder method to set the main solver executable.
    pub fn with_pw(mut self, exe: impl Into<String>) -> Self {
        self.pw = exe.into();
        self
    }

    /// Builder method to set the bands.x executable.
    pub fn with_bands(mut self, exe: impl Into<String>) -> Self {
        self.bands = exe.into();
        self
    }

    /// Builder method to set the dos.x executable.
    pub fn with_dos(mut self, exe: impl Into<String>) -> Self {
        self.dos = exe.into();
        self
    }

    /// Builder method to set the projwfc.x executable.
    pub fn with_projwfc(mut self, exe: impl Into<String>) -> Self {
        self.projwfc = exe.into();
        self
    }

    /// Builder method to set the pseudopotential directory.
    pub fn with_pseudo_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pseudo_dir = Some(dir.into());
        self
    }

    /// Builder method to set the warm-up delay.
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Builder method to set both poll intervals.
    pub fn with_poll_intervals(mut self, solver: Duration, post: Duration) -> Self {
        self.solver_poll_interval = solver;
        self.post_poll_interval = post;
        self
    }

    /// Builder method to set the per-stage timeout.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn seconds(secs: f64, key: &str) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Parses an environment variable value to the specified type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

//! Calculation stages.
//!
//! One function per solver mode. Each builds the command line for its
//! executable and hands it to the [`ProcessMonitor`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::command::{InputMode, SolverCommand};
use super::monitor::{MonitorMode, ProcessMonitor};
use super::observer::ProgressObserver;
use super::result::RunResult;
use super::CancelToken;
use crate::config::SolverConfig;
use crate::error::{MonitorError, StageError};
use crate::metrics::MetricsCollector;
use crate::pipeline::StageStep;

/// The four solver modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Self-consistent, non-self-consistent and band calculations (pw.x).
    Pw,
    /// Band-structure post-processing (bands.x).
    Bands,
    /// Density of states (dos.x).
    Dos,
    /// Projected density of states (projwfc.x).
    Pdos,
}

impl StageKind {
    /// All stage kinds.
    pub fn all() -> &'static [StageKind] {
        &[StageKind::Pw, StageKind::Bands, StageKind::Dos, StageKind::Pdos]
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            StageKind::Pw => "pw",
            StageKind::Bands => "bands",
            StageKind::Dos => "dos",
            StageKind::Pdos => "pdos",
        }
    }

    /// Executable configured for this stage.
    pub fn program<'a>(&self, config: &'a SolverConfig) -> &'a str {
        match self {
            StageKind::Pw => &config.pw,
            StageKind::Bands => &config.bands,
            StageKind::Dos => &config.dos,
            StageKind::Pdos => &config.projwfc,
        }
    }

    pub fn input_mode(&self) -> InputMode {
        match self {
            StageKind::Pw => InputMode::Argument,
            _ => InputMode::Stdin,
        }
    }

    pub fn monitor_mode(&self) -> MonitorMode {
        match self {
            StageKind::Pw => MonitorMode::Progress,
            _ => MonitorMode::Tail,
        }
    }

    pub fn poll_interval(&self, config: &SolverConfig) -> Duration {
        match self {
            StageKind::Pw => config.solver_poll_interval,
            _ => config.post_poll_interval,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pw" | "pw.x" => Ok(StageKind::Pw),
            "bands" | "bands.x" => Ok(StageKind::Bands),
            "dos" | "dos.x" => Ok(StageKind::Dos),
            "pdos" | "projwfc" | "projwfc.x" => Ok(StageKind::Pdos),
            other => Err(format!("unknown stage: {}", other)),
        }
    }
}

/// Runs the pipeline's steps, one external process at a time.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Runs one step whose input deck is already on disk.
    async fn execute(
        &self,
        step: &StageStep,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunResult, StageError>;
}

/// Runs calculation stages with an explicit [`SolverConfig`].
#[derive(Debug, Clone)]
pub struct StageRunner {
    config: SolverConfig,
    monitor: ProcessMonitor,
    metrics: MetricsCollector,
}

impl StageRunner {
    /// Creates a runner; monitor settings come from `config`.
    pub fn new(config: SolverConfig) -> Self {
        let monitor = ProcessMonitor::new(config.monitor_settings());
        Self {
            config,
            monitor,
            metrics: MetricsCollector::new(),
        }
    }

    /// Aborts runs when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.monitor = self.monitor.with_cancel(cancel);
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.monitor.cancel_token()
    }

    /// Builds the command line for one stage.
    ///
    /// `input` and `output` are resolved against `workdir`, which is also the
    /// process working directory. A relative `workdir` is taken from the
    /// current directory, so the child never resolves it a second time.
    pub fn command_for(
        &self,
        kind: StageKind,
        workdir: &Path,
        input: &Path,
        output: &Path,
    ) -> SolverCommand {
        let program = kind.program(&self.config);
        let workdir = absolute_dir(workdir);
        let output = workdir.join(output);

        let mut command = match &self.config.launcher {
            Some(launcher) => SolverCommand::new(launcher.as_str(), output).args([
                "-np".to_string(),
                self.config.workers.to_string(),
                program.to_string(),
            ]),
            None => SolverCommand::new(program, output),
        };

        command = command
            .input(workdir.join(input), kind.input_mode())
            .current_dir(workdir);

        if let Some(dir) = &self.config.pseudo_dir {
            command = command.env("ESPRESSO_PSEUDO", dir.display().to_string());
        }

        command
    }

    /// Runs the main solver (pw.x) with progress extraction.
    pub async fn run_pw(
        &self,
        workdir: &Path,
        input: &Path,
        output: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunResult, StageError> {
        self.run_stage(StageKind::Pw, workdir, input, output, observer)
            .await
    }

    /// Runs band-structure post-processing (bands.x).
    pub async fn run_bands(
        &self,
        workdir: &Path,
        input: &Path,
        output: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunResult, StageError> {
        self.run_stage(StageKind::Bands, workdir, input, output, observer)
            .await
    }

    /// Runs the density-of-states calculation (dos.x).
    pub async fn run_dos(
        &self,
        workdir: &Path,
        input: &Path,
        output: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunResult, StageError> {
        self.run_stage(StageKind::Dos, workdir, input, output, observer)
            .await
    }

    /// Runs the projected density-of-states calculation (projwfc.x).
    pub async fn run_pdos(
        &self,
        workdir: &Path,
        input: &Path,
        output: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunResult, StageError> {
        self.run_stage(StageKind::Pdos, workdir, input, output, observer)
            .await
    }

    /// Runs any stage kind.
    ///
    /// A non-zero exit becomes [`StageError::ProcessFailed`] carrying the
    /// full [`RunResult`].
    pub async fn run_stage(
        &self,
        kind: StageKind,
        workdir: &Path,
        input: &Path,
        output: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunResult, StageError> {
        let command = self.command_for(kind, workdir, input, output);
        let label = kind.label();

        let result = match self
            .monitor
            .run(
                label,
                &command,
                kind.poll_interval(&self.config),
                kind.monitor_mode(),
                observer,
            )
            .await
        {
            Ok(result) => result,
            Err(e) => {
                let status = match &e {
                    MonitorError::Cancelled { .. } => "cancelled",
                    MonitorError::Timeout { .. } => "timeout",
                    _ => "error",
                };
                self.metrics.record_stage(label, status, 0.0);
                return Err(e.into());
            }
        };

        self.metrics.record_stage(
            label,
            &result.status.to_string(),
            result.duration.as_secs_f64(),
        );
        if let Some(energy) = result.sample.energy {
            self.metrics.record_energy(label, energy);
        }

        if result.is_success() {
            info!(stage = label, duration = ?result.duration, "Stage completed");
            Ok(result)
        } else {
            warn!(stage = label, exit_code = result.exit_code, "Stage failed");
            Err(StageError::ProcessFailed {
                stage: kind,
                result: Box::new(result),
            })
        }
    }
}

/// `path` anchored at the current directory when it is relative.
///
/// Falls back to `path` unchanged if the current directory is unavailable.
pub fn absolute_dir(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[async_trait]
impl StageExecutor for StageRunner {
    async fn execute(
        &self,
        step: &StageStep,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunResult, StageError> {
        self.run_stage(step.kind, &step.workdir, &step.input, &step.output, observer)
            .await
    }
}

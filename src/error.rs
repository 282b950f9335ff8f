//! Error types for espresso-forge operations.
//!
//! Defines error types for the major subsystems:
//! - Process launch and monitoring
//! - Calculation stages
//! - Input deck construction and rendering
//! - Pipeline execution

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::runner::result::RunResult;
use crate::runner::stage::StageKind;

/// Errors that can occur while launching or monitoring a solver process.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Input file {} does not exist", .path.display())]
    InputMissing { path: PathBuf },

    #[error("Output file {} does not exist after the warm-up delay", .path.display())]
    OutputMissing { path: PathBuf },

    #[error("Run of `{command}` was cancelled")]
    Cancelled { command: String },

    #[error("Run of `{command}` timed out after {limit:?}")]
    Timeout { command: String, limit: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Command line of the run, when the error concerns a launched command.
    pub fn command(&self) -> Option<&str> {
        match self {
            MonitorError::Spawn { command, .. }
            | MonitorError::Cancelled { command }
            | MonitorError::Timeout { command, .. } => Some(command),
            _ => None,
        }
    }
}

/// Errors that can occur while running a calculation stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(
        "{stage} stage failed: `{}` exited with code {}",
        .result.command,
        .result.exit_code
    )]
    ProcessFailed {
        stage: StageKind,
        result: Box<RunResult>,
    },

    #[error("{0}")]
    Monitor(#[from] MonitorError),
}

impl StageError {
    /// Exit code of the failed process, if the process ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            StageError::ProcessFailed { result, .. } => Some(result.exit_code),
            StageError::Monitor(_) => None,
        }
    }

    /// Command line of the failed stage, when one was built.
    pub fn command(&self) -> Option<&str> {
        match self {
            StageError::ProcessFailed { result, .. } => Some(&result.command),
            StageError::Monitor(e) => e.command(),
        }
    }

    /// Run result of the failed process, if the process ran to completion.
    pub fn run_result(&self) -> Option<&RunResult> {
        match self {
            StageError::ProcessFailed { result, .. } => Some(result),
            StageError::Monitor(_) => None,
        }
    }
}

/// Errors that can occur while building or rendering an input deck.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error("Invalid deck document: {0}")]
    InvalidDocument(String),

    #[error("Unsupported value for '{section}.{key}': {reason}")]
    UnsupportedValue {
        section: String,
        key: String,
        reason: String,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a pipeline before or after its stages run.
///
/// A failing stage does not produce a `PipelineError`; it halts the pipeline
/// and is recorded in the report.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Working directory {} does not exist", .0.display())]
    WorkdirMissing(PathBuf),

    #[error("Unknown pipeline step '{0}'")]
    UnknownStep(String),

    #[error("Failed to write input deck: {0}")]
    Deck(#[from] DeckError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

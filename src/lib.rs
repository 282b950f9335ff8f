//! espresso-forge: Quantum ESPRESSO process orchestration and progress monitoring.
//!
//! This library launches the solver executables, follows their output files
//! while they run and chains the band-structure stages for one material.

// Core modules
pub mod cli;
pub mod config;
pub mod deck;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod runner;
pub mod scanner;

// Re-export commonly used types
pub use config::{ConfigError, SolverConfig};
pub use error::{DeckError, MonitorError, PipelineError, StageError};
pub use runner::{RunResult, RunStatus, StageKind, StageRunner};
pub use scanner::{scan, ProgressSample};

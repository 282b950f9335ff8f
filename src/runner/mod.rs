//! Solver runner.
//!
//! Launches Quantum ESPRESSO executables as child processes and follows
//! their output files while they run.
//!
//! # Architecture
//!
//! ```text
//! StageRunner → SolverCommand → ProcessMonitor → OutputTail → ScanState → ProgressObserver
//! ```
//!
//! The monitor:
//! 1. Spawns the process with stdout redirected to the output file
//! 2. Waits for the warm-up delay, then opens the output file once
//! 3. Reads newly appended text on every poll and reports it
//! 4. Reads one last time after the exit and builds a [`RunResult`]
//!
//! # Example
//!
//! ```ignore
//! use espresso_forge::config::SolverConfig;
//! use espresso_forge::runner::{StageRunner, TracingObserver};
//!
//! let runner = StageRunner::new(SolverConfig::from_env()?);
//! let mut observer = TracingObserver::new();
//! let result = runner
//!     .run_pw(workdir, "WS2.scf.pwi".as_ref(), "WS2.scf.pwo".as_ref(), &mut observer)
//!     .await?;
//!
//! println!("Final energy: {:?} Ry", result.sample.energy);
//! ```

pub mod cancel;
pub mod command;
pub mod config;
pub mod monitor;
pub mod observer;
pub mod result;
pub mod stage;
pub mod tail;

pub use cancel::CancelToken;
pub use command::{InputMode, SolverCommand};
pub use config::MonitorSettings;
pub use monitor::{MonitorMode, ProcessMonitor};
pub use observer::{
    ConsoleObserver, EnergyTracker, LineBuffer, NullObserver, ProgressObserver, ProgressReport,
    TracingObserver,
};
pub use result::{RunResult, RunStatus};
pub use stage::{absolute_dir, StageExecutor, StageKind, StageRunner};
pub use tail::OutputTail;

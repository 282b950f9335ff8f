//! Multi-stage calculation pipelines.
//!
//! # Pipeline Flow
//!
//! 1. **Plan**: The band-structure plan lists every step for one material
//! 2. **Decks**: Post-processing decks are written just before their step
//! 3. **Execution**: Each step runs through a [`StageExecutor`](crate::runner::StageExecutor)
//! 4. **Halt**: The first failed step stops the run
//! 5. **Summary**: The report is saved as `<prefix>.pipeline.json`
//!
//! # Example
//!
//! ```rust,ignore
//! use espresso_forge::config::SolverConfig;
//! use espresso_forge::pipeline::{Pipeline, PipelinePlan};
//! use espresso_forge::runner::{StageRunner, TracingObserver};
//!
//! let plan = PipelinePlan::band_structure("./results/WS2", "WS2");
//! let pipeline = Pipeline::new(StageRunner::new(SolverConfig::from_env()?));
//!
//! let report = pipeline.run(&plan, &mut TracingObserver::new()).await?;
//! if let Some(halt) = &report.halted {
//!     eprintln!("stopped at {}: {}", halt.step, halt.reason);
//! }
//! ```

pub mod orchestrator;
pub mod plan;

pub use orchestrator::{HaltRecord, Pipeline, PipelineReport, StepRecord};
pub use plan::{summary_path, PipelinePlan, StageStep};

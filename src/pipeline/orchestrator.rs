//! Sequential pipeline driver.
//!
//! Runs the steps of a [`PipelinePlan`] one at a time and stops at the first
//! step that fails. Every run ends with a [`PipelineReport`] written next to
//! the stage outputs.

use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::plan::{PipelinePlan, StageStep};
use crate::error::{PipelineError, StageError};
use crate::runner::{ProgressObserver, RunResult, StageExecutor};

/// A step that completed successfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub result: RunResult,
}

/// Why the pipeline stopped early.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaltRecord {
    /// Name of the step that failed.
    pub step: String,
    /// Command line, when the process was launched.
    pub command: Option<String>,
    /// Exit code, when the process ran to completion.
    pub exit_code: Option<i32>,
    pub reason: String,
}

impl HaltRecord {
    fn from_stage_error(step: &StageStep, err: &StageError) -> Self {
        Self {
            step: step.name.clone(),
            command: err.command().map(str::to_string),
            exit_code: err.exit_code(),
            reason: err.to_string(),
        }
    }

    fn input_missing(step: &StageStep) -> Self {
        Self {
            step: step.name.clone(),
            command: None,
            exit_code: None,
            reason: format!("input deck {} does not exist", step.input_path().display()),
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub prefix: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Steps that completed, in order.
    pub steps: Vec<StepRecord>,
    /// Set when a step failed; later steps were not run.
    pub halted: Option<HaltRecord>,
}

impl PipelineReport {
    fn new(prefix: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            prefix: prefix.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            steps: Vec::new(),
            halted: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.halted.is_none()
    }

    /// Final energy of the last pw.x step that reported one.
    pub fn final_energy(&self) -> Option<f64> {
        self.steps.iter().rev().find_map(|s| s.result.sample.energy)
    }

    /// Writes the report as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reads a report written by [`PipelineReport::save`].
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Drives a plan through a [`StageExecutor`].
pub struct Pipeline {
    executor: Box<dyn StageExecutor>,
    write_summary: bool,
}

impl Pipeline {
    pub fn new(executor: impl StageExecutor + 'static) -> Self {
        Self {
            executor: Box::new(executor),
            write_summary: true,
        }
    }

    /// Skips writing `<prefix>.pipeline.json`.
    pub fn without_summary(mut self) -> Self {
        self.write_summary = false;
        self
    }

    /// Runs every step of `plan` in order.
    ///
    /// Stage failures halt the pipeline and are recorded in the report;
    /// they are not returned as errors. Errors are reserved for problems
    /// outside any single stage (missing working directory, unwritable
    /// deck or summary).
    pub async fn run(
        &self,
        plan: &PipelinePlan,
        observer: &mut dyn ProgressObserver,
    ) -> Result<PipelineReport, PipelineError> {
        if !plan.workdir.is_dir() {
            return Err(PipelineError::WorkdirMissing(plan.workdir.clone()));
        }

        let start = Instant::now();
        let mut report = PipelineReport::new(&plan.prefix);
        let total = plan.steps.len();

        info!(run_id = %report.run_id, prefix = %plan.prefix, steps = total, "Starting pipeline");

        for (index, step) in plan.steps.iter().enumerate() {
            if let Some(deck) = &step.deck {
                deck.write_to(&step.input_path())?;
            } else if !step.input_path().is_file() {
                let halt = HaltRecord::input_missing(step);
                error!(step = %step.name, reason = %halt.reason, "Pipeline halted");
                report.halted = Some(halt);
                break;
            }

            info!(step = %step.name, kind = %step.kind, "Running step {}/{}", index + 1, total);

            match self.executor.execute(step, observer).await {
                Ok(result) => {
                    report.steps.push(StepRecord {
                        step: step.name.clone(),
                        result,
                    });
                }
                Err(e) => {
                    let halt = HaltRecord::from_stage_error(step, &e);
                    error!(step = %step.name, error = %e, "Pipeline halted");
                    report.halted = Some(halt);
                    break;
                }
            }
        }

        report.completed_at = Some(Utc::now());

        if report.is_success() {
            info!(duration = ?start.elapsed(), "Pipeline completed");
        } else {
            let remaining = total - report.steps.len() - 1;
            warn!(remaining, "Pipeline stopped before completing all steps");
        }

        if self.write_summary {
            let path = plan.summary_path();
            report.save(&path)?;
            info!(path = %path.display(), "Wrote pipeline summary");
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::runner::{NullObserver, StageKind};
    use crate::scanner::ProgressSample;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct FakeExecutor {
        fail_on: Option<&'static str>,
        executed: Arc<Mutex<Vec<String>>>,
    }

    impl FakeExecutor {
        fn new(fail_on: Option<&'static str>) -> (Self, Arc<Mutex<Vec<String>>>) {
            let executed = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    fail_on,
                    executed: executed.clone(),
                },
                executed,
            )
        }
    }

    #[async_trait]
    impl StageExecutor for FakeExecutor {
        async fn execute(
            &self,
            step: &StageStep,
            _observer: &mut dyn ProgressObserver,
        ) -> Result<RunResult, StageError> {
            self.executed.lock().unwrap().push(step.name.clone());

            let exit_code = if self.fail_on == Some(step.name.as_str()) { 1 } else { 0 };
            let sample = ProgressSample {
                energy: (step.kind == StageKind::Pw).then_some(-123.46),
                ..Default::default()
            };
            let result = RunResult::from_exit(
                step.kind.label(),
                format!("fake {}", step.name),
                exit_code,
                sample,
                Duration::from_millis(5),
            );

            if result.is_success() {
                Ok(result)
            } else {
                Err(StageError::ProcessFailed {
                    stage: step.kind,
                    result: Box::new(result),
                })
            }
        }
    }

    fn prepare(dir: &Path) -> PipelinePlan {
        for name in ["scf", "bands", "nscf"] {
            std::fs::write(dir.join(format!("WS2.{}.pwi", name)), "&CONTROL\n/").unwrap();
        }
        PipelinePlan::band_structure(dir, "WS2")
    }

    #[tokio::test]
    async fn test_runs_all_steps_and_writes_decks() {
        let dir = tempfile::TempDir::new().unwrap();
        let plan = prepare(dir.path());
        let (executor, executed) = FakeExecutor::new(None);

        let report = Pipeline::new(executor)
            .run(&plan, &mut NullObserver)
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.steps.len(), 8);
        assert_eq!(executed.lock().unwrap().len(), 8);
        assert_eq!(report.final_energy(), Some(-123.46));
        assert!(dir.path().join("WS2.bands-pp-up.in").is_file());
        assert!(dir.path().join("WS2.pdos.in").is_file());

        let saved = PipelineReport::load(&plan.summary_path()).unwrap();
        assert_eq!(saved.run_id, report.run_id);
        assert_eq!(saved.steps.len(), 8);
    }

    #[tokio::test]
    async fn test_halts_at_first_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let plan = prepare(dir.path());
        let (executor, executed) = FakeExecutor::new(Some("bands-pp-up"));

        let report = Pipeline::new(executor)
            .run(&plan, &mut NullObserver)
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(
            *executed.lock().unwrap(),
            vec!["scf", "bands", "bands-pp-flat", "bands-pp-up"]
        );
        let halt = report.halted.unwrap();
        assert_eq!(halt.step, "bands-pp-up");
        assert_eq!(halt.exit_code, Some(1));
        assert_eq!(halt.command.as_deref(), Some("fake bands-pp-up"));
        assert!(!dir.path().join("WS2.dos.in").exists());
    }

    #[tokio::test]
    async fn test_missing_pw_input_halts_before_launch() {
        let dir = tempfile::TempDir::new().unwrap();
        let plan = PipelinePlan::band_structure(dir.path(), "WS2");
        let (executor, executed) = FakeExecutor::new(None);

        let report = Pipeline::new(executor)
            .without_summary()
            .run(&plan, &mut NullObserver)
            .await
            .unwrap();

        assert!(executed.lock().unwrap().is_empty());
        let halt = report.halted.unwrap();
        assert_eq!(halt.step, "scf");
        assert_eq!(halt.exit_code, None);
        assert!(!plan.summary_path().exists());
    }

    #[tokio::test]
    async fn test_missing_workdir() {
        let plan = PipelinePlan::band_structure("/definitely/not/a/workdir", "WS2");
        let (executor, _) = FakeExecutor::new(None);
        let err = Pipeline::new(executor)
            .run(&plan, &mut NullObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::WorkdirMissing(_)));
    }

    #[test]
    fn test_halt_record_keeps_command_of_cancelled_run() {
        let step = StageStep::new("scf", StageKind::Pw, "/w", "a.pwi", "a.pwo");
        let err = StageError::Monitor(MonitorError::Cancelled {
            command: "pw.x".to_string(),
        });
        let halt = HaltRecord::from_stage_error(&step, &err);
        assert_eq!(halt.command.as_deref(), Some("pw.x"));
        assert_eq!(halt.exit_code, None);
        assert!(halt.reason.contains("cancelled"));
    }
}

//! Results of monitored solver runs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scanner::ProgressSample;

/// Terminal outcome of one monitored solver process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Stage label (e.g. `pw`, `bands`).
    pub stage: String,
    /// Shell-like rendering of the command that was run.
    pub command: String,
    /// Exit code reported by the process (-1 when killed by a signal).
    pub exit_code: i32,
    /// Status derived from the exit code.
    pub status: RunStatus,
    /// Latest progress markers seen in the output.
    pub sample: ProgressSample,
    /// Total duration of the run, warm-up included.
    pub duration: Duration,
    /// Timestamp when the process was launched.
    pub started_at: DateTime<Utc>,
    /// Timestamp when the final output pass completed.
    pub completed_at: DateTime<Utc>,
    /// Number of poll cycles performed while the process was alive.
    pub polls: u64,
}

impl RunResult {
    /// Builds the result of a finished process; the status follows the exit code.
    pub fn from_exit(
        stage: impl Into<String>,
        command: impl Into<String>,
        exit_code: i32,
        sample: ProgressSample,
        duration: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            stage: stage.into(),
            command: command.into(),
            exit_code,
            status: RunStatus::from_exit_code(exit_code),
            sample,
            duration,
            started_at: now - chrono::Duration::from_std(duration).unwrap_or_default(),
            completed_at: now,
            polls: 0,
        }
    }

    /// Sets the poll count.
    pub fn with_polls(mut self, polls: u64) -> Self {
        self.polls = polls;
        self
    }

    /// Returns true if the process exited with code zero.
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Human-readable failure description, `None` for successful runs.
    pub fn failure_message(&self) -> Option<String> {
        match self.status {
            RunStatus::Success => None,
            RunStatus::Failed => Some(format!(
                "`{}` exited with code {}",
                self.command, self.exit_code
            )),
        }
    }
}

/// Status of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Process exited with code zero.
    Success,
    /// Process exited with a non-zero code.
    Failed,
}

impl RunStatus {
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            RunStatus::Success
        } else {
            RunStatus::Failed
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_result_success() {
        let sample = ProgressSample {
            energy: Some(-22.84),
            cpu_time: Some("0.5 secs".into()),
            converged: true,
        };
        let result = RunResult::from_exit(
            "pw",
            "pw.x -inp WS2.scf.pwi > WS2.scf.pwo",
            0,
            sample.clone(),
            Duration::from_secs(60),
        );
        assert!(result.is_success());
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.sample, sample);
        assert!(result.failure_message().is_none());
        assert!(result.started_at <= result.completed_at);
    }

    #[test]
    fn test_run_result_failure() {
        let result = RunResult::from_exit(
            "bands",
            "bands.x < WS2.bands-pp-up.in > WS2.bands-pp-up.out",
            1,
            ProgressSample::default(),
            Duration::from_secs(2),
        );
        assert!(!result.is_success());
        assert_eq!(result.status, RunStatus::Failed);
        let message = result.failure_message().unwrap();
        assert!(message.contains("bands.x < WS2.bands-pp-up.in"));
        assert!(message.contains("code 1"));
    }

    #[test]
    fn test_signal_exit_is_failure() {
        assert_eq!(RunStatus::from_exit_code(-1), RunStatus::Failed);
        assert_eq!(RunStatus::from_exit_code(0), RunStatus::Success);
    }

    #[test]
    fn test_run_status_display() {
        assert_eq!(RunStatus::Success.to_string(), "success");
        assert_eq!(RunStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_run_result_json() {
        let result = RunResult::from_exit("dos", "dos.x", 0, ProgressSample::default(), Duration::ZERO)
            .with_polls(4);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["polls"], 4);
    }
}

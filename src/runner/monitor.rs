//! Process monitor - launches a solver and follows its output.

use std::process::ExitStatus;
use std::time::{Duration, Instant};

use tokio::process::Child;
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::command::SolverCommand;
use super::config::MonitorSettings;
use super::observer::{EnergyTracker, ProgressObserver};
use super::result::RunResult;
use super::tail::OutputTail;
use crate::error::MonitorError;
use crate::metrics::MetricsCollector;
use crate::scanner::ScanState;

/// What the monitor does with the output it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    /// Fold the output into progress markers and report them.
    Progress,
    /// Forward the output verbatim.
    Tail,
}

/// Launches external solver processes and follows them to completion.
#[derive(Debug, Clone, Default)]
pub struct ProcessMonitor {
    settings: MonitorSettings,
    cancel: CancelToken,
    metrics: MetricsCollector,
}

impl ProcessMonitor {
    /// Creates a monitor with the given settings.
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            cancel: CancelToken::new(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Uses `cancel` to abort runs from outside.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Runs `command` to completion, reading its output every `poll_interval`.
    ///
    /// Resolves to a [`RunResult`] whose status follows the exit code.
    /// Cancellation, timeouts, spawn failures and a missing output file are
    /// returned as errors; the process is killed in each case.
    pub async fn run(
        &self,
        stage: &str,
        command: &SolverCommand,
        poll_interval: Duration,
        mode: MonitorMode,
        observer: &mut dyn ProgressObserver,
    ) -> Result<RunResult, MonitorError> {
        let start = Instant::now();
        let command_line = command.to_string();

        info!(stage, command = %command_line, "Launching solver");
        let mut child = command.spawn()?;

        if !self.pause(self.settings.warmup).await {
            return Err(self.abort(&mut child, &command_line).await);
        }

        let mut tail = match OutputTail::open(command.output()).await {
            Ok(tail) => tail,
            Err(e) => {
                terminate(&mut child).await;
                return Err(e);
            }
        };

        let mut follower = Follower::new(mode);
        let mut polls = 0u64;

        let status: ExitStatus = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }

            if let Some(limit) = self.settings.timeout {
                if start.elapsed() >= limit {
                    warn!(stage, command = %command_line, ?limit, "Solver exceeded its time limit");
                    terminate(&mut child).await;
                    return Err(MonitorError::Timeout {
                        command: command_line,
                        limit,
                    });
                }
            }

            // Never sleep past the time limit.
            let wait = match self.settings.timeout {
                Some(limit) => poll_interval.min(limit.saturating_sub(start.elapsed())),
                None => poll_interval,
            };
            if !self.pause(wait).await {
                return Err(self.abort(&mut child, &command_line).await);
            }

            polls += 1;
            match tail.read_new().await {
                Ok(text) => follower.absorb(polls, &text, observer),
                Err(e) => warn!(stage, error = %e, "Failed to read solver output"),
            }
            self.metrics.record_poll(stage);
        };

        // The last writes may land after the exit was observed.
        match tail.read_new().await {
            Ok(text) => follower.absorb(0, &text, observer),
            Err(e) => warn!(stage, error = %e, "Failed to read final solver output"),
        }
        let leftover = tail.finish();
        follower.absorb(0, &leftover, observer);
        let sample = follower.finish(observer);

        let exit_code = status.code().unwrap_or(-1);
        let duration = start.elapsed();

        debug!(
            stage,
            exit_code,
            polls,
            bytes = tail.bytes_read(),
            skipped = follower.scan.skipped(),
            "Solver finished"
        );
        self.metrics.record_parse_skips(stage, follower.scan.skipped());

        let result = RunResult::from_exit(stage, command_line, exit_code, sample, duration)
            .with_polls(polls);

        if result.is_success() {
            info!(stage, ?duration, "Solver completed successfully");
        } else {
            warn!(stage, exit_code, command = %result.command, "Solver exited with an error");
        }

        Ok(result)
    }

    /// Sleeps for `duration`; returns false if cancelled first.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    async fn abort(&self, child: &mut Child, command: &str) -> MonitorError {
        info!(command, "Cancelling solver run");
        terminate(child).await;
        MonitorError::Cancelled {
            command: command.to_string(),
        }
    }
}

/// Kills the child and reaps it.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Failed to kill solver process");
    }
}

/// Per-run output handling for one monitor mode.
struct Follower {
    mode: MonitorMode,
    scan: ScanState,
    tracker: EnergyTracker,
}

impl Follower {
    fn new(mode: MonitorMode) -> Self {
        Self {
            mode,
            scan: ScanState::new(),
            tracker: EnergyTracker::new(),
        }
    }

    fn absorb(&mut self, poll: u64, text: &str, observer: &mut dyn ProgressObserver) {
        match self.mode {
            MonitorMode::Tail => {
                if !text.is_empty() {
                    observer.on_output(text);
                }
            }
            MonitorMode::Progress => {
                self.scan.feed(text);
                // The final pass reports once, from `finish`.
                if poll > 0 {
                    if let Some(report) = self.tracker.report(poll, self.scan.sample()) {
                        observer.on_progress(&report);
                    }
                }
            }
        }
    }

    fn finish(&mut self, observer: &mut dyn ProgressObserver) -> crate::scanner::ProgressSample {
        match self.mode {
            MonitorMode::Progress => {
                self.scan.finish();
                if let Some(report) = self.tracker.report(0, self.scan.sample()) {
                    observer.on_progress(&report);
                }
            }
            MonitorMode::Tail => observer.on_output_end(),
        }
        self.scan.sample().clone()
    }
}

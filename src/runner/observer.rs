//! Progress observers.
//!
//! Observers are best-effort sinks. They return nothing, so a failing
//! observer can never abort a monitored run.

use std::io::Write;

use serde::Serialize;
use tracing::info;

use crate::scanner::ProgressSample;

/// Structured progress emitted on each poll in extraction mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    /// Poll cycle that produced this report (1-based; 0 for the final pass).
    pub poll: u64,
    /// Latest total energy in Rydberg.
    pub energy: f64,
    /// Absolute difference from the previously reported energy.
    ///
    /// The first report is measured against 0.0 and is not physically meaningful.
    pub energy_delta: f64,
    /// Latest elapsed CPU time.
    pub cpu_time: Option<String>,
    /// Whether convergence has been reported.
    pub converged: bool,
}

impl ProgressReport {
    /// Single-line rendering used by the console and log observers.
    pub fn summary(&self) -> String {
        format!(
            "Total Energy: {} Ry | Energy Difference: {:.8} Ry | CPU Time: {}",
            self.energy,
            self.energy_delta,
            self.cpu_time.as_deref().unwrap_or("n/a")
        )
    }
}

/// Turns successive samples into reports with energy differences.
#[derive(Debug, Clone, Default)]
pub struct EnergyTracker {
    previous: Option<f64>,
}

impl EnergyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a report for `sample`, or `None` if no energy is known yet.
    pub fn report(&mut self, poll: u64, sample: &ProgressSample) -> Option<ProgressReport> {
        let energy = sample.energy?;
        let energy_delta = (self.previous.unwrap_or(0.0) - energy).abs();
        self.previous = Some(energy);
        Some(ProgressReport {
            poll,
            energy,
            energy_delta,
            cpu_time: sample.cpu_time.clone(),
            converged: sample.converged,
        })
    }
}

/// Receives progress from the process monitor.
pub trait ProgressObserver: Send {
    /// Called with structured progress in extraction mode.
    fn on_progress(&mut self, report: &ProgressReport);

    /// Called with newly appended output text in tailing mode.
    fn on_output(&mut self, text: &str);

    /// Called once after the last output of a tailed process.
    fn on_output_end(&mut self) {}
}

/// Splits streamed text into complete lines, holding back a trailing
/// partial line until its newline arrives.
#[derive(Debug, Clone, Default)]
pub struct LineBuffer {
    partial: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text` and returns the lines it completed, without terminators.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.partial.push_str(text);
        let Some(last_newline) = self.partial.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        complete.lines().map(str::to_string).collect()
    }

    /// Returns the held-back partial line, if any.
    pub fn take_rest(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.partial);
        let rest = rest.trim_end_matches('\r');
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

/// Writes progress and tailed output to the terminal.
#[derive(Debug, Default)]
pub struct ConsoleObserver;

impl ConsoleObserver {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressObserver for ConsoleObserver {
    fn on_progress(&mut self, report: &ProgressReport) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", report.summary());
        if report.converged {
            let _ = writeln!(out, "Convergence has been achieved");
        }
    }

    fn on_output(&mut self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

/// Reports progress through `tracing`.
///
/// Tailed output is logged one event per line; lines split across polls
/// are joined before they are logged.
#[derive(Debug, Default)]
pub struct TracingObserver {
    lines: LineBuffer,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

fn log_output_line(line: &str) {
    if !line.trim().is_empty() {
        info!(target: "espresso_forge::solver_output", "{}", line);
    }
}

impl ProgressObserver for TracingObserver {
    fn on_progress(&mut self, report: &ProgressReport) {
        info!(
            poll = report.poll,
            energy_ry = report.energy,
            delta_ry = report.energy_delta,
            cpu_time = report.cpu_time.as_deref().unwrap_or("n/a"),
            converged = report.converged,
            "SCF progress"
        );
    }

    fn on_output(&mut self, text: &str) {
        for line in self.lines.push(text) {
            log_output_line(&line);
        }
    }

    fn on_output_end(&mut self) {
        if let Some(rest) = self.lines.take_rest() {
            log_output_line(&rest);
        }
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn on_progress(&mut self, _report: &ProgressReport) {}

    fn on_output(&mut self, _text: &str) {}
}

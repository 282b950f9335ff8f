//! Observable progress state folded from solver output.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::marker::{match_convergence, match_cpu_time, match_energy, MarkerMatch};

/// Latest value of each progress marker seen so far.
///
/// Every field is independently optional: early in a run the output usually
/// carries none of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    /// Total energy in Rydberg.
    pub energy: Option<f64>,
    /// Elapsed CPU time as printed by the solver (e.g. `"12.3s"`).
    pub cpu_time: Option<String>,
    /// Whether the convergence marker has been seen.
    pub converged: bool,
}

impl ProgressSample {
    /// Returns true if no marker has been observed.
    pub fn is_empty(&self) -> bool {
        self.energy.is_none() && self.cpu_time.is_none() && !self.converged
    }
}

/// Incremental fold of solver output into a [`ProgressSample`].
///
/// Text may arrive in arbitrary chunks. Complete lines are folded as soon as
/// they arrive; a trailing partial line is held back until its newline shows
/// up or [`ScanState::finish`] is called. Fields are only ever replaced by a
/// newer non-empty value.
#[derive(Debug, Clone, Default)]
pub struct ScanState {
    sample: ProgressSample,
    partial: String,
    lines: u64,
    skipped: u64,
}

impl ScanState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a chunk of newly appended text.
    pub fn feed(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }

        self.partial.push_str(chunk);
        let Some(last_newline) = self.partial.rfind('\n') else {
            return;
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        for line in complete.lines() {
            self.fold_line(line);
        }
    }

    /// Folds the buffered partial line, if any.
    pub fn finish(&mut self) {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.fold_line(line.trim_end_matches('\r'));
        }
    }

    /// Latest sample.
    pub fn sample(&self) -> &ProgressSample {
        &self.sample
    }

    /// Consumes the state, returning the latest sample.
    pub fn into_sample(self) -> ProgressSample {
        self.sample
    }

    /// Number of complete lines folded so far.
    pub fn lines_folded(&self) -> u64 {
        self.lines
    }

    /// Number of marker lines that could not be parsed.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn fold_line(&mut self, line: &str) {
        self.lines += 1;

        match match_energy(line) {
            MarkerMatch::Value(energy) => self.sample.energy = Some(energy),
            MarkerMatch::Malformed => self.skip("energy", line),
            MarkerMatch::Absent => {}
        }

        match match_cpu_time(line) {
            MarkerMatch::Value(time) => self.sample.cpu_time = Some(time),
            MarkerMatch::Malformed => self.skip("cpu time", line),
            MarkerMatch::Absent => {}
        }

        if match_convergence(line) {
            self.sample.converged = true;
        }
    }

    fn skip(&mut self, marker: &str, line: &str) {
        self.skipped += 1;
        debug!(marker, line = line.trim(), "Skipping malformed marker line");
    }
}

//! Recognition of the progress markers written by `pw.x`.
//!
//! Only three substrings of the solver output are meaningful here. Every
//! other line is opaque.

use std::sync::OnceLock;

use regex::Regex;

/// Label that identifies a total-energy line.
pub const ENERGY_LABEL: &str = "total energy";

/// Unit suffix that must accompany the energy label.
pub const ENERGY_UNIT: &str = "Ry";

/// Phrase that introduces the elapsed CPU time.
pub const CPU_TIME_PHRASE: &str = "total cpu time spent up to now is";

/// Phrase printed once the SCF cycle has converged.
pub const CONVERGENCE_PHRASE: &str = "convergence has been achieved";

/// Value between the first `=` and the following `Ry`.
static ENERGY_VALUE: OnceLock<Option<Regex>> = OnceLock::new();

fn energy_value_regex() -> Option<&'static Regex> {
    ENERGY_VALUE
        .get_or_init(|| Regex::new(r"^[^=]*=\s*(.*?)\s*Ry").ok())
        .as_ref()
}

/// Outcome of matching one marker against one line.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerMatch<T> {
    /// The line does not carry this marker.
    Absent,
    /// The line carries the marker and the value parsed.
    Value(T),
    /// The line carries the marker but its value could not be parsed.
    Malformed,
}

impl<T> MarkerMatch<T> {
    pub fn is_malformed(&self) -> bool {
        matches!(self, MarkerMatch::Malformed)
    }
}

/// Matches the energy marker, e.g. `!    total energy   =   -22.83870893 Ry`.
pub fn match_energy(line: &str) -> MarkerMatch<f64> {
    if !(line.contains(ENERGY_LABEL) && line.contains(ENERGY_UNIT)) {
        return MarkerMatch::Absent;
    }

    let Some(re) = energy_value_regex() else {
        return MarkerMatch::Malformed;
    };

    re.captures(line)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map_or(MarkerMatch::Malformed, MarkerMatch::Value)
}

/// Matches the elapsed-time marker and returns the trimmed text after `is`.
pub fn match_cpu_time(line: &str) -> MarkerMatch<String> {
    let Some(pos) = line.find(CPU_TIME_PHRASE) else {
        return MarkerMatch::Absent;
    };

    let value = line[pos + CPU_TIME_PHRASE.len()..].trim();
    if value.is_empty() {
        MarkerMatch::Malformed
    } else {
        MarkerMatch::Value(value.to_string())
    }
}

/// Returns true when the line announces SCF convergence.
pub fn match_convergence(line: &str) -> bool {
    line.contains(CONVERGENCE_PHRASE)
}

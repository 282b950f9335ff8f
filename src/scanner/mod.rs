//! Progress extraction from streaming solver output.
//!
//! The solver writes free text. Three markers are recognised: the total
//! energy (Rydberg), the elapsed CPU time and the convergence notice. The
//! scanner reports the most recent occurrence of each.
//!
//! # Example
//!
//! ```
//! use espresso_forge::scanner::scan;
//!
//! let text = "total energy = -123.456 Ry\ntotal energy = -123.460 Ry\n";
//! assert_eq!(scan(text).energy, Some(-123.460));
//! ```
//!
//! [`ScanState`] folds text incrementally, which is what the process monitor
//! uses: each poll only hands it the bytes appended since the previous poll.

pub mod marker;
pub mod state;

pub use marker::MarkerMatch;
pub use state::{ProgressSample, ScanState};

/// Scans the complete accumulated text and returns the latest markers.
pub fn scan(text: &str) -> ProgressSample {
    let mut state = ScanState::new();
    state.feed(text);
    state.finish();
    state.into_sample()
}

/// Scans an ordered sequence of lines.
pub fn scan_lines<I, S>(lines: I) -> ProgressSample
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut state = ScanState::new();
    for line in lines {
        state.feed(line.as_ref());
        state.feed("\n");
    }
    state.into_sample()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCF_EXCERPT: &str = "\
     iteration #  1     ecut=    30.00 Ry     beta= 0.40
     total cpu time spent up to now is        0.3 secs

     total energy              =     -22.83870893 Ry
     estimated scf accuracy    <       0.06335056 Ry

     iteration #  2     ecut=    30.00 Ry     beta= 0.40
     total cpu time spent up to now is        0.5 secs

     total energy              =     -22.84012345 Ry
     estimated scf accuracy    <       0.00174512 Ry
";

    #[test]
    fn test_no_markers() {
        let sample = scan("     Program PWSCF v.7.2 starts on 16Oct2026\n");
        assert!(sample.is_empty());
    }

    #[test]
    fn test_last_energy_wins() {
        assert_eq!(scan("total energy = -123.456 Ry\n").energy, Some(-123.456));
        assert_eq!(
            scan("total energy = -123.456 Ry\ntotal energy = -123.460 Ry\n").energy,
            Some(-123.460)
        );
        assert_eq!(scan(SCF_EXCERPT).energy, Some(-22.84012345));
        assert_eq!(scan(SCF_EXCERPT).cpu_time.as_deref(), Some("0.5 secs"));
    }

    #[test]
    fn test_malformed_energy_line_does_not_raise() {
        assert_eq!(scan("total energy Ry\n").energy, None);
        assert_eq!(
            scan("total energy = -1.25 Ry\ntotal energy NaN-ish Ry\n").energy,
            Some(-1.25)
        );
    }

    #[test]
    fn test_cpu_time_extraction() {
        let sample = scan("total cpu time spent up to now is 12.3s\n");
        assert_eq!(sample.cpu_time.as_deref(), Some("12.3s"));
    }

    #[test]
    fn test_convergence_flag() {
        assert!(scan("convergence has been achieved\n").converged);
        assert!(!scan("convergence has not been reached\n").converged);
        assert!(!scan("Convergence Has Been Achieved\n").converged);
    }

    #[test]
    fn test_scan_is_idempotent() {
        assert_eq!(scan(SCF_EXCERPT), scan(SCF_EXCERPT));
    }

    #[test]
    fn test_prefix_never_loses_markers() {
        let lines: Vec<&str> = SCF_EXCERPT.lines().collect();
        let mut previous = ProgressSample::default();
        for n in 0..=lines.len() {
            let current = scan_lines(&lines[..n]);
            if previous.energy.is_some() {
                assert!(current.energy.is_some());
            }
            if previous.cpu_time.is_some() {
                assert!(current.cpu_time.is_some());
            }
            if previous.converged {
                assert!(current.converged);
            }
            previous = current;
        }
    }

    #[test]
    fn test_incremental_fold_matches_full_scan() {
        let expected = scan(SCF_EXCERPT);
        for chunk_size in [1, 3, 7, 16, 64, SCF_EXCERPT.len()] {
            let mut state = ScanState::new();
            let bytes = SCF_EXCERPT.as_bytes();
            for chunk in bytes.chunks(chunk_size) {
                state.feed(std::str::from_utf8(chunk).unwrap());
            }
            state.finish();
            assert_eq!(state.sample(), &expected, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_scan_lines_matches_scan() {
        assert_eq!(scan_lines(SCF_EXCERPT.lines()), scan(SCF_EXCERPT));
    }
}

//! End-to-end monitor runs against real child processes.

#![cfg(unix)]

use std::path::Path;
use std::time::{Duration, Instant};

use espresso_forge::error::MonitorError;
use espresso_forge::runner::{
    CancelToken, MonitorMode, MonitorSettings, ProcessMonitor, ProgressObserver, ProgressReport,
    RunStatus, SolverCommand,
};
use tempfile::TempDir;

const POLL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct Recorder {
    reports: Vec<ProgressReport>,
    output: String,
    output_ends: usize,
}

impl ProgressObserver for Recorder {
    fn on_progress(&mut self, report: &ProgressReport) {
        self.reports.push(report.clone());
    }

    fn on_output(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn on_output_end(&mut self) {
        self.output_ends += 1;
    }
}

fn monitor() -> ProcessMonitor {
    ProcessMonitor::new(MonitorSettings::new().with_warmup(Duration::from_millis(50)))
}

fn shell(script: &str, output: &Path) -> SolverCommand {
    SolverCommand::new("sh", output).args(["-c", script])
}

#[tokio::test]
async fn test_reports_latest_energy() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("WS2.scf.pwo");
    let script = "\
echo '     total energy              =    -123.456 Ry'; \
sleep 0.3; \
echo '     total cpu time spent up to now is   12.3 secs'; \
echo '!    total energy              =    -123.460 Ry'; \
echo '     convergence has been achieved in   3 iterations'";

    let mut recorder = Recorder::default();
    let result = monitor()
        .run("pw", &shell(script, &output), POLL, MonitorMode::Progress, &mut recorder)
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.sample.energy, Some(-123.460));
    assert_eq!(result.sample.cpu_time.as_deref(), Some("12.3 secs"));
    assert!(result.sample.converged);
    assert!(result.polls >= 1);

    let last = recorder.reports.last().unwrap();
    assert_eq!(last.energy, -123.460);
    assert!(last.converged);
    // Energies never move back to an earlier value once a newer one was seen.
    let first_final = recorder
        .reports
        .iter()
        .position(|r| r.energy == -123.460)
        .unwrap();
    assert!(recorder.reports[first_final..]
        .iter()
        .all(|r| r.energy == -123.460));
}

#[tokio::test]
async fn test_nonzero_exit_is_failed() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("bad.pwo");

    let mut recorder = Recorder::default();
    let result = monitor()
        .run(
            "pw",
            &shell("echo 'Error in routine readpp'; exit 1", &output),
            POLL,
            MonitorMode::Progress,
            &mut recorder,
        )
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.exit_code, 1);
    assert!(result.command.starts_with("sh -c"));
    assert!(result.sample.is_empty());
    assert!(recorder.reports.is_empty());
    assert!(result.failure_message().unwrap().contains("code 1"));
}

#[tokio::test]
async fn test_tail_mode_forwards_all_text() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("WS2.dos.out");
    let script = "echo 'Program DOS v.7.2 starts'; sleep 0.2; printf 'partial'; sleep 0.2; echo ' line'; echo 'JOB DONE.'";

    let mut recorder = Recorder::default();
    let result = monitor()
        .run("dos", &shell(script, &output), POLL, MonitorMode::Tail, &mut recorder)
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(
        recorder.output,
        "Program DOS v.7.2 starts\npartial line\nJOB DONE.\n"
    );
    assert_eq!(recorder.output_ends, 1);
    assert!(recorder.reports.is_empty());
}

#[tokio::test]
async fn test_cancellation_returns_promptly() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("slow.pwo");
    let cancel = CancelToken::new();
    let monitor = monitor().with_cancel(cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let mut recorder = Recorder::default();
    let err = monitor
        .run("pw", &shell("sleep 30", &output), POLL, MonitorMode::Progress, &mut recorder)
        .await
        .unwrap_err();

    assert!(matches!(err, MonitorError::Cancelled { .. }));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_timeout_kills_process() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("slow.pwo");
    let monitor = ProcessMonitor::new(
        MonitorSettings::new()
            .with_warmup(Duration::from_millis(50))
            .with_timeout(Duration::from_millis(300)),
    );

    let start = Instant::now();
    let mut recorder = Recorder::default();
    let err = monitor
        .run("pw", &shell("sleep 30", &output), POLL, MonitorMode::Progress, &mut recorder)
        .await
        .unwrap_err();

    assert!(matches!(err, MonitorError::Timeout { limit, .. } if limit == Duration::from_millis(300)));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_timeout_does_not_wait_for_full_poll_interval() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("slow.pwo");
    let monitor = ProcessMonitor::new(
        MonitorSettings::new()
            .with_warmup(Duration::from_millis(50))
            .with_timeout(Duration::from_millis(300)),
    );

    let start = Instant::now();
    let mut recorder = Recorder::default();
    let err = monitor
        .run(
            "pw",
            &shell("sleep 30", &output),
            Duration::from_secs(10),
            MonitorMode::Progress,
            &mut recorder,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MonitorError::Timeout { .. }));
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_output_removed_before_warmup_ends() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("gone.pwo");
    let script = format!("rm -f '{}'; sleep 30", output.display());
    let monitor =
        ProcessMonitor::new(MonitorSettings::new().with_warmup(Duration::from_millis(300)));

    let start = Instant::now();
    let mut recorder = Recorder::default();
    let err = monitor
        .run("pw", &shell(&script, &output), POLL, MonitorMode::Progress, &mut recorder)
        .await
        .unwrap_err();

    assert!(matches!(err, MonitorError::OutputMissing { .. }));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_unknown_program_fails_to_spawn() {
    let dir = TempDir::new().unwrap();
    let command = SolverCommand::new("no-such-solver-pw.x", dir.path().join("x.pwo"));

    let mut recorder = Recorder::default();
    let err = monitor()
        .run("pw", &command, POLL, MonitorMode::Progress, &mut recorder)
        .await
        .unwrap_err();

    assert!(matches!(err, MonitorError::Spawn { .. }));
}

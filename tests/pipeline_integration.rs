//! Stage runner and pipeline runs with stand-in solver executables.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use espresso_forge::config::SolverConfig;
use espresso_forge::error::StageError;
use espresso_forge::pipeline::{Pipeline, PipelinePlan, PipelineReport};
use espresso_forge::runner::{NullObserver, StageKind, StageRunner};
use tempfile::TempDir;

const FAKE_PW: &str = r#"#!/bin/sh
# Stand-in for pw.x: prints its -inp deck, fails on decks mentioning "nscf".
deck="$2"
cat "$deck"
case "$deck" in
  *nscf*) echo 'Error in routine c_bands: too many bands are not converged'; exit 3 ;;
esac
"#;

const SCF_DECK: &str = "     total energy              =    -387.90244810 Ry
     total cpu time spent up to now is        5.6 secs
!    total energy              =    -387.93511462 Ry
     convergence has been achieved in   4 iterations
";

fn fake_pw(dir: &Path) -> PathBuf {
    let path = dir.join("fake-pw.sh");
    std::fs::write(&path, FAKE_PW).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Solvers run directly with fast timings; post-processors echo their deck.
fn config(pw: &Path) -> SolverConfig {
    SolverConfig::default()
        .with_launcher(None)
        .with_pw(pw.display().to_string())
        .with_bands("cat")
        .with_dos("cat")
        .with_projwfc("cat")
        .with_warmup(Duration::from_millis(30))
        .with_poll_intervals(Duration::from_millis(30), Duration::from_millis(30))
}

#[tokio::test]
async fn test_run_pw_extracts_final_energy() {
    let tools = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    std::fs::write(work.path().join("WS2.scf.pwi"), SCF_DECK).unwrap();

    let runner = StageRunner::new(config(&fake_pw(tools.path())));
    let result = runner
        .run_pw(
            work.path(),
            Path::new("WS2.scf.pwi"),
            Path::new("WS2.scf.pwo"),
            &mut NullObserver,
        )
        .await
        .unwrap();

    assert_eq!(result.stage, "pw");
    assert_eq!(result.sample.energy, Some(-387.93511462));
    assert!(result.sample.converged);
    assert_eq!(
        std::fs::read_to_string(work.path().join("WS2.scf.pwo")).unwrap(),
        SCF_DECK
    );
}

#[tokio::test]
async fn test_run_bands_feeds_deck_on_stdin() {
    let work = TempDir::new().unwrap();
    let deck = "&BANDS\n    prefix = WS2,\n/";
    std::fs::write(work.path().join("WS2.bands-pp-up.in"), deck).unwrap();

    let runner = StageRunner::new(config(Path::new("pw.x")));
    let result = runner
        .run_bands(
            work.path(),
            Path::new("WS2.bands-pp-up.in"),
            Path::new("WS2.bands-pp-up.out"),
            &mut NullObserver,
        )
        .await
        .unwrap();

    assert!(result.is_success());
    assert!(result.command.contains("< "));
    assert_eq!(
        std::fs::read_to_string(work.path().join("WS2.bands-pp-up.out")).unwrap(),
        deck
    );
}

#[tokio::test]
async fn test_failed_stage_carries_command_and_code() {
    let tools = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    std::fs::write(work.path().join("WS2.nscf.pwi"), "&CONTROL\n/\n").unwrap();

    let runner = StageRunner::new(config(&fake_pw(tools.path())));
    let err = runner
        .run_stage(
            StageKind::Pw,
            work.path(),
            Path::new("WS2.nscf.pwi"),
            Path::new("WS2.nscf.pwo"),
            &mut NullObserver,
        )
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), Some(3));
    match err {
        StageError::ProcessFailed { stage, result } => {
            assert_eq!(stage, StageKind::Pw);
            assert!(result.command.contains("-inp"));
            assert!(result.command.ends_with("WS2.nscf.pwo"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_pipeline_halts_at_failing_nscf() {
    let tools = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    for name in ["scf", "bands", "nscf"] {
        std::fs::write(work.path().join(format!("WS2.{}.pwi", name)), SCF_DECK).unwrap();
    }

    let plan = PipelinePlan::band_structure(work.path(), "WS2");
    let pipeline = Pipeline::new(StageRunner::new(config(&fake_pw(tools.path()))));
    let report = pipeline.run(&plan, &mut NullObserver).await.unwrap();

    let completed: Vec<&str> = report.steps.iter().map(|s| s.step.as_str()).collect();
    assert_eq!(
        completed,
        vec!["scf", "bands", "bands-pp-flat", "bands-pp-up", "bands-pp-down"]
    );

    let halt = report.halted.as_ref().unwrap();
    assert_eq!(halt.step, "nscf");
    assert_eq!(halt.exit_code, Some(3));

    // Later stages never ran.
    assert!(!work.path().join("WS2.dos.in").exists());
    assert!(!work.path().join("WS2.pdos.out").exists());

    // The bands.x stand-in echoed the generated deck.
    let flat = std::fs::read_to_string(work.path().join("WS2.bands-pp-flat.out")).unwrap();
    assert!(flat.starts_with("&BANDS\n"));
    assert!(!flat.contains("spin_component"));

    let saved = PipelineReport::load(&plan.summary_path()).unwrap();
    assert_eq!(saved.halted.unwrap().step, "nscf");
    assert_eq!(saved.steps.len(), 5);
}

#[tokio::test]
async fn test_relative_workdir_resolves_from_current_dir() {
    let tools = TempDir::new().unwrap();
    // Created under the current directory so it can be named relatively.
    let work = TempDir::new_in(".").unwrap();
    let relative = Path::new(work.path().file_name().unwrap());
    assert!(relative.is_relative());
    std::fs::write(work.path().join("WS2.scf.pwi"), SCF_DECK).unwrap();

    let runner = StageRunner::new(config(&fake_pw(tools.path())));
    let result = runner
        .run_pw(
            relative,
            Path::new("WS2.scf.pwi"),
            Path::new("WS2.scf.pwo"),
            &mut NullObserver,
        )
        .await
        .unwrap();

    assert_eq!(result.sample.energy, Some(-387.93511462));
    assert_eq!(
        std::fs::read_to_string(work.path().join("WS2.scf.pwo")).unwrap(),
        SCF_DECK
    );
    assert!(!work.path().join(relative).exists());
}

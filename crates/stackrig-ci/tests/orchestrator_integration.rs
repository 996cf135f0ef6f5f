//! Integration tests for the provision and cleanup flows against fakes.

use stackrig_ci::fakes::{MemoryNotifySink, RecordingTestRunner, ScriptedControlPlane};
use stackrig_ci::{
    ArtifactLayout, Cancellation, ChangeSet, ControlPlaneError, Notification, Orchestrator,
    OutcomeKind, PathClassifier, PollPolicy, RunPhase, RunReport, StackController, StackOutcome,
    StackrigError, Unit,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const COMMIT: &str = "abc123";

/// Lay out a repo with complete artifacts for each named unit.
fn repo_with_units(names: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for name in names {
        write_artifacts(dir.path(), name, &["-test.py", "-script.py", "-infra.yaml"]);
    }
    dir
}

fn write_artifacts(root: &Path, unit: &str, suffixes: &[&str]) {
    let unit_dir = root.join(unit);
    std::fs::create_dir_all(&unit_dir).expect("mkdir");
    for suffix in suffixes {
        let body = if *suffix == "-infra.yaml" {
            format!("Description: {unit}\nResources: {{}}\n")
        } else {
            "print('ok')\n".to_string()
        };
        std::fs::write(unit_dir.join(format!("{unit}{suffix}")), body).expect("write artifact");
    }
}

struct Rig {
    cp: Arc<ScriptedControlPlane>,
    runner: Arc<RecordingTestRunner>,
    sink: Arc<MemoryNotifySink>,
    orchestrator: Orchestrator,
}

fn rig() -> Rig {
    let cp = Arc::new(ScriptedControlPlane::new());
    let runner = Arc::new(RecordingTestRunner::new());
    let sink = Arc::new(MemoryNotifySink::new());
    let controller = StackController::new(
        cp.clone(),
        PollPolicy::default(),
        vec!["CAPABILITY_NAMED_IAM".to_string()],
        Cancellation::new(),
    );
    let orchestrator = Orchestrator::new(COMMIT, controller, runner.clone(), sink.clone());
    Rig {
        cp,
        runner,
        sink,
        orchestrator,
    }
}

/// Test: changed paths across two units provision both stacks and run both tests
#[tokio::test(start_paused = true)]
async fn test_full_provision_flow() {
    let repo = repo_with_units(&["etl", "loader"]);
    let classifier = PathClassifier::new(repo.path(), ArtifactLayout::default());
    let change_set = ChangeSet::new([
        "loader/loader-script.py",
        "etl/etl-infra.yaml",
        "etl/etl-test.py",
    ]);

    let classification = classifier.classify(&change_set).expect("classify");
    let names: Vec<_> = classification.units.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["etl", "loader"]);

    let r = rig();
    r.cp.set_default_status("CREATE_COMPLETE");
    let report = r.orchestrator.provision(&classification.units).await;

    assert!(report.success(), "Provision should succeed");
    assert_eq!(r.cp.created_stacks(), vec!["etl-test-abc123", "loader-test-abc123"]);

    let calls = r.runner.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].0.ends_with("etl/etl-test.py"));
    assert_eq!(calls[0].1, "etl-test-abc123");
    assert_eq!(calls[1].1, "loader-test-abc123");

    let successes = r
        .sink
        .notifications()
        .into_iter()
        .filter(|n| matches!(n, Notification::StackSucceeded { .. }))
        .count();
    assert_eq!(successes, 2);
}

/// Test: every missing artifact is listed and nothing is submitted
#[test]
fn test_missing_artifacts_listed_together() {
    let repo = tempfile::tempdir().expect("tempdir");
    write_artifacts(repo.path(), "etl", &["-test.py"]);
    write_artifacts(repo.path(), "loader", &["-test.py", "-script.py", "-infra.yaml"]);
    let classifier = PathClassifier::new(repo.path(), ArtifactLayout::default());

    let err = classifier
        .classify(&ChangeSet::new(["etl/etl-test.py", "loader/x.txt"]))
        .expect_err("etl is incomplete");

    match err {
        StackrigError::MissingArtifacts { paths } => {
            assert_eq!(
                paths,
                vec![
                    repo.path().join("etl/etl-infra.yaml"),
                    repo.path().join("etl/etl-script.py"),
                ]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Test: classification does not depend on path order or duplicates
#[test]
fn test_classification_is_order_independent() {
    let repo = repo_with_units(&["a", "b"]);
    let classifier = PathClassifier::new(repo.path(), ArtifactLayout::default());

    let first = classifier
        .classify(&ChangeSet::new(["b/one", "a/two", "b/three"]))
        .expect("classify");
    let second = classifier
        .classify(&ChangeSet::new(["a/two", "b/three", "b/one", "a/two"]))
        .expect("classify");

    assert_eq!(first, second);
    assert_eq!(first.templates.len(), 2);
    assert_eq!(first.tests.len(), 2);
}

/// Test: creation failure closes the gate and cleanup still removes every stack
#[tokio::test(start_paused = true)]
async fn test_failed_provision_then_cleanup() {
    let repo = repo_with_units(&["etl", "loader"]);
    let classifier = PathClassifier::new(repo.path(), ArtifactLayout::default());
    let change_set = ChangeSet::new(["etl/etl-script.py", "loader/loader-script.py"]);
    let units = classifier.classify(&change_set).expect("classify").units;

    let r = rig();
    r.cp.script_statuses("etl-test-abc123", ["CREATE_IN_PROGRESS", "ROLLBACK_COMPLETE"]);
    r.cp.script_statuses("loader-test-abc123", ["CREATE_COMPLETE"]);

    let report = r.orchestrator.provision(&units).await;
    assert!(!report.success());
    assert!(report.tests.is_none(), "tests must be skipped");
    assert!(r.runner.calls().is_empty());
    assert_eq!(
        report.creation.get("etl").and_then(StackOutcome::diagnostic),
        Some("ROLLBACK_COMPLETE")
    );

    // Cleanup runs on its own and tolerates the already-failed stack.
    r.cp.script_describe("etl-test-abc123", [Err(ControlPlaneError::NotFound("gone".into()))]);
    r.cp.script_statuses("loader-test-abc123", ["DELETE_IN_PROGRESS", "DELETE_COMPLETE"]);
    let deletion = r.orchestrator.run_deletion_phase(&units).await;

    assert!(deletion.all_ok());
    assert_eq!(r.cp.deleted_stacks(), vec!["etl-test-abc123", "loader-test-abc123"]);
    assert!(r.sink.notifications().contains(&Notification::CreationPhaseFailed {
        failed_units: vec!["etl".to_string()],
    }));
}

/// Test: cleanup derives units without requiring artifacts to exist
#[tokio::test(start_paused = true)]
async fn test_cleanup_without_artifacts() {
    let repo = tempfile::tempdir().expect("tempdir");
    let units = Unit::from_change_set(
        &ChangeSet::new(["removed/removed-infra.yaml"]),
        repo.path(),
        &ArtifactLayout::default(),
    );
    assert_eq!(units.len(), 1);

    let r = rig();
    r.cp.set_default_status("DELETE_COMPLETE");
    let result = r.orchestrator.run_deletion_phase(&units).await;

    assert_eq!(
        result.get("removed").map(StackOutcome::kind),
        Some(OutcomeKind::Deleted)
    );
    assert!(r.cp.created_stacks().is_empty());
}

/// Test: a provision run leaves a readable report behind
#[tokio::test(start_paused = true)]
async fn test_report_records_provision_run() {
    let repo = repo_with_units(&["etl"]);
    let report_dir = tempfile::tempdir().expect("tempdir");
    let report_path = report_dir.path().join("run.json");
    let classifier = PathClassifier::new(repo.path(), ArtifactLayout::default());
    let units = classifier
        .classify(&ChangeSet::new(["etl/etl-test.py"]))
        .expect("classify")
        .units;

    let r = rig();
    r.cp.set_default_status("CREATE_COMPLETE");
    r.runner.fail_for("etl-test-abc123");
    let outcome = r.orchestrator.provision(&units).await;

    let mut report = RunReport::start(COMMIT, RunPhase::Provision);
    let success = outcome.success();
    report.stacks = outcome.creation;
    report.tests = outcome.tests;
    report.finish(success);
    report.write_to(&report_path).expect("write report");

    let loaded = RunReport::read_from(&report_path).expect("read report");
    assert!(!loaded.success);
    assert_eq!(loaded.commit_id, COMMIT);
    assert!(loaded.stacks.all_ok());
    let tests = loaded.tests.expect("tests ran");
    assert!(!tests.get("etl").expect("etl").passed);
}

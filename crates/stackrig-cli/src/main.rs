//! Stackrig - per-commit integration test infrastructure
//!
//! ## Commands
//!
//! - `provision`: validate unit artifacts, create every unit's stack, run tests if all came up
//! - `cleanup`: delete every unit's stack touched by the commit

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn, Level};

use stackrig_ci::{
    AwsCliControlPlane, Cancellation, ChangeSet, CloudControlPlane, ConsoleNotifySink,
    FanoutNotifySink, Notification, NotifySink, Orchestrator, PathClassifier, ProcessTestRunner,
    RunPhase, RunReport, StackController, StackrigConfig, StackrigError, TestRunner,
    TracingNotifySink, Unit,
};

/// How a command ended, as seen by the calling CI job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunStatus {
    /// Every stack reached its target state and every test passed.
    Success,
    /// A stack or test failed.
    Failed,
    /// Required artifacts are missing; nothing was submitted.
    MissingArtifacts,
}

impl RunStatus {
    fn code(self) -> u8 {
        match self {
            RunStatus::Success => 0,
            RunStatus::Failed => 1,
            RunStatus::MissingArtifacts => 2,
        }
    }

    fn from_success(success: bool) -> Self {
        if success {
            RunStatus::Success
        } else {
            RunStatus::Failed
        }
    }
}

impl From<RunStatus> for ExitCode {
    fn from(status: RunStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/// Collaborators a command drives.
struct Backends {
    control_plane: Arc<dyn CloudControlPlane>,
    test_runner: Arc<dyn TestRunner>,
    notify: Arc<dyn NotifySink>,
}

impl Backends {
    /// The `aws` CLI, the configured test command, and console plus log output.
    fn from_config(config: &StackrigConfig) -> Self {
        Self {
            control_plane: Arc::new(AwsCliControlPlane::new(
                config.aws_region.clone(),
                config.aws_profile.clone(),
            )),
            test_runner: Arc::new(ProcessTestRunner::new(
                config.test_command.clone(),
                config.test_timeout_secs,
            )),
            notify: Arc::new(
                FanoutNotifySink::new()
                    .with(Arc::new(ConsoleNotifySink))
                    .with(Arc::new(TracingNotifySink)),
            ),
        }
    }
}

#[derive(Parser)]
#[command(name = "stackrig")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ephemeral CloudFormation stacks for per-commit integration tests", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file
    #[arg(long, global = true, env = "STACKRIG_CONFIG")]
    config: Option<PathBuf>,

    /// Repository root that unit directories are resolved against
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Write a JSON run report to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Abort waiting after this many seconds for the whole run
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    /// Number of stacks driven at once
    #[arg(long, global = true)]
    max_concurrent: Option<usize>,

    /// AWS region passed to the control plane
    #[arg(long, global = true)]
    region: Option<String>,

    /// AWS profile passed to the control plane
    #[arg(long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create test stacks for the units a commit touched, then run their tests
    Provision {
        /// Commit ID the stacks are named after
        commit_id: String,

        /// Changed file paths
        paths: Vec<String>,
    },

    /// Delete the test stacks for the units a commit touched
    Cleanup {
        /// Commit ID the stacks are named after
        commit_id: String,

        /// Changed file paths
        paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    stackrig_ci::init_tracing(cli.json, level);

    let config = load_config(&cli)?;

    let cancel = Cancellation::new();
    if let Some(deadline) = config.deadline() {
        cancel.cancel_after(deadline);
    }
    spawn_interrupt_handler(cancel.clone());

    let backends = Backends::from_config(&config);
    let status = run_command(&cli, &config, cancel, &backends).await?;
    Ok(status.into())
}

async fn run_command(
    cli: &Cli,
    config: &StackrigConfig,
    cancel: Cancellation,
    backends: &Backends,
) -> Result<RunStatus> {
    match &cli.command {
        Commands::Provision { commit_id, paths } => {
            cmd_provision(cli, config, cancel, backends, commit_id, paths).await
        }
        Commands::Cleanup { commit_id, paths } => {
            cmd_cleanup(cli, config, cancel, backends, commit_id, paths).await
        }
    }
}

fn load_config(cli: &Cli) -> Result<StackrigConfig> {
    let mut config = match &cli.config {
        Some(path) => StackrigConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => StackrigConfig::default(),
    };

    if let Some(secs) = cli.deadline_secs {
        config.deadline_secs = Some(secs);
    }
    if let Some(n) = cli.max_concurrent {
        config.max_concurrent = n;
    }
    if cli.region.is_some() {
        config.aws_region = cli.region.clone();
    }
    if cli.profile.is_some() {
        config.aws_profile = cli.profile.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn spawn_interrupt_handler(cancel: Cancellation) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling outstanding waits");
            cancel.cancel();
        }
    });
}

fn build_orchestrator(
    config: &StackrigConfig,
    cancel: Cancellation,
    commit_id: &str,
    backends: &Backends,
) -> Orchestrator {
    let controller = StackController::new(
        backends.control_plane.clone(),
        config.poll_policy(),
        config.capabilities.clone(),
        cancel,
    );
    Orchestrator::new(
        commit_id,
        controller,
        backends.test_runner.clone(),
        backends.notify.clone(),
    )
    .with_max_concurrent(config.max_concurrent)
}

fn write_report(path: Option<&Path>, report: &RunReport) -> Result<()> {
    if let Some(path) = path {
        report
            .write_to(path)
            .with_context(|| format!("Failed to write run report {}", path.display()))?;
        info!(path = %path.display(), run_id = %report.run_id, "run report written");
    }
    Ok(())
}

async fn cmd_provision(
    cli: &Cli,
    config: &StackrigConfig,
    cancel: Cancellation,
    backends: &Backends,
    commit_id: &str,
    paths: &[String],
) -> Result<RunStatus> {
    let mut report = RunReport::start(commit_id, RunPhase::Provision);

    let classifier = PathClassifier::new(&cli.root, config.layout());
    let classification = match classifier.classify(&ChangeSet::new(paths.iter().cloned())) {
        Ok(c) => c,
        Err(StackrigError::MissingArtifacts { paths }) => {
            backends
                .notify
                .notify(&Notification::MissingArtifacts {
                    paths: paths.clone(),
                })
                .await;
            report.missing_artifacts = paths.iter().map(|p| p.display().to_string()).collect();
            report.finish(false);
            write_report(cli.report.as_deref(), &report)?;
            return Ok(RunStatus::MissingArtifacts);
        }
        Err(e) => return Err(e).context("Failed to classify changed paths"),
    };

    if classification.units.is_empty() {
        info!("no infrastructure units touched; nothing to provision");
    }

    let orchestrator = build_orchestrator(config, cancel, commit_id, backends);
    let outcome = orchestrator.provision(&classification.units).await;

    let success = outcome.success();
    report.stacks = outcome.creation;
    report.tests = outcome.tests;
    report.finish(success);
    write_report(cli.report.as_deref(), &report)?;

    Ok(RunStatus::from_success(success))
}

async fn cmd_cleanup(
    cli: &Cli,
    config: &StackrigConfig,
    cancel: Cancellation,
    backends: &Backends,
    commit_id: &str,
    paths: &[String],
) -> Result<RunStatus> {
    let mut report = RunReport::start(commit_id, RunPhase::Cleanup);

    let units = Unit::from_change_set(
        &ChangeSet::new(paths.iter().cloned()),
        &cli.root,
        &config.layout(),
    );

    let orchestrator = build_orchestrator(config, cancel, commit_id, backends);
    let result = orchestrator.run_deletion_phase(&units).await;

    let success = result.all_ok();
    report.stacks = result;
    report.finish(success);
    write_report(cli.report.as_deref(), &report)?;

    Ok(RunStatus::from_success(success))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackrig_ci::fakes::{MemoryNotifySink, RecordingTestRunner, ScriptedControlPlane};
    use tempfile::TempDir;

    struct Fixture {
        repo: TempDir,
        cp: Arc<ScriptedControlPlane>,
        runner: Arc<RecordingTestRunner>,
        sink: Arc<MemoryNotifySink>,
    }

    impl Fixture {
        /// Repo with complete artifacts for `units`.
        fn new(units: &[&str]) -> Self {
            let repo = tempfile::tempdir().expect("tempdir");
            for unit in units {
                let dir = repo.path().join(unit);
                std::fs::create_dir_all(&dir).expect("mkdir");
                for suffix in ["-test.py", "-script.py", "-infra.yaml"] {
                    std::fs::write(dir.join(format!("{unit}{suffix}")), "Resources: {}\n")
                        .expect("write artifact");
                }
            }
            Self {
                repo,
                cp: Arc::new(ScriptedControlPlane::new()),
                runner: Arc::new(RecordingTestRunner::new()),
                sink: Arc::new(MemoryNotifySink::new()),
            }
        }

        fn report_path(&self) -> PathBuf {
            self.repo.path().join("report.json")
        }

        async fn run(&self, args: &[&str]) -> RunStatus {
            let root = self.repo.path().display().to_string();
            let report = self.report_path().display().to_string();
            let mut argv = vec!["stackrig", "--root", root.as_str(), "--report", report.as_str()];
            argv.extend_from_slice(args);
            let cli = Cli::try_parse_from(argv).expect("parse");
            let config = load_config(&cli).expect("config");
            let backends = Backends {
                control_plane: self.cp.clone(),
                test_runner: self.runner.clone(),
                notify: self.sink.clone(),
            };
            run_command(&cli, &config, Cancellation::new(), &backends)
                .await
                .expect("command")
        }

        fn report(&self) -> RunReport {
            RunReport::read_from(&self.report_path()).expect("report")
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunStatus::Success.code(), 0);
        assert_eq!(RunStatus::Failed.code(), 1);
        assert_eq!(RunStatus::MissingArtifacts.code(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provision_success_exits_zero() {
        let fx = Fixture::new(&["etl"]);
        fx.cp.set_default_status("CREATE_COMPLETE");

        let status = fx.run(&["provision", "abc123", "etl/etl-script.py"]).await;

        assert_eq!(status, RunStatus::Success);
        assert_eq!(fx.runner.calls().len(), 1);
        assert!(fx.report().success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provision_missing_artifacts_exits_two() {
        let fx = Fixture::new(&["etl"]);

        let status = fx
            .run(&["provision", "abc123", "etl/etl-script.py", "loader/loader-test.py"])
            .await;

        assert_eq!(status, RunStatus::MissingArtifacts);
        assert!(fx.cp.created_stacks().is_empty(), "nothing may be submitted");

        let report = fx.report();
        assert!(!report.success);
        assert_eq!(report.missing_artifacts.len(), 3);
        assert!(report.missing_artifacts.iter().all(|p| p.contains("loader")));

        let notified = fx.sink.notifications();
        assert!(matches!(
            notified.as_slice(),
            [Notification::MissingArtifacts { paths }] if paths.len() == 3
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provision_creation_failure_exits_one() {
        let fx = Fixture::new(&["etl", "loader"]);
        fx.cp.script_statuses("etl-test-abc123", ["ROLLBACK_COMPLETE"]);
        fx.cp.set_default_status("CREATE_COMPLETE");

        let status = fx
            .run(&["provision", "abc123", "etl/etl-script.py", "loader/loader-script.py"])
            .await;

        assert_eq!(status, RunStatus::Failed);
        assert!(fx.runner.calls().is_empty());
        assert!(fx.report().tests.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_provision_test_failure_exits_one() {
        let fx = Fixture::new(&["etl"]);
        fx.cp.set_default_status("CREATE_COMPLETE");
        fx.runner.fail_for("etl-test-abc123");

        let status = fx.run(&["provision", "abc123", "etl/etl-test.py"]).await;

        assert_eq!(status, RunStatus::Failed);
        assert!(fx.report().stacks.all_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_exit_codes() {
        let fx = Fixture::new(&[]);
        fx.cp.set_default_status("DELETE_COMPLETE");
        let status = fx.run(&["cleanup", "abc123", "etl/etl-infra.yaml"]).await;
        assert_eq!(status, RunStatus::Success);

        fx.cp.script_statuses("loader-test-abc123", ["DELETE_FAILED"]);
        let status = fx
            .run(&["cleanup", "abc123", "etl/etl-infra.yaml", "loader/x"])
            .await;
        assert_eq!(status, RunStatus::Failed);
        assert_eq!(
            fx.cp.deleted_stacks(),
            vec!["etl-test-abc123", "etl-test-abc123", "loader-test-abc123"]
        );
    }

    #[test]
    fn test_cli_parses_provision_paths() {
        let cli = Cli::try_parse_from([
            "stackrig",
            "provision",
            "abc123",
            "etl/etl-script.py",
            "loader/loader-test.py",
        ])
        .expect("parse");
        match cli.command {
            Commands::Provision { commit_id, paths } => {
                assert_eq!(commit_id, "abc123");
                assert_eq!(paths.len(), 2);
            }
            Commands::Cleanup { .. } => panic!("expected provision"),
        }
    }

    #[test]
    fn test_flag_overrides_apply_to_config() {
        let cli = Cli::try_parse_from([
            "stackrig",
            "--max-concurrent",
            "3",
            "--deadline-secs",
            "600",
            "--region",
            "us-east-2",
            "cleanup",
            "abc123",
        ])
        .expect("parse");
        let config = load_config(&cli).expect("config");
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.deadline_secs, Some(600));
        assert_eq!(config.aws_region.as_deref(), Some("us-east-2"));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let cli = Cli::try_parse_from(["stackrig", "--max-concurrent", "0", "cleanup", "abc123"])
            .expect("parse");
        assert!(load_config(&cli).is_err());
    }
}

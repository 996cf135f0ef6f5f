//! Stackrig CI - throwaway stacks for per-commit integration tests
//!
//! Provides a stack lifecycle orchestrator that:
//! - Derives infrastructure units from a commit's changed paths
//! - Drives each unit's stack through create / poll / terminal via a control plane
//! - Gates test execution on every stack coming up
//! - Tears every stack down again, one unit's failure never blocking another

pub mod aws;
pub mod cancel;
pub mod classifier;
pub mod config;
pub mod control_plane;
pub mod controller;
pub mod error;
pub mod fakes;
pub mod notify;
pub mod obs;
pub mod orchestrator;
pub mod outcome;
pub mod report;
pub mod telemetry;
pub mod test_runner;
pub mod unit;

// Re-export key types
pub use aws::AwsCliControlPlane;
pub use cancel::Cancellation;
pub use classifier::{ArtifactProbe, Classification, FsProbe, PathClassifier};
pub use config::{PollConfig, StackrigConfig};
pub use control_plane::{CloudControlPlane, ControlPlaneResult, StackStatus};
pub use controller::{Operation, PollPolicy, StackController, StatusClass};
pub use error::{ControlPlaneError, Result, StackrigError, TestRunError};
pub use notify::{
    ConsoleNotifySink, FanoutNotifySink, Notification, NotifySink, Severity, TracingNotifySink,
};
pub use orchestrator::{Orchestrator, ProvisionReport};
pub use outcome::{OutcomeKind, RunResult, StackOutcome, TestOutcome, TestResults};
pub use report::{RunPhase, RunReport};
pub use telemetry::init_tracing;
pub use test_runner::{ProcessTestRunner, TestRunOutput, TestRunner};
pub use unit::{stack_name, ArtifactLayout, ChangeSet, StackRequest, Unit};

//! Single-stack lifecycle state machine.
//!
//! ```text
//! Requested ──submit──▶ Polling ──▶ Succeeded | Failed | TimedOut
//!     │ submit rejected                 ▲
//!     └─────────────────────────────────┘ (Failed, no polling)
//! ```
//!
//! The same machine serves creation and deletion; [`Operation`] selects the
//! success label, the failure labels and the settle delay.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, Instrument};

use crate::cancel::Cancellation;
use crate::control_plane::{CloudControlPlane, StackStatus};
use crate::error::{ControlPlaneError, StackrigError};
use crate::obs;
use crate::outcome::{OutcomeKind, StackOutcome};

/// Diagnostic recorded when the poll budget runs out.
pub const TIMEOUT_DIAGNOSTIC: &str = "exceeded maximum wait";

/// Diagnostic recorded when the run is cancelled mid-drive.
pub const CANCELLED_DIAGNOSTIC: &str = "cancelled before reaching a terminal state";

/// Stack operation driven through the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Delete,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Delete => "delete",
        }
    }

    /// Status that ends polling successfully.
    pub fn success_status(&self) -> &'static str {
        match self {
            Operation::Create => StackStatus::CREATE_COMPLETE,
            Operation::Delete => StackStatus::DELETE_COMPLETE,
        }
    }

    /// Statuses that end polling with a failure.
    pub fn failure_statuses(&self) -> &'static [&'static str] {
        match self {
            Operation::Create => &[
                StackStatus::CREATE_FAILED,
                StackStatus::ROLLBACK_COMPLETE,
                StackStatus::ROLLBACK_FAILED,
                StackStatus::ROLLBACK_IN_PROGRESS,
            ],
            Operation::Delete => &[StackStatus::DELETE_FAILED],
        }
    }

    /// Classify a reported status for this operation.
    pub fn classify(&self, status: &StackStatus) -> StatusClass {
        if status.as_str() == self.success_status() {
            StatusClass::Succeeded
        } else if self.failure_statuses().contains(&status.as_str()) {
            StatusClass::Failed
        } else {
            StatusClass::InProgress
        }
    }

    fn success_outcome(&self) -> OutcomeKind {
        match self {
            Operation::Create => OutcomeKind::Success,
            Operation::Delete => OutcomeKind::Deleted,
        }
    }

    fn failure_outcome(&self) -> OutcomeKind {
        match self {
            Operation::Create => OutcomeKind::CreateFailed,
            Operation::Delete => OutcomeKind::DeleteFailed,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How a status relates to the operation being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Succeeded,
    Failed,
    InProgress,
}

/// Bounded polling policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of status queries per drive.
    pub max_attempts: u32,

    /// Wait between two consecutive queries.
    pub interval: Duration,

    /// Wait after a create submission before the first query.
    pub create_settle: Duration,

    /// Wait after a delete submission before the first query.
    pub delete_settle: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(180),
            create_settle: Duration::from_secs(30),
            delete_settle: Duration::ZERO,
        }
    }
}

impl PollPolicy {
    pub fn settle(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create_settle,
            Operation::Delete => self.delete_settle,
        }
    }

    /// Upper bound on time spent waiting in one drive, excluding API latency.
    pub fn worst_case(&self, operation: Operation) -> Duration {
        self.settle(operation) + self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// Drives one stack at a time through the control plane.
#[derive(Clone)]
pub struct StackController {
    control_plane: Arc<dyn CloudControlPlane>,
    policy: PollPolicy,
    capabilities: Vec<String>,
    cancel: Cancellation,
}

impl StackController {
    pub fn new(
        control_plane: Arc<dyn CloudControlPlane>,
        policy: PollPolicy,
        capabilities: Vec<String>,
        cancel: Cancellation,
    ) -> Self {
        Self {
            control_plane,
            policy,
            capabilities,
            cancel,
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    /// Drive `stack_name` through `operation` until a terminal outcome.
    ///
    /// Never fails: submission rejections, query failures, failure statuses,
    /// exhaustion and cancellation all become a [`StackOutcome`]. Polls at
    /// most `max_attempts` times and never sleeps after a terminal status.
    ///
    /// A cancelled create is never submitted. A cancelled delete is still
    /// submitted, then returns without waiting for it to settle.
    pub async fn drive(
        &self,
        stack_name: &str,
        operation: Operation,
        template_path: Option<&Path>,
    ) -> StackOutcome {
        let (outcome, polls) = self
            .drive_inner(stack_name, operation, template_path)
            .instrument(obs::stack_span(stack_name, operation.name()))
            .await;
        obs::emit_stack_terminal(&outcome, polls);
        outcome
    }

    async fn drive_inner(
        &self,
        stack_name: &str,
        operation: Operation,
        template_path: Option<&Path>,
    ) -> (StackOutcome, u32) {
        // Teardown is always requested, even after cancellation; only the
        // waiting is cut short.
        if operation == Operation::Create && self.cancel.is_cancelled() {
            return (
                StackOutcome::failed(OutcomeKind::TimedOut, stack_name, CANCELLED_DIAGNOSTIC),
                0,
            );
        }

        // Requested: a rejected submission never started, so it is not polled.
        if let Err(rejected) = self.submit(stack_name, operation, template_path).await {
            return (rejected, 0);
        }
        obs::emit_stack_submitted(stack_name, operation.name());

        if !self.cancel.sleep(self.policy.settle(operation)).await {
            return (
                StackOutcome::failed(OutcomeKind::TimedOut, stack_name, CANCELLED_DIAGNOSTIC),
                0,
            );
        }

        // Polling
        for attempt in 1..=self.policy.max_attempts {
            match self.control_plane.describe(stack_name).await {
                Ok(status) => {
                    obs::emit_stack_polled(stack_name, attempt, status.as_str());
                    match operation.classify(&status) {
                        StatusClass::Succeeded => {
                            return (StackOutcome::ok(operation.success_outcome(), stack_name), attempt);
                        }
                        StatusClass::Failed => {
                            return (
                                StackOutcome::failed(operation.failure_outcome(), stack_name, status.0),
                                attempt,
                            );
                        }
                        StatusClass::InProgress => {}
                    }
                }
                // A deleted stack stops being describable.
                Err(ControlPlaneError::NotFound(_)) if operation == Operation::Delete => {
                    debug!(attempt, "stack no longer describable after delete");
                    return (StackOutcome::ok(OutcomeKind::Deleted, stack_name), attempt);
                }
                Err(e) => {
                    return (
                        StackOutcome::failed(OutcomeKind::PollFailed, stack_name, e.to_string()),
                        attempt,
                    );
                }
            }

            if attempt < self.policy.max_attempts && !self.cancel.sleep(self.policy.interval).await {
                return (
                    StackOutcome::failed(OutcomeKind::TimedOut, stack_name, CANCELLED_DIAGNOSTIC),
                    attempt,
                );
            }
        }

        (
            StackOutcome::failed(OutcomeKind::TimedOut, stack_name, TIMEOUT_DIAGNOSTIC),
            self.policy.max_attempts,
        )
    }

    /// Issue the operation. `Err` carries the terminal outcome for a rejection.
    async fn submit(
        &self,
        stack_name: &str,
        operation: Operation,
        template_path: Option<&Path>,
    ) -> std::result::Result<(), StackOutcome> {
        match operation {
            Operation::Create => {
                let path = template_path.ok_or_else(|| {
                    StackOutcome::failed(OutcomeKind::CreateFailed, stack_name, "no template supplied")
                })?;
                let body = tokio::fs::read_to_string(path).await.map_err(|source| {
                    let err = StackrigError::TemplateRead {
                        path: path.to_path_buf(),
                        source,
                    };
                    StackOutcome::failed(OutcomeKind::CreateFailed, stack_name, err.to_string())
                })?;
                self.control_plane
                    .submit_create(stack_name, &body, &self.capabilities)
                    .await
                    .map_err(|e| StackOutcome::failed(OutcomeKind::CreateFailed, stack_name, e.to_string()))
            }
            Operation::Delete => match self.control_plane.submit_delete(stack_name).await {
                Ok(()) => Ok(()),
                Err(ControlPlaneError::NotFound(_)) => {
                    debug!("stack never existed; nothing to delete");
                    Err(StackOutcome::ok(OutcomeKind::Deleted, stack_name))
                }
                Err(e) => Err(StackOutcome::failed(OutcomeKind::DeleteFailed, stack_name, e.to_string())),
            },
        }
    }
}

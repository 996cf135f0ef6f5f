//! Phase orchestration: creation, gated test execution, and teardown.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::controller::{Operation, StackController};
use crate::error::TestRunError;
use crate::notify::{Notification, NotifySink};
use crate::obs;
use crate::outcome::{RunResult, StackOutcome, TestOutcome, TestResults};
use crate::test_runner::TestRunner;
use crate::unit::{stack_name, Unit};

/// Result of the provision flow (creation, then tests if the gate opened).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Creation outcome per unit.
    pub creation: RunResult,

    /// Test outcome per unit; `None` when the creation gate stayed closed.
    pub tests: Option<TestResults>,
}

impl ProvisionReport {
    /// Whether every stack reached `CREATE_COMPLETE`.
    pub fn creation_succeeded(&self) -> bool {
        self.creation.all_ok()
    }

    /// Whether stacks and tests all succeeded.
    pub fn success(&self) -> bool {
        self.creation_succeeded() && self.tests.as_ref().is_some_and(TestResults::all_passed)
    }
}

/// Runs stack phases for one commit.
pub struct Orchestrator {
    commit_id: String,
    controller: StackController,
    test_runner: Arc<dyn TestRunner>,
    notify: Arc<dyn NotifySink>,
    max_concurrent: usize,
}

impl Orchestrator {
    pub fn new(
        commit_id: impl Into<String>,
        controller: StackController,
        test_runner: Arc<dyn TestRunner>,
        notify: Arc<dyn NotifySink>,
    ) -> Self {
        Self {
            commit_id: commit_id.into(),
            controller,
            test_runner,
            notify,
            max_concurrent: 1,
        }
    }

    /// Drive up to `n` stacks at once. Results keep unit-name order.
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    pub fn commit_id(&self) -> &str {
        &self.commit_id
    }

    /// Create every unit's stack.
    ///
    /// Every unit is attempted; each failure is notified individually and,
    /// if any unit failed, a summary naming all failing units follows.
    pub async fn run_creation_phase(&self, units: &[Unit]) -> RunResult {
        let result = self.run_stack_phase(units, Operation::Create).await;

        if !result.all_ok() {
            let failed_units = result
                .failures()
                .into_iter()
                .map(|(unit, _)| unit.to_string())
                .collect();
            self.notify
                .notify(&Notification::CreationPhaseFailed { failed_units })
                .await;
        }
        result
    }

    /// Run every unit's test against its stack. One failure never stops the
    /// remaining tests.
    pub async fn run_test_phase(&self, units: &[Unit]) -> TestResults {
        let start = Instant::now();
        obs::emit_phase_started("test", &self.commit_id, units.len());

        let mut results = TestResults::new();
        for unit in units {
            let stack = stack_name(&unit.name, &self.commit_id);
            let started = Instant::now();
            let outcome = match self.test_runner.run(&unit.test_file_path, &stack).await {
                Ok(output) => TestOutcome {
                    stack_name: stack.clone(),
                    passed: true,
                    exit_code: Some(output.exit_code),
                    duration_ms: output.duration_ms,
                    diagnostic: None,
                },
                Err(e) => {
                    self.notify
                        .notify(&Notification::TestFailed {
                            unit: unit.name.clone(),
                            test_file: unit.test_file_path.clone(),
                            stack_name: stack.clone(),
                            diagnostic: e.to_string(),
                        })
                        .await;
                    TestOutcome {
                        stack_name: stack.clone(),
                        passed: false,
                        exit_code: match &e {
                            TestRunError::Failed { exit_code, .. } => Some(*exit_code),
                            _ => None,
                        },
                        duration_ms: started.elapsed().as_millis() as u64,
                        diagnostic: Some(e.to_string()),
                    }
                }
            };
            obs::emit_test_finished(&unit.name, &stack, outcome.passed, outcome.duration_ms);
            results.record(unit.name.clone(), outcome);
        }

        obs::emit_phase_finished(
            "test",
            &self.commit_id,
            start.elapsed().as_millis() as u64,
            results.failed_count(),
            results.all_passed(),
        );
        results
    }

    /// Creation phase, then the test phase only if every stack succeeded.
    ///
    /// The gate is global: a single failed unit skips tests for all units,
    /// including those whose stacks came up.
    pub async fn provision(&self, units: &[Unit]) -> ProvisionReport {
        let creation = self.run_creation_phase(units).await;
        if !creation.all_ok() {
            info!(
                failed = creation.failed_count(),
                "creation phase failed; skipping tests"
            );
            return ProvisionReport {
                creation,
                tests: None,
            };
        }

        let tests = self.run_test_phase(units).await;
        ProvisionReport {
            creation,
            tests: Some(tests),
        }
    }

    /// Delete every unit's stack regardless of how creation went. Each unit
    /// is independent of the others.
    pub async fn run_deletion_phase(&self, units: &[Unit]) -> RunResult {
        self.run_stack_phase(units, Operation::Delete).await
    }

    async fn run_stack_phase(&self, units: &[Unit], operation: Operation) -> RunResult {
        let start = Instant::now();
        obs::emit_phase_started(operation.name(), &self.commit_id, units.len());

        let outcomes: Vec<(String, StackOutcome)> = stream::iter(units)
            .map(|unit| async move {
                let outcome = self.drive_unit(unit, operation).await;
                (unit.name.clone(), outcome)
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let mut result = RunResult::new();
        for (unit, outcome) in outcomes {
            result.record(unit, outcome);
        }

        obs::emit_phase_finished(
            operation.name(),
            &self.commit_id,
            start.elapsed().as_millis() as u64,
            result.failed_count(),
            result.all_ok(),
        );
        result
    }

    async fn drive_unit(&self, unit: &Unit, operation: Operation) -> StackOutcome {
        let request = unit.stack_request(&self.commit_id);
        let stack = request.stack_name();
        let template = match operation {
            Operation::Create => Some(request.template_path.as_path()),
            Operation::Delete => None,
        };

        let outcome = self.controller.drive(&stack, operation, template).await;

        let notification = if outcome.is_ok() {
            Notification::StackSucceeded {
                unit: unit.name.clone(),
                stack_name: stack,
                operation,
            }
        } else {
            Notification::StackFailed {
                unit: unit.name.clone(),
                stack_name: stack,
                operation,
                outcome: outcome.kind(),
                diagnostic: outcome.diagnostic().unwrap_or_default().to_string(),
            }
        };
        self.notify.notify(&notification).await;
        outcome
    }
}

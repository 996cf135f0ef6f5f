//! Terminal per-unit outcomes and their aggregation.

use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::warn;

/// Terminal classification of one stack operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Stack reached `CREATE_COMPLETE`.
    Success,
    /// Create was rejected, or the stack reported a create/rollback failure.
    CreateFailed,
    /// A status query failed mid-poll.
    PollFailed,
    /// Polling budget exhausted, or the run was cancelled.
    TimedOut,
    /// Delete was rejected, or the stack reported `DELETE_FAILED`.
    DeleteFailed,
    /// Stack is gone.
    Deleted,
}

impl OutcomeKind {
    pub fn name(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::CreateFailed => "create_failed",
            OutcomeKind::PollFailed => "poll_failed",
            OutcomeKind::TimedOut => "timed_out",
            OutcomeKind::DeleteFailed => "delete_failed",
            OutcomeKind::Deleted => "deleted",
        }
    }

    /// Whether this outcome is the success label of its operation.
    pub fn is_ok(&self) -> bool {
        matches!(self, OutcomeKind::Success | OutcomeKind::Deleted)
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Recorded result of driving one stack. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutcome {
    kind: OutcomeKind,
    stack_name: String,
    diagnostic: Option<String>,
}

impl StackOutcome {
    pub fn new(kind: OutcomeKind, stack_name: impl Into<String>, diagnostic: Option<String>) -> Self {
        Self {
            kind,
            stack_name: stack_name.into(),
            diagnostic,
        }
    }

    pub fn ok(kind: OutcomeKind, stack_name: impl Into<String>) -> Self {
        Self::new(kind, stack_name, None)
    }

    pub fn failed(kind: OutcomeKind, stack_name: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self::new(kind, stack_name, Some(diagnostic.into()))
    }

    pub fn kind(&self) -> OutcomeKind {
        self.kind
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.kind.is_ok()
    }
}

/// Outcomes of one phase keyed by unit name.
///
/// Each unit holds exactly one outcome; later records for the same unit are
/// rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    outcomes: BTreeMap<String, StackOutcome>,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `unit`'s terminal outcome. Returns `false` if one already exists.
    pub fn record(&mut self, unit: impl Into<String>, outcome: StackOutcome) -> bool {
        match self.outcomes.entry(unit.into()) {
            Entry::Vacant(slot) => {
                slot.insert(outcome);
                true
            }
            Entry::Occupied(existing) => {
                warn!(unit = %existing.key(), "outcome already recorded; ignoring");
                false
            }
        }
    }

    pub fn get(&self, unit: &str) -> Option<&StackOutcome> {
        self.outcomes.get(unit)
    }

    /// Outcomes in unit-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StackOutcome)> {
        self.outcomes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Whether every recorded outcome is its operation's success label.
    pub fn all_ok(&self) -> bool {
        self.outcomes.values().all(StackOutcome::is_ok)
    }

    /// Failing units in name order.
    pub fn failures(&self) -> Vec<(&str, &StackOutcome)> {
        self.iter().filter(|(_, o)| !o.is_ok()).collect()
    }

    pub fn passed_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_ok()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.len() - self.passed_count()
    }
}

/// Result of one unit's test invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub stack_name: String,
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub diagnostic: Option<String>,
}

/// Test outcomes keyed by unit name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResults {
    outcomes: BTreeMap<String, TestOutcome>,
}

impl TestResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, unit: impl Into<String>, outcome: TestOutcome) {
        self.outcomes.entry(unit.into()).or_insert(outcome);
    }

    pub fn get(&self, unit: &str) -> Option<&TestOutcome> {
        self.outcomes.get(unit)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TestOutcome)> {
        self.outcomes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn all_passed(&self) -> bool {
        self.outcomes.values().all(|o| o.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.values().filter(|o| !o.passed).count()
    }
}

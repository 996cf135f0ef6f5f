//! Structured observability hooks for stack lifecycle events.
//!
//! This module provides:
//! - A stack-scoped span to instrument each drive with
//! - Emission functions for phase boundaries, submissions, polls, terminal outcomes and tests
//!
//! Every event carries a stable `event` field so log pipelines can filter on it.

use tracing::{info, warn};

use crate::outcome::StackOutcome;

/// Span for one stack drive, for use with `tracing::Instrument`.
pub fn stack_span(stack_name: &str, operation: &str) -> tracing::Span {
    tracing::info_span!("stackrig.stack", stack_name = %stack_name, operation = %operation)
}

/// Emit event: a phase started over `units` units.
pub fn emit_phase_started(phase: &str, commit_id: &str, units: usize) {
    info!(event = "phase.started", phase = %phase, commit_id = %commit_id, units = units);
}

/// Emit event: a phase finished.
pub fn emit_phase_finished(phase: &str, commit_id: &str, duration_ms: u64, failed: usize, success: bool) {
    info!(
        event = "phase.finished",
        phase = %phase,
        commit_id = %commit_id,
        duration_ms = duration_ms,
        failed = failed,
        success = success,
    );
}

/// Emit event: an operation was submitted for a stack.
pub fn emit_stack_submitted(stack_name: &str, operation: &str) {
    info!(event = "stack.submitted", stack_name = %stack_name, operation = %operation);
}

/// Emit event: a status query returned.
pub fn emit_stack_polled(stack_name: &str, attempt: u32, status: &str) {
    info!(event = "stack.polled", stack_name = %stack_name, attempt = attempt, status = %status);
}

/// Emit event: a stack reached a terminal outcome.
pub fn emit_stack_terminal(outcome: &StackOutcome, polls: u32) {
    if outcome.is_ok() {
        info!(
            event = "stack.terminal",
            stack_name = %outcome.stack_name(),
            outcome = %outcome.kind(),
            polls = polls,
        );
    } else {
        warn!(
            event = "stack.terminal",
            stack_name = %outcome.stack_name(),
            outcome = %outcome.kind(),
            polls = polls,
            diagnostic = outcome.diagnostic().unwrap_or(""),
        );
    }
}

/// Emit event: a unit's test finished.
pub fn emit_test_finished(unit: &str, stack_name: &str, passed: bool, duration_ms: u64) {
    info!(
        event = "test.finished",
        unit = %unit,
        stack_name = %stack_name,
        passed = passed,
        duration_ms = duration_ms,
    );
}

//! Human-facing notifications for terminal events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::controller::Operation;
use crate::outcome::OutcomeKind;

/// Who should act on a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational, for the change owner.
    Info,
    /// Needs attention from whoever maintains the pipeline.
    Alert,
}

/// A terminal event worth telling a human about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    StackSucceeded {
        unit: String,
        stack_name: String,
        operation: Operation,
    },
    StackFailed {
        unit: String,
        stack_name: String,
        operation: Operation,
        outcome: OutcomeKind,
        diagnostic: String,
    },
    MissingArtifacts {
        paths: Vec<PathBuf>,
    },
    /// The creation gate closed; lists every failing unit.
    CreationPhaseFailed {
        failed_units: Vec<String>,
    },
    TestFailed {
        unit: String,
        test_file: PathBuf,
        stack_name: String,
        diagnostic: String,
    },
}

impl Notification {
    pub fn severity(&self) -> Severity {
        match self {
            Notification::StackSucceeded { .. } => Severity::Info,
            _ => Severity::Alert,
        }
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notification::StackSucceeded {
                stack_name,
                operation: Operation::Create,
                ..
            } => write!(f, "{stack_name} was successfully created"),
            Notification::StackSucceeded {
                stack_name,
                operation: Operation::Delete,
                ..
            } => write!(f, "{stack_name} was deleted"),
            Notification::StackFailed {
                stack_name,
                operation,
                outcome,
                diagnostic,
                ..
            } => write!(f, "stack {stack_name} {operation} failed ({outcome}): {diagnostic}"),
            Notification::MissingArtifacts { paths } => {
                let lines: Vec<String> = paths
                    .iter()
                    .map(|p| format!("missing file: {}", p.display()))
                    .collect();
                write!(f, "{}", lines.join("\n"))
            }
            Notification::CreationPhaseFailed { failed_units } => write!(
                f,
                "stack creation failed for {} unit(s): {}; tests skipped",
                failed_units.len(),
                failed_units.join(", ")
            ),
            Notification::TestFailed {
                test_file,
                stack_name,
                diagnostic,
                ..
            } => write!(
                f,
                "test file {} failed against {stack_name}: {diagnostic}",
                test_file.display()
            ),
        }
    }
}

/// Destination for notifications (chat, email, topic, terminal).
#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn notify(&self, notification: &Notification);
}

/// Sink that writes notifications as structured log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifySink;

#[async_trait]
impl NotifySink for TracingNotifySink {
    async fn notify(&self, notification: &Notification) {
        match notification.severity() {
            Severity::Info => info!(event = "notify", message = %notification),
            Severity::Alert => warn!(event = "notify", message = %notification),
        }
    }
}

/// Sink that prints notifications to the terminal: info on stdout, alerts on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifySink;

#[async_trait]
impl NotifySink for ConsoleNotifySink {
    async fn notify(&self, notification: &Notification) {
        match notification.severity() {
            Severity::Info => println!("{notification}"),
            Severity::Alert => eprintln!("{notification}"),
        }
    }
}

/// Sink that forwards every notification to several sinks in order.
#[derive(Default, Clone)]
pub struct FanoutNotifySink {
    sinks: Vec<Arc<dyn NotifySink>>,
}

impl FanoutNotifySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn NotifySink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl NotifySink for FanoutNotifySink {
    async fn notify(&self, notification: &Notification) {
        for sink in &self.sinks {
            sink.notify(notification).await;
        }
    }
}

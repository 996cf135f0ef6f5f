//! Error types for stackrig

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a stackrig invocation.
///
/// Per-unit failures (submission, polling, tests) are never raised as errors;
/// they are recorded as [`crate::StackOutcome`]s instead.
#[derive(Error, Debug)]
pub enum StackrigError {
    /// One or more required artifacts are absent. Carries every missing path.
    #[error("missing {} required artifact(s): {}", paths.len(), paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    MissingArtifacts { paths: Vec<PathBuf> },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Template file could not be read for submission.
    #[error("failed to read template {}: {source}", path.display())]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Run report could not be serialized.
    #[error("failed to serialize run report: {0}")]
    Report(#[from] serde_json::Error),

    /// Generic filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for stackrig operations
pub type Result<T> = std::result::Result<T, StackrigError>;

/// Tagged failure of a control-plane call.
///
/// `NotFound` is kept apart from the other variants because, after a delete
/// request, it means the stack is gone rather than that the call broke.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneError {
    /// The named stack does not exist.
    #[error("stack not found: {0}")]
    NotFound(String),

    /// Retryable API failure (throttling, network, 5xx).
    #[error("transient control-plane error: {0}")]
    Transient(String),

    /// Non-retryable rejection (malformed template, duplicate name, auth).
    #[error("control-plane rejected request: {0}")]
    Terminal(String),
}

impl ControlPlaneError {
    /// Whether this error reports an absent stack.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControlPlaneError::NotFound(_))
    }
}

/// Errors produced while invoking a test command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TestRunError {
    /// The command could not be started.
    #[error("failed to spawn test command: {0}")]
    Spawn(String),

    /// The command ran past its timeout.
    #[error("test timed out after {0} seconds")]
    Timeout(u64),

    /// The command ran and reported failure.
    #[error("test exited with code {exit_code}: {stderr}")]
    Failed { exit_code: i32, stderr: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifacts_lists_every_path() {
        let err = StackrigError::MissingArtifacts {
            paths: vec![
                PathBuf::from("etl/etl-test.py"),
                PathBuf::from("etl/etl-infra.yaml"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("missing 2"));
        assert!(msg.contains("etl/etl-test.py"));
        assert!(msg.contains("etl/etl-infra.yaml"));
    }

    #[test]
    fn test_control_plane_not_found_is_tagged() {
        assert!(ControlPlaneError::NotFound("s".into()).is_not_found());
        assert!(!ControlPlaneError::Transient("s".into()).is_not_found());
        assert!(!ControlPlaneError::Terminal("s".into()).is_not_found());
    }
}

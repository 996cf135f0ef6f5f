//! Cloud control-plane seam.
//!
//! The orchestrator never talks to a provider directly. It is handed an
//! `Arc<dyn CloudControlPlane>` built once per run, which keeps credentials
//! and region out of module-level state and lets tests script responses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ControlPlaneError;

/// Result type for control-plane calls
pub type ControlPlaneResult<T> = std::result::Result<T, ControlPlaneError>;

/// Raw stack status string as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackStatus(pub String);

impl StackStatus {
    pub const CREATE_COMPLETE: &'static str = "CREATE_COMPLETE";
    pub const CREATE_IN_PROGRESS: &'static str = "CREATE_IN_PROGRESS";
    pub const CREATE_FAILED: &'static str = "CREATE_FAILED";
    pub const ROLLBACK_COMPLETE: &'static str = "ROLLBACK_COMPLETE";
    pub const ROLLBACK_FAILED: &'static str = "ROLLBACK_FAILED";
    pub const ROLLBACK_IN_PROGRESS: &'static str = "ROLLBACK_IN_PROGRESS";
    pub const DELETE_COMPLETE: &'static str = "DELETE_COMPLETE";
    pub const DELETE_IN_PROGRESS: &'static str = "DELETE_IN_PROGRESS";
    pub const DELETE_FAILED: &'static str = "DELETE_FAILED";

    pub fn new(status: impl Into<String>) -> Self {
        StackStatus(status.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asynchronous stack-management API.
///
/// Contract:
/// - `submit_*` only registers the operation; completion is observed via
///   `describe`.
/// - `describe` returns `ControlPlaneError::NotFound` for a stack that does
///   not exist (including one whose deletion has finished).
#[async_trait]
pub trait CloudControlPlane: Send + Sync {
    /// Request creation of `stack_name` from a template body.
    async fn submit_create(
        &self,
        stack_name: &str,
        template_body: &str,
        capabilities: &[String],
    ) -> ControlPlaneResult<()>;

    /// Request deletion of `stack_name`.
    async fn submit_delete(&self, stack_name: &str) -> ControlPlaneResult<()>;

    /// Current status of `stack_name`.
    async fn describe(&self, stack_name: &str) -> ControlPlaneResult<StackStatus>;
}

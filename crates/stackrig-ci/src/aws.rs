//! CloudFormation control plane backed by the `aws` CLI.
//!
//! Commands are spawned directly with typed arguments (no shell) and the
//! JSON output of `describe-stacks` is decoded with serde. Ambient AWS
//! credentials are picked up by the CLI itself.

use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::control_plane::{CloudControlPlane, ControlPlaneResult, StackStatus};
use crate::error::ControlPlaneError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacksOutput {
    stacks: Vec<StackDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackDescription {
    stack_status: String,
}

/// CloudFormation via `aws cloudformation ...`.
#[derive(Debug, Clone)]
pub struct AwsCliControlPlane {
    executable: String,
    region: Option<String>,
    profile: Option<String>,
}

impl Default for AwsCliControlPlane {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl AwsCliControlPlane {
    pub fn new(region: Option<String>, profile: Option<String>) -> Self {
        Self {
            executable: "aws".to_string(),
            region,
            profile,
        }
    }

    /// Use a different CLI binary (e.g. a wrapper or a pinned path).
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(region) = &self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args.extend(["--output", "json", "cloudformation"].map(String::from));
        args
    }

    /// An empty `AWS_PAGER` disables the pager on both CLI v1 and v2.
    fn command(&self, subcommand: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(self.base_args())
            .arg(subcommand)
            .args(args)
            .env("AWS_PAGER", "")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    async fn invoke(&self, subcommand: &str, args: &[&str]) -> ControlPlaneResult<String> {
        debug!(command = %self.executable, subcommand = %subcommand, "invoking aws cli");

        let output = self
            .command(subcommand, args)
            .output()
            .await
            .map_err(|e| ControlPlaneError::Transient(format!("failed to run {}: {}", self.executable, e)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(classify_cli_error(&String::from_utf8_lossy(&output.stderr)))
        }
    }
}

#[async_trait]
impl CloudControlPlane for AwsCliControlPlane {
    async fn submit_create(
        &self,
        stack_name: &str,
        template_body: &str,
        capabilities: &[String],
    ) -> ControlPlaneResult<()> {
        let mut args = vec!["--stack-name", stack_name, "--template-body", template_body];
        if !capabilities.is_empty() {
            args.push("--capabilities");
            args.extend(capabilities.iter().map(String::as_str));
        }
        self.invoke("create-stack", &args).await.map(|_| ())
    }

    async fn submit_delete(&self, stack_name: &str) -> ControlPlaneResult<()> {
        self.invoke("delete-stack", &["--stack-name", stack_name])
            .await
            .map(|_| ())
    }

    async fn describe(&self, stack_name: &str) -> ControlPlaneResult<StackStatus> {
        let stdout = self
            .invoke("describe-stacks", &["--stack-name", stack_name])
            .await?;
        parse_describe_output(stack_name, &stdout)
    }
}

/// Extract the status of the first stack in `describe-stacks` JSON.
fn parse_describe_output(stack_name: &str, stdout: &str) -> ControlPlaneResult<StackStatus> {
    let parsed: DescribeStacksOutput = serde_json::from_str(stdout)
        .map_err(|e| ControlPlaneError::Transient(format!("unreadable describe-stacks output: {e}")))?;
    parsed
        .stacks
        .into_iter()
        .next()
        .map(|s| StackStatus(s.stack_status))
        .ok_or_else(|| ControlPlaneError::NotFound(stack_name.to_string()))
}

/// Map CLI stderr onto the tagged error vocabulary.
fn classify_cli_error(stderr: &str) -> ControlPlaneError {
    let message = stderr.trim().to_string();
    if message.contains("does not exist") {
        return ControlPlaneError::NotFound(message);
    }
    const TRANSIENT_MARKERS: &[&str] = &[
        "Throttling",
        "Rate exceeded",
        "RequestLimitExceeded",
        "ServiceUnavailable",
        "InternalFailure",
        "Could not connect",
        "Read timeout",
    ];
    if TRANSIENT_MARKERS.iter().any(|m| message.contains(m)) {
        ControlPlaneError::Transient(message)
    } else {
        ControlPlaneError::Terminal(message)
    }
}

//! Integration test invocation against a provisioned stack.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::error::TestRunError;

/// Output of a passing test invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRunOutput {
    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

/// Runs one unit's test file against its stack.
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Run `test_file` with `stack_name` as its target. `Err` means the test
    /// could not run or reported failure.
    async fn run(&self, test_file: &Path, stack_name: &str) -> Result<TestRunOutput, TestRunError>;
}

/// Test runner that spawns `command... <test_file> <stack_name>` directly,
/// without a shell.
#[derive(Debug, Clone)]
pub struct ProcessTestRunner {
    /// Interpreter and leading arguments (first element is the executable).
    command: Vec<String>,

    /// Timeout in seconds (0 = unbounded).
    timeout_secs: u64,
}

impl ProcessTestRunner {
    pub fn new(command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            command,
            timeout_secs,
        }
    }
}

#[async_trait]
impl TestRunner for ProcessTestRunner {
    async fn run(&self, test_file: &Path, stack_name: &str) -> Result<TestRunOutput, TestRunError> {
        let start = Instant::now();

        let (exe, args) = self
            .command
            .split_first()
            .ok_or_else(|| TestRunError::Spawn("empty test command".to_string()))?;

        let child = Command::new(exe)
            .args(args)
            .arg(test_file)
            .arg(stack_name)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TestRunError::Spawn(format!("{exe}: {e}")))?;

        let waited = if self.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| TestRunError::Timeout(self.timeout_secs))?
        } else {
            child.wait_with_output().await
        };
        let output = waited.map_err(|e| TestRunError::Spawn(e.to_string()))?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(TestRunError::Failed { exit_code, stderr });
        }

        Ok(TestRunOutput {
            exit_code,
            stdout,
            stderr,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_file_and_stack_name_as_arguments() {
        let runner = ProcessTestRunner::new(vec!["echo".to_string()], 60);
        let output = runner
            .run(Path::new("etl/etl-test.py"), "etl-test-abc")
            .await
            .expect("echo should pass");
        assert_eq!(output.exit_code, 0);
        assert!(output.stdout.contains("etl/etl-test.py etl-test-abc"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let runner = ProcessTestRunner::new(vec!["false".to_string()], 60);
        let err = runner
            .run(Path::new("etl/etl-test.py"), "etl-test-abc")
            .await
            .expect_err("false should fail");
        assert!(matches!(err, TestRunError::Failed { exit_code, .. } if exit_code != 0));
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let runner = ProcessTestRunner::new(vec!["stackrig-no-such-binary".to_string()], 60);
        let err = runner
            .run(Path::new("t.py"), "s")
            .await
            .expect_err("spawn should fail");
        assert!(matches!(err, TestRunError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_empty_command_is_spawn_error() {
        let runner = ProcessTestRunner::new(vec![], 60);
        let err = runner.run(Path::new("t.py"), "s").await.expect_err("empty");
        assert!(matches!(err, TestRunError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let runner = ProcessTestRunner::new(vec!["sleep".to_string()], 1);
        // `sleep <file> <stack>` with a numeric file argument keeps the child alive
        let err = runner
            .run(Path::new("30"), "0")
            .await
            .expect_err("should time out");
        assert_eq!(err, TestRunError::Timeout(1));
    }
}

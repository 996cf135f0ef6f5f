//! In-memory fakes for collaborator traits (testing only)
//!
//! Provides `ScriptedControlPlane`, `RecordingTestRunner` and
//! `MemoryNotifySink` that satisfy the trait contracts without touching a
//! cloud account, spawning processes or printing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::control_plane::{CloudControlPlane, ControlPlaneResult, StackStatus};
use crate::error::{ControlPlaneError, TestRunError};
use crate::notify::{Notification, NotifySink};
use crate::test_runner::{TestRunOutput, TestRunner};

// ---------------------------------------------------------------------------
// ScriptedControlPlane
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ScriptState {
    describe_scripts: HashMap<String, VecDeque<ControlPlaneResult<StackStatus>>>,
    default_status: Option<StackStatus>,
    create_rejections: HashMap<String, ControlPlaneError>,
    delete_rejections: HashMap<String, ControlPlaneError>,
    describe_calls: HashMap<String, u32>,
    created: Vec<(String, String, Vec<String>)>,
    deleted: Vec<String>,
}

/// Control plane whose `describe` answers are scripted per stack.
///
/// Each scripted answer is consumed once; the last one repeats. Stacks with
/// no script answer with the default status, or `NotFound` if none is set.
#[derive(Debug, Default)]
pub struct ScriptedControlPlane {
    state: Mutex<ScriptState>,
}

impl ScriptedControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script successive `describe` statuses for `stack_name`.
    pub fn script_statuses<I, S>(&self, stack_name: &str, statuses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script_describe(
            stack_name,
            statuses.into_iter().map(|s| Ok(StackStatus::new(s))),
        );
    }

    /// Script successive `describe` results, errors included.
    pub fn script_describe<I>(&self, stack_name: &str, results: I)
    where
        I: IntoIterator<Item = ControlPlaneResult<StackStatus>>,
    {
        let mut state = self.state.lock().unwrap();
        state
            .describe_scripts
            .insert(stack_name.to_string(), results.into_iter().collect());
    }

    /// Status returned for stacks without a script.
    pub fn set_default_status(&self, status: &str) {
        self.state.lock().unwrap().default_status = Some(StackStatus::new(status));
    }

    /// Make `submit_create` fail for `stack_name`.
    pub fn reject_create(&self, stack_name: &str, error: ControlPlaneError) {
        let mut state = self.state.lock().unwrap();
        state.create_rejections.insert(stack_name.to_string(), error);
    }

    /// Make `submit_delete` fail for `stack_name`.
    pub fn reject_delete(&self, stack_name: &str, error: ControlPlaneError) {
        let mut state = self.state.lock().unwrap();
        state.delete_rejections.insert(stack_name.to_string(), error);
    }

    /// Number of `describe` calls made for `stack_name`.
    pub fn describe_calls(&self, stack_name: &str) -> u32 {
        let state = self.state.lock().unwrap();
        state.describe_calls.get(stack_name).copied().unwrap_or(0)
    }

    /// Template bodies accepted for `stack_name`.
    pub fn created_templates(&self, stack_name: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .created
            .iter()
            .filter(|(name, _, _)| name == stack_name)
            .map(|(_, body, _)| body.clone())
            .collect()
    }

    /// Capabilities passed with the accepted create of `stack_name`.
    pub fn created_capabilities(&self, stack_name: &str) -> Option<Vec<String>> {
        let state = self.state.lock().unwrap();
        state
            .created
            .iter()
            .find(|(name, _, _)| name == stack_name)
            .map(|(_, _, caps)| caps.clone())
    }

    /// Stack names whose create was accepted, in submission order.
    pub fn created_stacks(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.created.iter().map(|(name, _, _)| name.clone()).collect()
    }

    /// Stack names whose delete was attempted, in submission order.
    pub fn deleted_stacks(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }
}

#[async_trait]
impl CloudControlPlane for ScriptedControlPlane {
    async fn submit_create(
        &self,
        stack_name: &str,
        template_body: &str,
        capabilities: &[String],
    ) -> ControlPlaneResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.create_rejections.get(stack_name) {
            return Err(err.clone());
        }
        state.created.push((
            stack_name.to_string(),
            template_body.to_string(),
            capabilities.to_vec(),
        ));
        Ok(())
    }

    async fn submit_delete(&self, stack_name: &str) -> ControlPlaneResult<()> {
        let mut state = self.state.lock().unwrap();
        state.deleted.push(stack_name.to_string());
        match state.delete_rejections.get(stack_name) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn describe(&self, stack_name: &str) -> ControlPlaneResult<StackStatus> {
        let mut state = self.state.lock().unwrap();
        *state.describe_calls.entry(stack_name.to_string()).or_insert(0) += 1;

        if let Some(script) = state.describe_scripts.get_mut(stack_name) {
            if script.len() > 1 {
                if let Some(next) = script.pop_front() {
                    return next;
                }
            }
            if let Some(last) = script.front() {
                return last.clone();
            }
        }
        state
            .default_status
            .clone()
            .ok_or_else(|| ControlPlaneError::NotFound(stack_name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// RecordingTestRunner
// ---------------------------------------------------------------------------

/// Test runner that records invocations and fails the configured stacks.
#[derive(Debug, Default)]
pub struct RecordingTestRunner {
    calls: Mutex<Vec<(PathBuf, String)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingTestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make tests against `stack_name` fail.
    pub fn fail_for(&self, stack_name: &str) {
        self.failing.lock().unwrap().insert(stack_name.to_string());
    }

    /// Every `(test_file, stack_name)` invocation, in order.
    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TestRunner for RecordingTestRunner {
    async fn run(&self, test_file: &Path, stack_name: &str) -> Result<TestRunOutput, TestRunError> {
        self.calls
            .lock()
            .unwrap()
            .push((test_file.to_path_buf(), stack_name.to_string()));

        if self.failing.lock().unwrap().contains(stack_name) {
            return Err(TestRunError::Failed {
                exit_code: 1,
                stderr: format!("assertion failed against {stack_name}"),
            });
        }
        Ok(TestRunOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryNotifySink
// ---------------------------------------------------------------------------

/// Sink collecting notifications in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifySink {
    received: Mutex<Vec<Notification>>,
}

impl MemoryNotifySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifySink for MemoryNotifySink {
    async fn notify(&self, notification: &Notification) {
        self.received.lock().unwrap().push(notification.clone());
    }
}

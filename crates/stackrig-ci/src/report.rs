//! Machine-readable record of one invocation.
//!
//! Written at the end of `provision` or `cleanup` so a CI job that fails
//! halfway still leaves behind which stacks exist and why they failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::outcome::{RunResult, TestResults};

/// Which command produced the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Provision,
    Cleanup,
}

/// Serialized run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub commit_id: String,
    pub phase: RunPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Artifacts found missing; populated only when classification failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_artifacts: Vec<String>,

    /// Stack outcome per unit for the phase that ran.
    pub stacks: RunResult,

    /// Test outcome per unit; absent when tests did not run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestResults>,

    pub success: bool,
}

impl RunReport {
    /// Start a report with a fresh run id.
    pub fn start(commit_id: impl Into<String>, phase: RunPhase) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            commit_id: commit_id.into(),
            phase,
            started_at: Utc::now(),
            finished_at: None,
            missing_artifacts: Vec::new(),
            stacks: RunResult::new(),
            tests: None,
            success: false,
        }
    }

    /// Stamp the finish time and overall verdict.
    pub fn finish(&mut self, success: bool) {
        self.finished_at = Some(Utc::now());
        self.success = success;
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report, replacing any previous file atomically.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

//! Change sets, infrastructure units and stack identity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Changed file paths for one commit, in the order the caller supplied them.
///
/// Duplicates are allowed; they collapse when units are derived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    paths: Vec<String>,
}

impl ChangeSet {
    /// Create a change set from raw paths.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Raw paths.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Distinct, sorted unit names: the first `/`-separated segment of every
    /// path longer than one character.
    ///
    /// A path with an empty first segment (e.g. `/abs/path`) names no unit.
    pub fn unit_names(&self) -> BTreeSet<String> {
        self.paths
            .iter()
            .filter(|p| p.chars().count() > 1)
            .filter_map(|p| p.split('/').next())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Naming convention for per-unit artifacts.
///
/// Every unit `u` must carry `u/u<suffix>` for each required suffix. One
/// suffix marks the infrastructure template, another the test file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLayout {
    /// Suffix-qualified filenames every unit must carry.
    pub required_suffixes: BTreeSet<String>,

    /// Suffix identifying the infrastructure template.
    pub template_suffix: String,

    /// Suffix identifying the test file.
    pub test_suffix: String,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            required_suffixes: ["-test.py", "-script.py", "-infra.yaml"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            template_suffix: "-infra.yaml".to_string(),
            test_suffix: "-test.py".to_string(),
        }
    }
}

impl ArtifactLayout {
    /// Expected path of `unit`'s artifact with the given suffix.
    pub fn artifact_path(&self, root: &Path, unit: &str, suffix: &str) -> PathBuf {
        root.join(unit).join(format!("{unit}{suffix}"))
    }
}

/// A logical infrastructure/test grouping, keyed by top-level directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Top-level path segment.
    pub name: String,

    /// Infrastructure template submitted on create.
    pub template_path: PathBuf,

    /// Test file handed to the test runner.
    pub test_file_path: PathBuf,

    /// Every artifact the unit must carry, sorted.
    pub required_artifacts: Vec<PathBuf>,
}

impl Unit {
    /// Build a unit from its name and the artifact convention.
    pub fn new(name: impl Into<String>, root: &Path, layout: &ArtifactLayout) -> Self {
        let name = name.into();
        let required_artifacts = layout
            .required_suffixes
            .iter()
            .map(|suffix| layout.artifact_path(root, &name, suffix))
            .collect();
        Self {
            template_path: layout.artifact_path(root, &name, &layout.template_suffix),
            test_file_path: layout.artifact_path(root, &name, &layout.test_suffix),
            required_artifacts,
            name,
        }
    }

    /// Derive units straight from a change set without checking artifacts.
    ///
    /// Used by cleanup, which must tear down whatever a commit touched.
    pub fn from_change_set(
        change_set: &ChangeSet,
        root: &Path,
        layout: &ArtifactLayout,
    ) -> Vec<Unit> {
        change_set
            .unit_names()
            .into_iter()
            .map(|name| Unit::new(name, root, layout))
            .collect()
    }

    /// Stack request for this unit at `commit_id`.
    pub fn stack_request(&self, commit_id: &str) -> StackRequest {
        StackRequest {
            unit_name: self.name.clone(),
            commit_id: commit_id.to_string(),
            template_path: self.template_path.clone(),
        }
    }
}

/// Request to provision or tear down one unit's stack for one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackRequest {
    pub unit_name: String,
    pub commit_id: String,
    pub template_path: PathBuf,
}

impl StackRequest {
    /// Control-plane identity: `<unit>-test-<commit>`.
    pub fn stack_name(&self) -> String {
        stack_name(&self.unit_name, &self.commit_id)
    }
}

/// Stack name for a (unit, commit) pair.
pub fn stack_name(unit_name: &str, commit_id: &str) -> String {
    format!("{unit_name}-test-{commit_id}")
}

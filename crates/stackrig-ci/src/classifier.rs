//! Derive infrastructure units from a change set and validate their artifacts.

use crate::error::{Result, StackrigError};
use crate::unit::{ArtifactLayout, ChangeSet, Unit};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filesystem existence check.
pub trait ArtifactProbe: Send + Sync {
    /// Whether `path` exists as a regular file.
    fn is_file(&self, path: &Path) -> bool;
}

/// Probe backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsProbe;

impl ArtifactProbe for FsProbe {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Units of a change set, with their artifacts partitioned by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Units in sorted name order.
    pub units: Vec<Unit>,

    /// Template artifacts, one per unit.
    pub templates: BTreeSet<PathBuf>,

    /// Test artifacts, one per unit.
    pub tests: BTreeSet<PathBuf>,
}

/// Turns changed paths into validated units.
pub struct PathClassifier<P = FsProbe> {
    root: PathBuf,
    layout: ArtifactLayout,
    probe: P,
}

impl PathClassifier<FsProbe> {
    /// Classifier rooted at `root` checking the real filesystem.
    pub fn new(root: impl Into<PathBuf>, layout: ArtifactLayout) -> Self {
        Self::with_probe(root, layout, FsProbe)
    }
}

impl<P: ArtifactProbe> PathClassifier<P> {
    /// Classifier with an injected existence probe.
    pub fn with_probe(root: impl Into<PathBuf>, layout: ArtifactLayout, probe: P) -> Self {
        Self {
            root: root.into(),
            layout,
            probe,
        }
    }

    /// Artifact convention in use.
    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Derive units and verify every (unit, required suffix) artifact exists.
    ///
    /// Fails with [`StackrigError::MissingArtifacts`] listing all absent
    /// paths, sorted, if any is missing. Performs no mutation.
    pub fn classify(&self, change_set: &ChangeSet) -> Result<Classification> {
        let units = Unit::from_change_set(change_set, &self.root, &self.layout);

        let missing: Vec<PathBuf> = units
            .iter()
            .flat_map(|u| u.required_artifacts.iter())
            .filter(|path| !self.probe.is_file(path))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if !missing.is_empty() {
            return Err(StackrigError::MissingArtifacts { paths: missing });
        }

        let templates = units.iter().map(|u| u.template_path.clone()).collect();
        let tests = units.iter().map(|u| u.test_file_path.clone()).collect();

        debug!(units = units.len(), "classified change set");

        Ok(Classification {
            units,
            templates,
            tests,
        })
    }
}

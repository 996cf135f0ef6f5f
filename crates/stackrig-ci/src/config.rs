//! Run configuration.
//!
//! Every field has a default, so an absent or partial TOML file is valid:
//!
//! ```toml
//! required_suffixes = ["-test.py", "-script.py", "-infra.yaml"]
//! capabilities = ["CAPABILITY_NAMED_IAM"]
//! test_command = ["python3"]
//! max_concurrent = 2
//!
//! [poll]
//! max_attempts = 5
//! interval_secs = 180
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use crate::controller::PollPolicy;
use crate::error::{Result, StackrigError};
use crate::unit::ArtifactLayout;

/// Polling settings as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval_secs: u64,
    pub create_settle_secs: u64,
    pub delete_settle_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            interval_secs: policy.interval.as_secs(),
            create_settle_secs: policy.create_settle.as_secs(),
            delete_settle_secs: policy.delete_settle.as_secs(),
        }
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(cfg: &PollConfig) -> Self {
        PollPolicy {
            max_attempts: cfg.max_attempts,
            interval: Duration::from_secs(cfg.interval_secs),
            create_settle: Duration::from_secs(cfg.create_settle_secs),
            delete_settle: Duration::from_secs(cfg.delete_settle_secs),
        }
    }
}

/// Stackrig configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackrigConfig {
    /// Artifacts every unit must carry, as `unit/unit<suffix>`.
    pub required_suffixes: BTreeSet<String>,

    /// Which required suffix is the infrastructure template.
    pub template_suffix: String,

    /// Which required suffix is the test file.
    pub test_suffix: String,

    /// Capabilities granted on stack creation.
    pub capabilities: Vec<String>,

    pub poll: PollConfig,

    /// Test interpreter and leading arguments.
    pub test_command: Vec<String>,

    /// Per-test timeout in seconds (0 = unbounded).
    pub test_timeout_secs: u64,

    /// Units driven concurrently (1 = sequential).
    pub max_concurrent: usize,

    /// Global deadline for the whole run.
    pub deadline_secs: Option<u64>,

    pub aws_region: Option<String>,
    pub aws_profile: Option<String>,
}

impl Default for StackrigConfig {
    fn default() -> Self {
        let layout = ArtifactLayout::default();
        Self {
            required_suffixes: layout.required_suffixes,
            template_suffix: layout.template_suffix,
            test_suffix: layout.test_suffix,
            capabilities: vec!["CAPABILITY_NAMED_IAM".to_string()],
            poll: PollConfig::default(),
            test_command: vec!["python".to_string()],
            test_timeout_secs: 1800,
            max_concurrent: 1,
            deadline_secs: None,
            aws_region: None,
            aws_profile: None,
        }
    }
}

impl StackrigConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw).map_err(|source| StackrigError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.poll.max_attempts == 0 {
            return Err(StackrigError::Config("poll.max_attempts must be at least 1".into()));
        }
        if self.max_concurrent == 0 {
            return Err(StackrigError::Config("max_concurrent must be at least 1".into()));
        }
        if self.test_command.is_empty() {
            return Err(StackrigError::Config("test_command must not be empty".into()));
        }
        for (field, suffix) in [
            ("template_suffix", &self.template_suffix),
            ("test_suffix", &self.test_suffix),
        ] {
            if !self.required_suffixes.contains(suffix) {
                return Err(StackrigError::Config(format!(
                    "{field} '{suffix}' is not one of required_suffixes"
                )));
            }
        }
        Ok(())
    }

    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout {
            required_suffixes: self.required_suffixes.clone(),
            template_suffix: self.template_suffix.clone(),
            test_suffix: self.test_suffix.clone(),
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::from(&self.poll)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_pipeline_conventions() {
        let config = StackrigConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_policy(), PollPolicy::default());
        assert_eq!(config.capabilities, vec!["CAPABILITY_NAMED_IAM".to_string()]);
        assert_eq!(config.layout(), ArtifactLayout::default());
        assert_eq!(config.max_concurrent, 1);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "max_concurrent = 3\n\n[poll]\ninterval_secs = 10").expect("write");

        let config = StackrigConfig::load(file.path()).expect("load");
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.poll.interval_secs, 10);
        assert_eq!(config.poll.max_attempts, 5);
        assert_eq!(config.test_command, vec!["python".to_string()]);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let mut config = StackrigConfig::default();
        config.poll.max_attempts = 0;
        assert!(matches!(config.validate(), Err(StackrigError::Config(_))));
    }

    #[test]
    fn test_rejects_template_suffix_outside_required_set() {
        let config = StackrigConfig {
            template_suffix: "-stack.json".into(),
            ..StackrigConfig::default()
        };
        let err = config.validate().expect_err("should reject");
        assert!(err.to_string().contains("template_suffix"));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "max_concurrent = \"many\"").expect("write");
        assert!(matches!(
            StackrigConfig::load(file.path()),
            Err(StackrigError::ConfigParse { .. })
        ));
    }
}

//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use crate::field::Field;

/// Errors in engine configuration, surfaced at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The step plan has no steps
    #[error("step plan is empty")]
    EmptyPlan,

    /// A step is out of position
    #[error("step '{step}' has order index {found}, expected {expected}")]
    OrderIndex {
        /// Step id
        step: String,
        /// Expected index
        expected: usize,
        /// Declared index
        found: usize,
    },

    /// Two steps share an id
    #[error("duplicate step id: {0}")]
    DuplicateStep(String),

    /// A field is required by more than one step
    #[error("field {0} is required by more than one step")]
    FieldInTwoSteps(Field),

    /// Autosave interval of zero
    #[error("autosave interval must be greater than zero")]
    ZeroAutosaveInterval,

    /// Namespace would produce ambiguous storage keys
    #[error("invalid storage namespace: '{0}'")]
    Namespace(String),

    /// Config file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Whether gender and birth year gate the basic-info step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemographicsPolicy {
    /// Both fields are required to leave step 0
    #[default]
    Required,
    /// Both fields may be left blank
    Optional,
}

/// Assessment engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    /// Delay between the first unsaved edit and the autosave write, in seconds
    pub autosave_interval_secs: u64,

    /// Key namespace for persisted drafts
    pub storage_namespace: String,

    /// Schema version tag embedded in storage keys
    pub schema_version: u32,

    /// Demographics gate on the basic-info step
    pub demographics: DemographicsPolicy,

    /// Earliest accepted birth year
    pub min_birth_year: i64,

    /// Upper bounds of the Independent, Mild and Moderate care tiers over
    /// the ADL total; no classification when unset
    pub care_tier_thresholds: Option<[i64; 3]>,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            autosave_interval_secs: 30,
            storage_namespace: "assessment-draft".to_string(),
            schema_version: 1,
            demographics: DemographicsPolicy::Required,
            min_birth_year: 1900,
            care_tier_thresholds: None,
        }
    }
}

impl AssessmentConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file; missing keys fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the autosave interval.
    pub fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval_secs = interval.as_secs();
        self
    }

    /// Set the demographics policy.
    pub fn with_demographics(mut self, policy: DemographicsPolicy) -> Self {
        self.demographics = policy;
        self
    }

    /// Set the storage namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage_namespace = namespace.into();
        self
    }

    /// Autosave interval as a duration.
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.autosave_interval_secs == 0 {
            return Err(ConfigError::ZeroAutosaveInterval);
        }
        let ns = self.storage_namespace.as_str();
        if ns.is_empty() || ns.contains(':') {
            return Err(ConfigError::Namespace(self.storage_namespace.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AssessmentConfig::default();
        assert_eq!(config.autosave_interval(), Duration::from_secs(30));
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.demographics, DemographicsPolicy::Required);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AssessmentConfig =
            serde_json::from_str(r#"{"demographics": "optional"}"#).unwrap();
        assert_eq!(config.demographics, DemographicsPolicy::Optional);
        assert_eq!(config.storage_namespace, "assessment-draft");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero = AssessmentConfig::default().with_autosave_interval(Duration::from_millis(10));
        assert!(matches!(zero.validate(), Err(ConfigError::ZeroAutosaveInterval)));

        let colon = AssessmentConfig::default().with_namespace("a:b");
        assert!(matches!(colon.validate(), Err(ConfigError::Namespace(_))));
    }
}

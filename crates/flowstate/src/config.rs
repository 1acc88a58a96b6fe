use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feature::{FeatureKind, FeatureSet};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-session settings.
///
/// ```
/// use flowstate::SessionConfig;
///
/// let config = SessionConfig::from_toml_str("max_batch_invocations = 16").unwrap();
/// assert_eq!(config.max_batch_invocations, 16);
/// assert!(config.suppress_echo);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Skip reporting property writes back to the client that sent them.
    pub suppress_echo: bool,
    /// Upper bound on invocations in one inbound batch.
    pub max_batch_invocations: usize,
    /// Validate tree invariants before every collection in release builds.
    pub check_invariants: bool,
    /// Features declared by the root node.
    pub root_features: Vec<FeatureKind>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            suppress_echo: true,
            max_batch_invocations: 1024,
            check_invariants: false,
            root_features: vec![FeatureKind::PropertyMap, FeatureKind::ChildList],
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_invocations == 0 {
            return Err(ConfigError::Invalid(
                "max_batch_invocations must be at least 1".into(),
            ));
        }
        if self.root_features.is_empty() {
            return Err(ConfigError::Invalid("root_features must not be empty".into()));
        }
        Ok(())
    }

    pub fn root_feature_set(&self) -> FeatureSet {
        self.root_features.iter().copied().collect()
    }
}

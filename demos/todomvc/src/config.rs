//! Application configuration
//!
//! Read from environment variables with sensible defaults:
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `TODOMVC_STORAGE_KEY` | `todos-reframe` | Key the task map is saved under |
//! | `TODOMVC_STORAGE_DIR` | unset | Directory for file storage; in-memory when unset |
//! | `TODOMVC_SEED_EXAMPLES` | `true` | Start with two example tasks when nothing is stored |
//!
//! # Example
//!
//! ```no_run
//! use todomvc::AppConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::from_env()?;
//! println!("Storing tasks under {}", config.storage_key);
//! # Ok(())
//! # }
//! ```

use crate::storage::DEFAULT_STORAGE_KEY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable holding the storage key
pub const STORAGE_KEY_VAR: &str = "TODOMVC_STORAGE_KEY";

/// Environment variable holding the storage directory
pub const STORAGE_DIR_VAR: &str = "TODOMVC_STORAGE_DIR";

/// Environment variable controlling example tasks
pub const SEED_EXAMPLES_VAR: &str = "TODOMVC_SEED_EXAMPLES";

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable holds a value that cannot be parsed
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        /// Variable name
        var: &'static str,
        /// Value found
        value: String,
        /// What was expected
        reason: &'static str,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Key the task map is saved under
    pub storage_key: String,
    /// Directory for file-backed storage; `None` keeps tasks in memory
    pub storage_dir: Option<PathBuf>,
    /// Whether to start with example tasks when nothing is stored
    pub seed_examples: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            storage_dir: None,
            seed_examples: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(key) = lookup(STORAGE_KEY_VAR) {
            config.storage_key = key;
        }
        if let Some(dir) = lookup(STORAGE_DIR_VAR).filter(|dir| !dir.trim().is_empty()) {
            config.storage_dir = Some(PathBuf::from(dir));
        }
        if let Some(seed) = lookup(SEED_EXAMPLES_VAR) {
            config.seed_examples = parse_bool(SEED_EXAMPLES_VAR, &seed)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the storage key
    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Store tasks as files under `dir`
    #[must_use]
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Enable or disable the example tasks
    #[must_use]
    pub const fn with_seed_examples(mut self, seed: bool) -> Self {
        self.seed_examples = seed;
        self
    }

    /// Check that the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the storage key is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::Validation("storage key cannot be empty".to_string()));
        }
        Ok(())
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            reason: "expected true or false",
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code: failures should panic
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.storage_key, "todos-reframe");
        assert!(config.seed_examples);
    }

    #[test]
    fn test_variables_override_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            (STORAGE_KEY_VAR, "my-todos"),
            (STORAGE_DIR_VAR, "/tmp/todos"),
            (SEED_EXAMPLES_VAR, "off"),
        ]))
        .unwrap();

        assert_eq!(config.storage_key, "my-todos");
        assert_eq!(config.storage_dir, Some(PathBuf::from("/tmp/todos")));
        assert!(!config.seed_examples);
    }

    #[test]
    fn test_invalid_bool_is_rejected() {
        let error = AppConfig::from_lookup(lookup(&[(SEED_EXAMPLES_VAR, "maybe")])).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { var: SEED_EXAMPLES_VAR, .. }));
    }

    #[test]
    fn test_blank_key_is_rejected() {
        let error = AppConfig::from_lookup(lookup(&[(STORAGE_KEY_VAR, "  ")])).unwrap_err();
        assert!(matches!(error, ConfigError::Validation(_)));
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{ "seed_examples": false }"#).unwrap();
        assert_eq!(config, AppConfig::default().with_seed_examples(false));
    }
}

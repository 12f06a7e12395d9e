//! Run configuration as a hierarchical key/value tree.
//!
//! Keys are dotted paths (`parallelism`, `test_suites.net.server`). The tree is assembled before a run
//! starts and only read afterwards; typed accessors validate values on lookup.

use std::collections::BTreeMap;

use thiserror::Error;

/// Maximum number of test cases in flight at once.
pub const PARALLELISM_KEY: &str = "parallelism";

/// Prefix of per-suite variables: `test_suites.<suite>.<variable>`.
pub const TEST_SUITES_PREFIX: &str = "test_suites";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration key '{0}'")]
    InvalidKey(String),

    #[error("Invalid configuration override '{0}'; must be of the form key=value")]
    InvalidOverride(String),

    #[error("Invalid value '{value}' for configuration key '{key}': {reason}")]
    InvalidValue { key: String, value: String, reason: String },
}

/// Read-only configuration for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigTree {
    values: BTreeMap<String, String>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), ConfigError> {
        if !is_valid_key(key) {
            return Err(ConfigError::InvalidKey(key.to_string()));
        }
        self.values.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Apply a `key=value` assignment as given on the command line.
    pub fn set_override(&mut self, assignment: &str) -> Result<(), ConfigError> {
        let Some((key, value)) = assignment.split_once('=') else {
            return Err(ConfigError::InvalidOverride(assignment.to_string()));
        };
        if key.is_empty() {
            return Err(ConfigError::InvalidOverride(assignment.to_string()));
        }
        self.set(key, value)
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Number of test cases that may run concurrently; defaults to 1.
    ///
    /// ## Errors
    /// - `InvalidValue` if the value is not a positive integer.
    pub fn parallelism(&self) -> Result<usize, ConfigError> {
        let Some(raw) = self.lookup(PARALLELISM_KEY) else {
            return Ok(1);
        };
        match raw.trim().parse::<usize>() {
            Ok(0) => Err(invalid_value(PARALLELISM_KEY, raw, "must be at least 1")),
            Ok(n) => Ok(n),
            Err(e) => Err(invalid_value(PARALLELISM_KEY, raw, &e.to_string())),
        }
    }

    /// Look up the variable `var` of test suite `suite`.
    pub fn test_suite_var(&self, suite: &str, var: &str) -> Option<&str> {
        self.lookup(&format!("{}.{}.{}", TEST_SUITES_PREFIX, suite, var))
    }
}

fn invalid_value(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}

//! Runtime configuration.
//!
//! Values come from the environment with logged fallbacks to defaults:
//!
//! | Variable                       | Default           |
//! |--------------------------------|-------------------|
//! | `CLINIC_QUEUE_DB`              | `clinic-queue.db` |
//! | `CLINIC_QUEUE_TOKEN_PREFIX`    | `T`               |
//! | `CLINIC_QUEUE_BUSY_TIMEOUT_MS` | `5000`            |
//! | `RUST_LOG`                     | `info`            |

use std::{env, fmt::Display, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

/// Configuration errors.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Queue core configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// SQLite file path; `:memory:` for a throwaway database
    pub database_path: String,
    /// Leading segment of human-readable token numbers
    pub token_prefix: String,
    /// How long to wait on a locked database before reporting it unavailable
    pub busy_timeout_ms: u64,
    /// `tracing-subscriber` env-filter directive
    pub log_filter: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database_path: "clinic-queue.db".into(),
            token_prefix: "T".into(),
            busy_timeout_ms: 5000,
            log_filter: "info".into(),
        }
    }
}

impl QueueConfig {
    /// Create a builder for queue configuration
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::new()
    }

    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            database_path: load(&lookup, "CLINIC_QUEUE_DB", defaults.database_path)?,
            token_prefix: load(&lookup, "CLINIC_QUEUE_TOKEN_PREFIX", defaults.token_prefix)?,
            busy_timeout_ms: load(&lookup, "CLINIC_QUEUE_BUSY_TIMEOUT_MS", defaults.busy_timeout_ms)?,
            log_filter: load(&lookup, "RUST_LOG", defaults.log_filter)?,
        })
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn load<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

/// Builder for queue configuration
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
        }
    }

    pub fn database_path(mut self, path: impl Into<String>) -> Self {
        self.config.database_path = path.into();
        self
    }

    /// Use a private in-memory database
    pub fn in_memory(self) -> Self {
        self.database_path(":memory:")
    }

    pub fn token_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.token_prefix = prefix.into();
        self
    }

    pub fn busy_timeout_ms(mut self, ms: u64) -> Self {
        self.config.busy_timeout_ms = ms;
        self
    }

    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.log_filter = filter.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> QueueConfig {
        self.config
    }
}

impl Default for QueueConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = QueueConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = QueueConfig::from_lookup(lookup(&[
            ("CLINIC_QUEUE_DB", "/tmp/q.db"),
            ("CLINIC_QUEUE_TOKEN_PREFIX", "OPD"),
            ("CLINIC_QUEUE_BUSY_TIMEOUT_MS", " 250 "),
        ]))
        .unwrap();
        assert_eq!(config.database_path, "/tmp/q.db");
        assert_eq!(config.token_prefix, "OPD");
        assert_eq!(config.busy_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_malformed_number_is_an_error() {
        let err = QueueConfig::from_lookup(lookup(&[("CLINIC_QUEUE_BUSY_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "CLINIC_QUEUE_BUSY_TIMEOUT_MS"));
    }

    #[test]
    fn test_builder() {
        let config = QueueConfig::builder()
            .in_memory()
            .token_prefix("A")
            .busy_timeout_ms(10)
            .build();
        assert_eq!(config.database_path, ":memory:");
        assert_eq!(config.token_prefix, "A");
        assert_eq!(config.busy_timeout_ms, 10);
    }
}

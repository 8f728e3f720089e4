use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use turnstile_core::Token;
use turnstile_state::{StateError, StateStore};
use turnstile_state_memory::MemoryStateStore;

use crate::config::{StateConfig, TurnstileConfig};
use crate::error::CoordinationError;
use crate::lock::{DistributedLock, StoreLock};
use crate::retry::RetryBudget;
use crate::semaphore::Semaphore;

/// Create a state store based on the configured backend.
///
/// # Errors
///
/// Returns [`CoordinationError::Config`] for an unknown backend (or one whose
/// feature is disabled) and [`CoordinationError::State`] if the backend
/// cannot be initialized.
pub fn create_state_store(config: &StateConfig) -> Result<Arc<dyn StateStore>, CoordinationError> {
    let store: Arc<dyn StateStore> = match config.backend.as_str() {
        "memory" => Arc::new(MemoryStateStore::new()),
        #[cfg(feature = "redis")]
        "redis" => {
            let mut redis_config = config
                .url
                .as_deref()
                .map_or_else(
                    turnstile_state_redis::RedisConfig::default,
                    turnstile_state_redis::RedisConfig::new,
                )
                .with_pool_size(config.pool_size)
                .with_connection_timeout(config.connection_timeout());
            if let Some(prefix) = &config.prefix {
                redis_config = redis_config.with_prefix(prefix.as_str());
            }
            Arc::new(turnstile_state_redis::RedisStateStore::new(&redis_config)?)
        }
        other => {
            return Err(CoordinationError::Config(format!(
                "unknown state backend: {other} (is the feature enabled?)"
            )));
        }
    };

    info!(backend = %config.backend, "state store created");
    Ok(store)
}

/// A store, lock and semaphore wired from one [`TurnstileConfig`].
///
/// The `lock_*` and `*_slot` helpers apply the configured lease, retry
/// budget and lock timeout; the underlying [`lock`](Self::lock) and
/// [`semaphore`](Self::semaphore) take explicit values.
pub struct Turnstile {
    store: Arc<dyn StateStore>,
    lock: Arc<dyn DistributedLock>,
    semaphore: Semaphore,
    lease: Duration,
    budget: RetryBudget,
    lock_timeout: Duration,
}

impl Turnstile {
    /// Build a `Turnstile` from configuration.
    ///
    /// # Errors
    ///
    /// See [`create_state_store`].
    pub fn from_config(config: &TurnstileConfig) -> Result<Self, CoordinationError> {
        let store = create_state_store(&config.state)?;
        Self::with_store(store, config)
    }

    /// Build a `Turnstile` over an existing store, taking the lock and
    /// semaphore settings from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::Config`] if the semaphore cannot be built.
    pub fn with_store(
        store: Arc<dyn StateStore>,
        config: &TurnstileConfig,
    ) -> Result<Self, CoordinationError> {
        let lock: Arc<dyn DistributedLock> = Arc::new(StoreLock::new(Arc::clone(&store)));
        let semaphore = Semaphore::builder()
            .state(Arc::clone(&store))
            .lock(Arc::clone(&lock))
            .serialization_lease(config.semaphore.serialization_lease())
            .serialization_budget(config.semaphore.serialization_budget())
            .build()?;

        Ok(Self {
            store,
            lock,
            semaphore,
            lease: config.lock.lease(),
            budget: config.lock.budget(),
            lock_timeout: config.semaphore.lock_timeout(),
        })
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn lock(&self) -> &Arc<dyn DistributedLock> {
        &self.lock
    }

    pub fn semaphore(&self) -> &Semaphore {
        &self.semaphore
    }

    /// Acquire the lock `name` with the configured lease and retry budget.
    pub async fn acquire_lock(&self, name: &str) -> Result<Option<Token>, StateError> {
        self.lock.acquire(name, self.lease, &self.budget).await
    }

    /// Extend the lock `name` by the configured lease.
    pub async fn refresh_lock(&self, name: &str, token: &Token) -> Result<bool, StateError> {
        self.lock.refresh(name, token, self.lease).await
    }

    pub async fn release_lock(&self, name: &str, token: &Token) -> Result<bool, StateError> {
        self.lock.release(name, token).await
    }

    /// Take one of `limit` fair slots of `name`, serialized by the lock.
    pub async fn acquire_slot(&self, name: &str, limit: u32) -> Result<Option<Token>, StateError> {
        self.semaphore
            .acquire_fair_with_lock(name, limit, self.lock_timeout)
            .await
    }

    pub async fn refresh_slot(&self, name: &str, token: &Token) -> Result<bool, StateError> {
        self.semaphore.refresh_fair(name, token).await
    }

    pub async fn release_slot(&self, name: &str, token: &Token) -> Result<bool, StateError> {
        self.semaphore.release_fair(name, token).await
    }
}

impl std::fmt::Debug for Turnstile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Turnstile")
            .field("semaphore", &self.semaphore)
            .field("lease", &self.lease)
            .field("budget", &self.budget)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_is_rejected() {
        let config = StateConfig {
            backend: "etcd".to_owned(),
            ..StateConfig::default()
        };
        let err = create_state_store(&config).err().expect("should fail");
        assert!(err.to_string().contains("unknown state backend: etcd"));
    }

    #[cfg(not(feature = "redis"))]
    #[test]
    fn redis_backend_needs_feature() {
        let config = StateConfig {
            backend: "redis".to_owned(),
            ..StateConfig::default()
        };
        assert!(matches!(
            create_state_store(&config),
            Err(CoordinationError::Config(_))
        ));
    }

    #[cfg(feature = "redis")]
    #[test]
    fn redis_backend_is_created_lazily() {
        let config = TurnstileConfig::from_toml_str(
            "[state]\nbackend = \"redis\"\nurl = \"redis://127.0.0.1:6379\"\n",
        )
        .unwrap();
        assert!(create_state_store(&config.state).is_ok());
    }

    #[tokio::test]
    async fn memory_turnstile_from_config() {
        let config = TurnstileConfig::from_toml_str(
            "[lock]\nlease_ms = 2000\nacquire_timeout_ms = 0\n",
        )
        .unwrap();
        let turnstile = Turnstile::from_config(&config).unwrap();

        let token = turnstile
            .acquire_lock("job")
            .await
            .unwrap()
            .expect("should acquire");
        assert!(turnstile.acquire_lock("job").await.unwrap().is_none());
        assert!(turnstile.refresh_lock("job", &token).await.unwrap());
        assert!(turnstile.release_lock("job", &token).await.unwrap());

        let slot = turnstile
            .acquire_slot("pool", 1)
            .await
            .unwrap()
            .expect("should acquire");
        assert!(turnstile.acquire_slot("pool", 1).await.unwrap().is_none());
        assert!(turnstile.refresh_slot("pool", &slot).await.unwrap());
        assert!(turnstile.release_slot("pool", &slot).await.unwrap());
        assert_eq!(turnstile.semaphore().holders("pool").await.unwrap(), 0);
    }
}

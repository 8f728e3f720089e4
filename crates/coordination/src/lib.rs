//! Distributed locks and counting semaphores for Turnstile.
//!
//! Both primitives keep all of their state in a
//! [`StateStore`](turnstile_state::StateStore) and change it only through the
//! store's atomic operations, so any number of processes can coordinate
//! through one store.
//!
//! - [`StoreLock`] implements [`DistributedLock`]: an exclusive lease on a
//!   name, released and refreshed only by the token that acquired it.
//! - [`Semaphore`] admits up to `limit` holders of a name. The simple
//!   variant ranks callers by client timestamp; the fair variant ranks them
//!   by a per-name issuance counter and can be serialized through the lock.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use turnstile_coordination::{Semaphore, StoreLock, DistributedLock, RetryBudget};
//! use turnstile_state_memory::MemoryStateStore;
//!
//! let store = Arc::new(MemoryStateStore::new());
//!
//! let lock = StoreLock::new(store.clone());
//! let budget = RetryBudget::timeout(Duration::from_secs(5));
//! if let Some(token) = lock.acquire("reindex", Duration::from_secs(30), &budget).await? {
//!     // ... exclusive work ...
//!     lock.release("reindex", &token).await?;
//! }
//!
//! let semaphore = Semaphore::new(store);
//! if let Some(token) = semaphore
//!     .acquire_fair_with_lock("downloads", 4, Duration::from_secs(10))
//!     .await?
//! {
//!     // ... bounded work, calling refresh_fair periodically ...
//!     semaphore.release_fair("downloads", &token).await?;
//! }
//! ```

pub mod config;
pub mod error;
pub mod factory;
pub mod lock;
pub mod retry;
pub mod semaphore;
pub mod testing;

pub use config::{LockConfig, SemaphoreConfig, StateConfig, TurnstileConfig};
pub use error::CoordinationError;
pub use factory::{Turnstile, create_state_store};
pub use lock::{DistributedLock, StoreLock};
pub use retry::{DEFAULT_POLL_INTERVAL, RetryBudget};
pub use semaphore::{Semaphore, SemaphoreBuilder};

//! Exclusive, lease-based locking.
//!
//! A lock is a single store record `lock:{name}` holding the current holder's
//! token. It is created with set-if-absent plus a lease, so a crashed holder
//! blocks others for at most one lease. Release and refresh compare the
//! stored token against the caller's before touching the record; both are a
//! single atomic store call, so a holder whose lease already expired (and
//! whose lock was since taken by someone else) can neither delete nor extend
//! the new holder's record.
//!
//! ```text
//! Unheld --acquire--> Held(token) --release/expiry--> Unheld
//!                     Held(token) --refresh--> Held(token)
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use turnstile_core::{Token, TokenSource, UuidTokenSource};
use turnstile_state::{StateError, StateKey, StateStore};

use crate::retry::RetryBudget;

/// Trait for acquiring distributed locks.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try once to acquire the lock `name` for `lease`.
    /// Returns `None` if the lock is already held by another owner.
    async fn try_acquire(&self, name: &str, lease: Duration)
    -> Result<Option<Token>, StateError>;

    /// Acquire the lock, retrying within `budget`.
    /// Returns `None` once the budget is exhausted or cancelled.
    async fn acquire(
        &self,
        name: &str,
        lease: Duration,
        budget: &RetryBudget,
    ) -> Result<Option<Token>, StateError> {
        budget.run(move || self.try_acquire(name, lease)).await
    }

    /// Release the lock if `token` still holds it.
    /// Returns `false` if the lock is held by someone else or not at all.
    async fn release(&self, name: &str, token: &Token) -> Result<bool, StateError>;

    /// Extend the lease if `token` still holds the lock.
    /// Returns `false` if ownership was lost; the caller's critical section
    /// must then be treated as compromised.
    async fn refresh(&self, name: &str, token: &Token, lease: Duration)
    -> Result<bool, StateError>;

    /// Check whether `token` is the current live holder.
    async fn is_held(&self, name: &str, token: &Token) -> Result<bool, StateError>;
}

/// [`DistributedLock`] over any [`StateStore`].
#[derive(Clone)]
pub struct StoreLock {
    store: Arc<dyn StateStore>,
    tokens: Arc<dyn TokenSource>,
}

impl StoreLock {
    /// Create a lock manager issuing random UUID tokens.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            tokens: Arc::new(UuidTokenSource),
        }
    }

    #[must_use]
    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }
}

impl std::fmt::Debug for StoreLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLock")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DistributedLock for StoreLock {
    async fn try_acquire(
        &self,
        name: &str,
        lease: Duration,
    ) -> Result<Option<Token>, StateError> {
        let token = self.tokens.next_token();
        let acquired = self
            .store
            .check_and_set(&StateKey::lock(name), token.as_str(), lease)
            .await?;

        if acquired {
            debug!(name, %token, "lock acquired");
            Ok(Some(token))
        } else {
            Ok(None)
        }
    }

    async fn acquire(
        &self,
        name: &str,
        lease: Duration,
        budget: &RetryBudget,
    ) -> Result<Option<Token>, StateError> {
        let token = budget.run(move || self.try_acquire(name, lease)).await?;
        if token.is_none() {
            debug!(name, "lock not acquired within retry budget");
        }
        Ok(token)
    }

    async fn release(&self, name: &str, token: &Token) -> Result<bool, StateError> {
        let released = self
            .store
            .compare_and_delete(&StateKey::lock(name), token.as_str())
            .await?;

        if released {
            debug!(name, %token, "lock released");
        } else {
            debug!(name, %token, "lock release refused: token is not the holder");
        }
        Ok(released)
    }

    async fn refresh(
        &self,
        name: &str,
        token: &Token,
        lease: Duration,
    ) -> Result<bool, StateError> {
        let refreshed = self
            .store
            .compare_and_expire(&StateKey::lock(name), token.as_str(), lease)
            .await?;

        if !refreshed {
            warn!(name, %token, "lock lease lost before refresh");
        }
        Ok(refreshed)
    }

    async fn is_held(&self, name: &str, token: &Token) -> Result<bool, StateError> {
        let holder = self.store.get(&StateKey::lock(name)).await?;
        Ok(holder.as_deref() == Some(token.as_str()))
    }
}

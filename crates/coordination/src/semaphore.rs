//! Counting semaphore over a [`StateStore`].
//!
//! Holders of a semaphore `name` live in sorted sets:
//!
//! - `timeout:{name}` maps each token to the client time (ms) it was acquired
//!   or last refreshed. Entries at or below `now - lock_timeout` are stale and
//!   are pruned by the next acquire.
//! - `owner:{name}` (fair variant only) maps each token to its issuance number
//!   from `counter:{name}`. Admission is decided by rank in this set, so it
//!   follows issuance order rather than client timestamps.
//!
//! Every decision is made inside one store transaction. A rejected caller
//! removes its own entries with a second transaction before returning `None`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use turnstile_core::{Clock, SystemClock, Token, TokenSource, UuidTokenSource, duration_millis};
use turnstile_state::{Reply, StateError, StateKey, StateStore, Transaction};

use crate::error::CoordinationError;
use crate::lock::{DistributedLock, StoreLock};
use crate::retry::RetryBudget;

/// Default lease of the lock serializing [`Semaphore::acquire_fair_with_lock`].
pub const DEFAULT_SERIALIZATION_LEASE: Duration = Duration::from_secs(1);

/// Default time spent waiting for the serialization lock.
pub const DEFAULT_SERIALIZATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Bounded concurrent admission to a named resource.
pub struct Semaphore {
    store: Arc<dyn StateStore>,
    lock: Arc<dyn DistributedLock>,
    clock: Arc<dyn Clock>,
    tokens: Arc<dyn TokenSource>,
    serialization_lease: Duration,
    serialization_budget: RetryBudget,
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("clock", &self.clock)
            .field("tokens", &self.tokens)
            .field("serialization_lease", &self.serialization_lease)
            .field("serialization_budget", &self.serialization_budget)
            .finish_non_exhaustive()
    }
}

impl Semaphore {
    /// Semaphore over `store` with the system clock, UUID tokens and a
    /// [`StoreLock`] on the same store.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        let lock = Arc::new(StoreLock::new(Arc::clone(&store)));
        Self {
            store,
            lock,
            clock: Arc::new(SystemClock),
            tokens: Arc::new(UuidTokenSource),
            serialization_lease: DEFAULT_SERIALIZATION_LEASE,
            serialization_budget: RetryBudget::timeout(DEFAULT_SERIALIZATION_TIMEOUT),
        }
    }

    pub fn builder() -> SemaphoreBuilder {
        SemaphoreBuilder::new()
    }

    /// Acquire a slot, ranking holders by acquisition time.
    ///
    /// Entries with the same millisecond are ordered by token, so the rank
    /// alone cannot tell a newcomer from an earlier holder. A caller is only
    /// admitted if the index also holds at most `limit` live entries after
    /// its insert.
    ///
    /// Correct only while every client's clock agrees with the others; the
    /// entry of a host whose clock lags is pruned early, letting others in
    /// while it still uses the slot.
    #[instrument(name = "semaphore.acquire_simple", skip(self))]
    pub async fn acquire_simple(
        &self,
        name: &str,
        limit: u32,
        lock_timeout: Duration,
    ) -> Result<Option<Token>, StateError> {
        let timeout_key = StateKey::timeout(name);
        let token = self.tokens.next_token();
        let now = self.clock.now_millis();

        let tx = Transaction::new()
            .remove_by_score(&timeout_key, stale_cutoff(now, lock_timeout))
            .add(&timeout_key, token.as_str(), now)
            .rank(&timeout_key, token.as_str())
            .cardinality(&timeout_key);
        let replies = self.store.exec(&tx).await?;
        let rank = rank_after_insert(replies.get(2)?, &token)?;
        let live = replies.get(3)?.as_int()?;

        if rank < u64::from(limit) && live <= i64::from(limit) {
            debug!(%token, rank, live, "semaphore slot acquired");
            return Ok(Some(token));
        }

        self.store
            .exec(&Transaction::new().remove(&timeout_key, token.as_str()))
            .await?;
        debug!(%token, rank, live, "semaphore full, entry withdrawn");
        Ok(None)
    }

    /// Release a slot taken with [`acquire_simple`](Self::acquire_simple).
    /// Returns `false` if the token was not (or no longer) a holder.
    #[instrument(name = "semaphore.release_simple", skip(self))]
    pub async fn release_simple(&self, name: &str, token: &Token) -> Result<bool, StateError> {
        let replies = self
            .store
            .exec(&Transaction::new().remove(&StateKey::timeout(name), token.as_str()))
            .await?;
        let released = replies.get(0)?.as_int()? > 0;
        if !released {
            debug!("release refused: token holds no slot");
        }
        Ok(released)
    }

    /// Acquire a slot, ranking holders by issuance number.
    ///
    /// Client clocks are only used to expire stale holders, so admission
    /// order survives skew smaller than `lock_timeout`.
    #[instrument(name = "semaphore.acquire_fair", skip(self))]
    pub async fn acquire_fair(
        &self,
        name: &str,
        limit: u32,
        lock_timeout: Duration,
    ) -> Result<Option<Token>, StateError> {
        let timeout_key = StateKey::timeout(name);
        let owner_key = StateKey::owner(name);
        let counter_key = StateKey::counter(name);
        let token = self.tokens.next_token();
        let now = self.clock.now_millis();

        // Intersecting drops owners whose timeout entry was just pruned. Issuance
        // numbers are far below millisecond timestamps, so MIN keeps them.
        let tx = Transaction::new()
            .remove_by_score(&timeout_key, stale_cutoff(now, lock_timeout))
            .intersect_min(&owner_key, &[&timeout_key, &owner_key])
            .add_sequenced(&owner_key, token.as_str(), &counter_key)
            .add(&timeout_key, token.as_str(), now)
            .rank(&owner_key, token.as_str());
        let replies = self.store.exec(&tx).await?;
        let rank = rank_after_insert(replies.get(4)?, &token)?;

        if rank < u64::from(limit) {
            debug!(%token, rank, "fair semaphore slot acquired");
            return Ok(Some(token));
        }

        self.store
            .exec(
                &Transaction::new()
                    .remove(&owner_key, token.as_str())
                    .remove(&timeout_key, token.as_str()),
            )
            .await?;
        debug!(%token, rank, "fair semaphore full, entry withdrawn");
        Ok(None)
    }

    /// Release a slot taken with one of the fair acquires.
    /// Returns `true` if the token was present in either index.
    #[instrument(name = "semaphore.release_fair", skip(self))]
    pub async fn release_fair(&self, name: &str, token: &Token) -> Result<bool, StateError> {
        let replies = self
            .store
            .exec(
                &Transaction::new()
                    .remove(&StateKey::timeout(name), token.as_str())
                    .remove(&StateKey::owner(name), token.as_str()),
            )
            .await?;
        let removed = replies.get(0)?.as_int()? + replies.get(1)?.as_int()?;
        if removed == 0 {
            debug!("release refused: token holds no slot");
        }
        Ok(removed > 0)
    }

    /// Reset the token's acquisition time to now.
    ///
    /// Returns `false` if the token had already been evicted; its leftover
    /// entries are released and the caller must stop using the slot.
    #[instrument(name = "semaphore.refresh_fair", skip(self))]
    pub async fn refresh_fair(&self, name: &str, token: &Token) -> Result<bool, StateError> {
        let now = self.clock.now_millis();
        let replies = self
            .store
            .exec(&Transaction::new().add(&StateKey::timeout(name), token.as_str(), now))
            .await?;

        if replies.get(0)?.as_int()? == 0 {
            return Ok(true);
        }

        // The add created the entry, so the token had been pruned.
        warn!("semaphore slot expired before refresh");
        self.release_fair(name, token).await?;
        Ok(false)
    }

    /// [`acquire_fair`](Self::acquire_fair) under the lock `name`.
    ///
    /// Serializing acquirers closes the window in which two callers could
    /// interleave between counter increment and rank check. If the lock
    /// cannot be taken within the serialization budget, no semaphore state
    /// is written and `None` is returned.
    #[instrument(name = "semaphore.acquire_fair_with_lock", skip(self))]
    pub async fn acquire_fair_with_lock(
        &self,
        name: &str,
        limit: u32,
        lock_timeout: Duration,
    ) -> Result<Option<Token>, StateError> {
        let Some(lock_token) = self
            .lock
            .acquire(name, self.serialization_lease, &self.serialization_budget)
            .await?
        else {
            debug!("serialization lock busy");
            return Ok(None);
        };

        let acquired = self.acquire_fair(name, limit, lock_timeout).await;

        // The lease bounds how long a failed release can block others.
        match self.lock.release(name, &lock_token).await {
            Ok(true) => {}
            Ok(false) => warn!("serialization lock lost before release"),
            Err(e) => warn!(error = %e, "failed to release serialization lock"),
        }

        acquired
    }

    /// Number of entries in the timeout index of `name`.
    ///
    /// Stale entries are counted until the next acquire prunes them.
    pub async fn holders(&self, name: &str) -> Result<u64, StateError> {
        let replies = self
            .store
            .exec(&Transaction::new().cardinality(&StateKey::timeout(name)))
            .await?;
        Ok(u64::try_from(replies.get(0)?.as_int()?).unwrap_or(0))
    }
}

/// Highest acquisition time that counts as expired at `now`.
fn stale_cutoff(now: i64, lock_timeout: Duration) -> i64 {
    now.saturating_sub(duration_millis(lock_timeout))
}

fn rank_after_insert(reply: Reply, token: &Token) -> Result<u64, StateError> {
    reply.as_rank()?.ok_or_else(|| {
        StateError::UnexpectedReply(format!("token {token} has no rank right after insert"))
    })
}

/// Fluent builder for [`Semaphore`].
///
/// A [`StateStore`] is required. The lock defaults to a [`StoreLock`] over
/// the same store, the clock to [`SystemClock`] and tokens to UUIDs.
pub struct SemaphoreBuilder {
    state: Option<Arc<dyn StateStore>>,
    lock: Option<Arc<dyn DistributedLock>>,
    clock: Option<Arc<dyn Clock>>,
    tokens: Option<Arc<dyn TokenSource>>,
    serialization_lease: Duration,
    serialization_budget: RetryBudget,
}

impl SemaphoreBuilder {
    pub fn new() -> Self {
        Self {
            state: None,
            lock: None,
            clock: None,
            tokens: None,
            serialization_lease: DEFAULT_SERIALIZATION_LEASE,
            serialization_budget: RetryBudget::timeout(DEFAULT_SERIALIZATION_TIMEOUT),
        }
    }

    /// Set the state store implementation.
    #[must_use]
    pub fn state(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state = Some(store);
        self
    }

    /// Set the lock used to serialize fair acquires.
    #[must_use]
    pub fn lock(mut self, lock: Arc<dyn DistributedLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Lease of the serialization lock. Keep it short: a crashed acquirer
    /// blocks every fair acquire on the same name for this long.
    #[must_use]
    pub fn serialization_lease(mut self, lease: Duration) -> Self {
        self.serialization_lease = lease;
        self
    }

    /// How long fair acquires wait for the serialization lock.
    #[must_use]
    pub fn serialization_budget(mut self, budget: RetryBudget) -> Self {
        self.serialization_budget = budget;
        self
    }

    /// Build the semaphore.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::Config`] if no state store was supplied.
    pub fn build(self) -> Result<Semaphore, CoordinationError> {
        let store = self
            .state
            .ok_or_else(|| CoordinationError::Config("state store is required".into()))?;

        let lock = self
            .lock
            .unwrap_or_else(|| Arc::new(StoreLock::new(Arc::clone(&store))));

        Ok(Semaphore {
            store,
            lock,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            tokens: self.tokens.unwrap_or_else(|| Arc::new(UuidTokenSource)),
            serialization_lease: self.serialization_lease,
            serialization_budget: self.serialization_budget,
        })
    }
}

impl Default for SemaphoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

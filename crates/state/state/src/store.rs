use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateError;
use crate::key::StateKey;
use crate::transaction::{Replies, Transaction};

/// The atomic store every lock and semaphore operation is built on.
///
/// Implementations must be `Send + Sync` and safe for concurrent access from
/// many processes. Expiry of lock records is enforced by the store itself.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Execute every operation of `tx` as one indivisible unit.
    ///
    /// Returns one reply per operation, in order.
    async fn exec(&self, tx: &Transaction) -> Result<Replies, StateError>;

    /// Check if a key exists; if not, set it atomically with a TTL.
    /// Returns `true` if the key was newly set, `false` if a live value
    /// already existed.
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StateError>;

    /// Delete a key only if its current value equals `expected`.
    /// Returns `true` if the key was deleted.
    async fn compare_and_delete(&self, key: &StateKey, expected: &str)
    -> Result<bool, StateError>;

    /// Reset a key's TTL only if its current value equals `expected`.
    /// Returns `true` if the TTL was reset.
    async fn compare_and_expire(
        &self,
        key: &StateKey,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StateError>;

    /// Get the value for a key. Returns `None` if not found or expired.
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError>;
}

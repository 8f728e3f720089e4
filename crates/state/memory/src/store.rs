use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use turnstile_core::{Clock, SystemClock, duration_millis};
use turnstile_state::error::StateError;
use turnstile_state::key::StateKey;
use turnstile_state::store::StateStore;
use turnstile_state::transaction::{Op, Replies, Reply, Transaction};

use crate::sorted_set::SortedSet;

/// A single lock-style record with a lease.
#[derive(Debug, Clone)]
struct Record {
    value: String,
    expires_at_ms: i64,
}

impl Record {
    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Sorted sets and counters, mutated only under one mutex so a whole
/// transaction is applied atomically.
#[derive(Debug, Default)]
struct Keyspace {
    sets: HashMap<String, SortedSet>,
    counters: HashMap<String, i64>,
}

impl Keyspace {
    fn apply(&mut self, op: &Op) -> Reply {
        match op {
            Op::RemoveByScore { key, max } => {
                let removed = self
                    .sets
                    .get_mut(&key.canonical())
                    .map_or(0, |set| set.remove_by_score(*max));
                self.drop_if_empty(key);
                Reply::Int(count(removed))
            }
            Op::Add { key, member, score } => {
                let added = self.set_mut(key).insert(member, *score);
                Reply::Int(i64::from(added))
            }
            Op::AddSequenced {
                key,
                member,
                counter,
            } => {
                let seq = self.increment(counter);
                self.set_mut(key).insert(member, seq);
                Reply::Int(seq)
            }
            Op::Rank { key, member } => self
                .sets
                .get(&key.canonical())
                .and_then(|set| set.rank(member))
                .map_or(Reply::Nil, |rank| Reply::Int(count(rank))),
            Op::Remove { key, member } => {
                let removed = self
                    .sets
                    .get_mut(&key.canonical())
                    .is_some_and(|set| set.remove(member));
                self.drop_if_empty(key);
                Reply::Int(i64::from(removed))
            }
            Op::IntersectMin { dest, sources } => {
                let rendered: Vec<String> = sources.iter().map(StateKey::canonical).collect();
                let inputs: Vec<Option<&SortedSet>> =
                    rendered.iter().map(|k| self.sets.get(k)).collect();
                let result = SortedSet::intersect_min(&inputs);
                let size = result.len();
                if result.is_empty() {
                    self.sets.remove(&dest.canonical());
                } else {
                    self.sets.insert(dest.canonical(), result);
                }
                Reply::Int(count(size))
            }
            Op::Increment { key } => Reply::Int(self.increment(key)),
            Op::Cardinality { key } => Reply::Int(count(
                self.sets.get(&key.canonical()).map_or(0, SortedSet::len),
            )),
        }
    }

    fn set_mut(&mut self, key: &StateKey) -> &mut SortedSet {
        self.sets.entry(key.canonical()).or_default()
    }

    fn increment(&mut self, key: &StateKey) -> i64 {
        let value = self.counters.entry(key.canonical()).or_insert(0);
        *value += 1;
        *value
    }

    /// Missing and empty sorted sets are indistinguishable, as in Redis.
    fn drop_if_empty(&mut self, key: &StateKey) {
        let rendered = key.canonical();
        if self.sets.get(&rendered).is_some_and(SortedSet::is_empty) {
            self.sets.remove(&rendered);
        }
    }
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// In-memory [`StateStore`].
///
/// Lock records live in a [`DashMap`] and expire lazily against the injected
/// clock. Every call first yields to the runtime, standing in for the network
/// round trip to a real store, so concurrent tasks interleave between calls
/// exactly as remote clients would.
#[derive(Debug)]
pub struct MemoryStateStore {
    records: DashMap<String, Record>,
    keyspace: Mutex<Keyspace>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl MemoryStateStore {
    /// Create a new, empty in-memory store reading the system clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose lease expiry follows `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            keyspace: Mutex::new(Keyspace::default()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail with [`StateError::Connection`] until
    /// switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    async fn round_trip(&self) -> Result<(), StateError> {
        tokio::task::yield_now().await;
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StateError::Connection(
                "memory store marked unavailable".to_owned(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn exec(&self, tx: &Transaction) -> Result<Replies, StateError> {
        self.round_trip().await?;
        let mut keyspace = self.keyspace.lock();
        let replies = tx.ops().iter().map(|op| keyspace.apply(op)).collect();
        Ok(Replies::new(replies))
    }

    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StateError> {
        self.round_trip().await?;
        let rendered = key.canonical();
        let now = self.clock.now_millis();

        // An expired record is as good as absent.
        self.records
            .remove_if(&rendered, |_, record| record.is_expired(now));

        let was_inserted = match self.records.entry(rendered) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Record {
                    value: value.to_owned(),
                    expires_at_ms: now.saturating_add(duration_millis(ttl)),
                });
                true
            }
        };

        Ok(was_inserted)
    }

    async fn compare_and_delete(
        &self,
        key: &StateKey,
        expected: &str,
    ) -> Result<bool, StateError> {
        self.round_trip().await?;
        let now = self.clock.now_millis();
        let removed = self.records.remove_if(&key.canonical(), |_, record| {
            !record.is_expired(now) && record.value == expected
        });
        Ok(removed.is_some())
    }

    async fn compare_and_expire(
        &self,
        key: &StateKey,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StateError> {
        self.round_trip().await?;
        let now = self.clock.now_millis();
        let Some(mut record) = self.records.get_mut(&key.canonical()) else {
            return Ok(false);
        };
        if record.is_expired(now) || record.value != expected {
            return Ok(false);
        }
        record.expires_at_ms = now.saturating_add(duration_millis(ttl));
        Ok(true)
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        self.round_trip().await?;
        let rendered = key.canonical();
        let now = self.clock.now_millis();

        // Lazy TTL eviction: check and remove if expired.
        if let Some(record) = self.records.get(&rendered) {
            if record.is_expired(now) {
                drop(record);
                self.records
                    .remove_if(&rendered, |_, record| record.is_expired(now));
                return Ok(None);
            }
            return Ok(Some(record.value.clone()));
        }

        Ok(None)
    }
}

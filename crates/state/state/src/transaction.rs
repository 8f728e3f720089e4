//! Atomic multi-operation transactions.
//!
//! A [`Transaction`] is an ordered list of [`Op`]s that a [`StateStore`]
//! applies as one indivisible unit: every operation runs, in order, with no
//! other transaction's effects interleaved, and each contributes exactly one
//! [`Reply`] at the same position.
//!
//! Ordered collections ("sorted sets") keep members ordered ascending by an
//! integer score, ties broken by member bytes.
//!
//! [`StateStore`]: crate::store::StateStore

use crate::error::StateError;
use crate::key::StateKey;

/// A single sub-operation of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Remove every member with `score <= max`. Replies with the removed count.
    RemoveByScore { key: StateKey, max: i64 },
    /// Insert `member`, or update its score. Replies `1` if newly added, `0`
    /// if an existing member was updated.
    Add {
        key: StateKey,
        member: String,
        score: i64,
    },
    /// Increment `counter`, then insert or update `member` scored by the new
    /// counter value. Replies with that value.
    AddSequenced {
        key: StateKey,
        member: String,
        counter: StateKey,
    },
    /// 0-based ascending rank of `member`. Replies nil when absent.
    Rank { key: StateKey, member: String },
    /// Remove `member`. Replies with the removed count.
    Remove { key: StateKey, member: String },
    /// Store into `dest` the members present in every source, each scored by
    /// the minimum of its source scores. Replies with the resulting size.
    IntersectMin {
        dest: StateKey,
        sources: Vec<StateKey>,
    },
    /// Increment a counter (created at 0). Replies with the new value.
    Increment { key: StateKey },
    /// Number of members. Replies `0` for a missing key.
    Cardinality { key: StateKey },
}

/// Result of one sub-operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Int(i64),
    Nil,
}

impl Reply {
    /// Interpret as an integer reply.
    pub fn as_int(self) -> Result<i64, StateError> {
        match self {
            Self::Int(n) => Ok(n),
            Self::Nil => Err(StateError::UnexpectedReply(
                "expected integer, got nil".to_owned(),
            )),
        }
    }

    /// Interpret as a rank reply: a non-negative integer or nil.
    pub fn as_rank(self) -> Result<Option<u64>, StateError> {
        match self {
            Self::Int(n) => u64::try_from(n)
                .map(Some)
                .map_err(|_| StateError::UnexpectedReply(format!("negative rank {n}"))),
            Self::Nil => Ok(None),
        }
    }
}

/// Replies of an executed transaction, positionally matching its operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replies(Vec<Reply>);

impl Replies {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self(replies)
    }

    /// The reply of the operation at `index`.
    pub fn get(&self, index: usize) -> Result<Reply, StateError> {
        self.0.get(index).copied().ok_or_else(|| {
            StateError::UnexpectedReply(format!(
                "transaction returned {} replies, wanted index {index}",
                self.0.len()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Builder for an ordered list of operations executed atomically.
///
/// ```
/// use turnstile_state::{StateKey, Transaction};
///
/// let key = StateKey::timeout("printer");
/// let tx = Transaction::new()
///     .remove_by_score(&key, 1_000)
///     .add(&key, "tok-1", 2_000)
///     .rank(&key, "tok-1");
/// assert_eq!(tx.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    ops: Vec<Op>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn remove_by_score(self, key: &StateKey, max: i64) -> Self {
        self.push(Op::RemoveByScore {
            key: key.clone(),
            max,
        })
    }

    #[must_use]
    pub fn add(self, key: &StateKey, member: &str, score: i64) -> Self {
        self.push(Op::Add {
            key: key.clone(),
            member: member.to_owned(),
            score,
        })
    }

    #[must_use]
    pub fn add_sequenced(self, key: &StateKey, member: &str, counter: &StateKey) -> Self {
        self.push(Op::AddSequenced {
            key: key.clone(),
            member: member.to_owned(),
            counter: counter.clone(),
        })
    }

    #[must_use]
    pub fn rank(self, key: &StateKey, member: &str) -> Self {
        self.push(Op::Rank {
            key: key.clone(),
            member: member.to_owned(),
        })
    }

    #[must_use]
    pub fn remove(self, key: &StateKey, member: &str) -> Self {
        self.push(Op::Remove {
            key: key.clone(),
            member: member.to_owned(),
        })
    }

    #[must_use]
    pub fn intersect_min(self, dest: &StateKey, sources: &[&StateKey]) -> Self {
        self.push(Op::IntersectMin {
            dest: dest.clone(),
            sources: sources.iter().map(|k| (*k).clone()).collect(),
        })
    }

    #[must_use]
    pub fn increment(self, key: &StateKey) -> Self {
        self.push(Op::Increment { key: key.clone() })
    }

    #[must_use]
    pub fn cardinality(self, key: &StateKey) -> Self {
        self.push(Op::Cardinality { key: key.clone() })
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn push(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_preserves_order() {
        let key = StateKey::timeout("r");
        let tx = Transaction::new()
            .remove_by_score(&key, 10)
            .add(&key, "a", 20)
            .rank(&key, "a");
        assert!(matches!(tx.ops()[0], Op::RemoveByScore { max: 10, .. }));
        assert!(matches!(tx.ops()[1], Op::Add { score: 20, .. }));
        assert!(matches!(tx.ops()[2], Op::Rank { .. }));
    }

    #[test]
    fn intersect_min_copies_sources() {
        let owner = StateKey::owner("r");
        let timeout = StateKey::timeout("r");
        let tx = Transaction::new().intersect_min(&owner, &[&timeout, &owner]);
        match &tx.ops()[0] {
            Op::IntersectMin { dest, sources } => {
                assert_eq!(dest, &owner);
                assert_eq!(sources, &vec![timeout, owner.clone()]);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn rank_reply_interpretation() {
        assert_eq!(Reply::Int(3).as_rank().unwrap(), Some(3));
        assert_eq!(Reply::Nil.as_rank().unwrap(), None);
        assert!(Reply::Int(-1).as_rank().is_err());
    }

    #[test]
    fn int_reply_rejects_nil() {
        assert_eq!(Reply::Int(7).as_int().unwrap(), 7);
        assert!(matches!(
            Reply::Nil.as_int(),
            Err(StateError::UnexpectedReply(_))
        ));
    }

    #[test]
    fn replies_index_out_of_range_is_an_error() {
        let replies = Replies::new(vec![Reply::Int(1)]);
        assert_eq!(replies.get(0).unwrap(), Reply::Int(1));
        assert!(replies.get(1).is_err());
    }
}

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, Pipeline, Script};

use turnstile_core::duration_millis;
use turnstile_state::error::StateError;
use turnstile_state::key::StateKey;
use turnstile_state::store::StateStore;
use turnstile_state::transaction::{Op, Replies, Reply, Transaction};

use crate::config::RedisConfig;
use crate::key_render::render_key;
use crate::scripts;

/// Redis-backed implementation of [`StateStore`].
///
/// Uses a `deadpool-redis` connection pool. Transactions are sent as atomic
/// pipelines (`MULTI`/`EXEC`); lock records use Lua scripts.
pub struct RedisStateStore {
    pool: Pool,
    prefix: String,
}

impl RedisStateStore {
    /// Create a new `RedisStateStore` from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, StateError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StateError::Connection(e.to_string()))?
            .map_err(|e| StateError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
        })
    }

    fn key(&self, key: &StateKey) -> String {
        render_key(&self.prefix, key)
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, StateError> {
        self.pool
            .get()
            .await
            .map_err(|e| StateError::Connection(e.to_string()))
    }

    /// Append the Redis command for `op` to `pipe`.
    fn queue(&self, pipe: &mut Pipeline, op: &Op) {
        match op {
            Op::RemoveByScore { key, max } => {
                pipe.cmd("ZREMRANGEBYSCORE")
                    .arg(self.key(key))
                    .arg("-inf")
                    .arg(*max);
            }
            Op::Add { key, member, score } => {
                pipe.cmd("ZADD").arg(self.key(key)).arg(*score).arg(member);
            }
            Op::AddSequenced {
                key,
                member,
                counter,
            } => {
                pipe.cmd("EVAL")
                    .arg(scripts::ADD_SEQUENCED)
                    .arg(2)
                    .arg(self.key(key))
                    .arg(self.key(counter))
                    .arg(member);
            }
            Op::Rank { key, member } => {
                pipe.cmd("ZRANK").arg(self.key(key)).arg(member);
            }
            Op::Remove { key, member } => {
                pipe.cmd("ZREM").arg(self.key(key)).arg(member);
            }
            Op::IntersectMin { dest, sources } => {
                pipe.cmd("ZINTERSTORE")
                    .arg(self.key(dest))
                    .arg(sources.len());
                for source in sources {
                    pipe.arg(self.key(source));
                }
                pipe.arg("AGGREGATE").arg("MIN");
            }
            Op::Increment { key } => {
                pipe.cmd("INCR").arg(self.key(key));
            }
            Op::Cardinality { key } => {
                pipe.cmd("ZCARD").arg(self.key(key));
            }
        }
    }
}

fn reply_from_value(value: redis::Value) -> Result<Reply, StateError> {
    match value {
        redis::Value::Int(n) => Ok(Reply::Int(n)),
        redis::Value::Nil => Ok(Reply::Nil),
        other => Err(StateError::UnexpectedReply(format!("{other:?}"))),
    }
}

/// Redis rejects a zero `PX`, so sub-millisecond leases round up.
fn ttl_millis(ttl: Duration) -> i64 {
    duration_millis(ttl).max(1)
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn exec(&self, tx: &Transaction) -> Result<Replies, StateError> {
        if tx.is_empty() {
            return Ok(Replies::default());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in tx.ops() {
            self.queue(&mut pipe, op);
        }

        let mut conn = self.conn().await?;
        let values: Vec<redis::Value> = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        if values.len() != tx.len() {
            return Err(StateError::UnexpectedReply(format!(
                "transaction of {} operations returned {} replies",
                tx.len(),
                values.len()
            )));
        }

        values
            .into_iter()
            .map(reply_from_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Replies::new)
    }

    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StateError> {
        let mut conn = self.conn().await?;
        let result: i64 = Script::new(scripts::CHECK_AND_SET)
            .key(self.key(key))
            .arg(value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(result == 1)
    }

    async fn compare_and_delete(
        &self,
        key: &StateKey,
        expected: &str,
    ) -> Result<bool, StateError> {
        let mut conn = self.conn().await?;
        let result: i64 = Script::new(scripts::COMPARE_AND_DELETE)
            .key(self.key(key))
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(result == 1)
    }

    async fn compare_and_expire(
        &self,
        key: &StateKey,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StateError> {
        let mut conn = self.conn().await?;
        let result: i64 = Script::new(scripts::COMPARE_AND_EXPIRE)
            .key(self.key(key))
            .arg(expected)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(result == 1)
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        let mut conn = self.conn().await?;
        conn.get(self.key(key))
            .await
            .map_err(|e| StateError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RedisStateStore {
        // Pool creation is lazy; no server is contacted here.
        RedisStateStore::new(&RedisConfig::default().with_prefix("t"))
            .expect("pool creation should succeed")
    }

    #[test]
    fn queues_one_command_per_operation() {
        let store = store();
        let owner = StateKey::owner("r");
        let timeout = StateKey::timeout("r");
        let tx = Transaction::new()
            .remove_by_score(&timeout, 10)
            .intersect_min(&owner, &[&timeout, &owner])
            .add_sequenced(&owner, "tok", &StateKey::counter("r"))
            .rank(&owner, "tok");

        let mut pipe = redis::pipe();
        for op in tx.ops() {
            store.queue(&mut pipe, op);
        }
        assert_eq!(pipe.cmd_iter().count(), tx.len());
    }

    #[test]
    fn intersect_is_rendered_with_min_aggregate() {
        let store = store();
        let owner = StateKey::owner("r");
        let timeout = StateKey::timeout("r");
        let mut pipe = redis::pipe();
        store.queue(
            &mut pipe,
            &Op::IntersectMin {
                dest: owner.clone(),
                sources: vec![timeout, owner],
            },
        );
        let packed = String::from_utf8_lossy(&pipe.get_packed_pipeline()).into_owned();
        assert!(packed.contains("ZINTERSTORE"));
        assert!(packed.contains("t:owner:{r}"));
        assert!(packed.contains("t:timeout:{r}"));
        assert!(packed.contains("AGGREGATE"));
        assert!(packed.contains("MIN"));
    }

    #[test]
    fn reply_conversion() {
        assert_eq!(reply_from_value(redis::Value::Int(4)).unwrap(), Reply::Int(4));
        assert_eq!(reply_from_value(redis::Value::Nil).unwrap(), Reply::Nil);
        assert!(matches!(
            reply_from_value(redis::Value::Okay),
            Err(StateError::UnexpectedReply(_))
        ));
    }

    #[test]
    fn ttl_never_rounds_to_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_micros(1_500)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2_000);
    }
}

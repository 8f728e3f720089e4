//! Redis state backend for Turnstile.
//!
//! This crate provides a Redis-backed implementation of the [`StateStore`]
//! trait from `turnstile-state`.
//!
//! # Features
//!
//! - **Transactions**: each [`Transaction`] runs as one `MULTI`/`EXEC` block,
//!   mapping its operations onto `ZREMRANGEBYSCORE`, `ZADD`, `ZRANK`, `ZREM`,
//!   `ZINTERSTORE ... AGGREGATE MIN`, `INCR` and `ZCARD`.
//! - **Lock records**: set-if-absent with a lease and compare-and-delete /
//!   compare-and-expire, each as a Lua script so the check and the write are
//!   atomic.
//! - **Connection pooling**: uses `deadpool-redis`.
//!
//! # Consistency
//!
//! | Deployment | Mutual Exclusion | Notes |
//! |------------|------------------|-------|
//! | Single instance | Strong | Full mutual exclusion guaranteed |
//! | Sentinel | Weak | Records may be lost during failover |
//! | Cluster | Weak | Records may be lost during failover |
//!
//! Redis replication is asynchronous: a record written just before a master
//! fails may be missing on the promoted replica, letting a second client
//! acquire the same lock or semaphore slot.
//!
//! # Example
//!
//! ```ignore
//! use turnstile_state_redis::{RedisConfig, RedisStateStore};
//!
//! let config = RedisConfig::new("redis://localhost:6379");
//! let store = RedisStateStore::new(&config)?;
//! ```
//!
//! [`StateStore`]: turnstile_state::StateStore
//! [`Transaction`]: turnstile_state::Transaction

mod config;
mod key_render;
mod scripts;
mod store;

pub use config::RedisConfig;
pub use store::RedisStateStore;

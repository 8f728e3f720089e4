//! In-memory state backend for Turnstile.
//!
//! [`MemoryStateStore`] implements the full [`StateStore`] contract inside a
//! single process. It exists for tests and single-node deployments: time is
//! read from an injectable [`Clock`](turnstile_core::Clock) so lease expiry
//! can be driven deterministically, and the store can be switched into an
//! unavailable mode to exercise error paths.
//!
//! [`StateStore`]: turnstile_state::StateStore

mod sorted_set;
mod store;

pub use store::MemoryStateStore;

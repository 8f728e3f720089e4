pub mod error;
pub mod key;
pub mod store;
pub mod testing;
pub mod transaction;

pub use error::StateError;
pub use key::{KeyKind, StateKey};
pub use store::StateStore;
pub use transaction::{Op, Replies, Reply, Transaction};

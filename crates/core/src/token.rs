use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::types::Token;

/// Generator of acquisition tokens.
pub trait TokenSource: Send + Sync + fmt::Debug {
    /// Produce a token that has never been handed out before.
    fn next_token(&self) -> Token;
}

/// Random 128-bit tokens (UUID v4). The default for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidTokenSource;

impl TokenSource for UuidTokenSource {
    fn next_token(&self) -> Token {
        Token::new(Uuid::new_v4().to_string())
    }
}

/// Deterministic tokens `prefix-000000000001`, `prefix-000000000002`, ...
///
/// The counter is zero-padded so lexicographic order equals issuance order,
/// which keeps tie-breaks between equal scores predictable in tests.
#[derive(Debug)]
pub struct SequentialTokenSource {
    prefix: String,
    next: AtomicU64,
}

impl SequentialTokenSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl TokenSource for SequentialTokenSource {
    fn next_token(&self) -> Token {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Token::new(format!("{}-{n:012}", self.prefix))
    }
}

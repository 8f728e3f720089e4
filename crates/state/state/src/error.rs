use thiserror::Error;

/// Errors from talking to the atomic store.
///
/// Every variant means the store could not be reached or answered in a way
/// the caller cannot interpret. Normal outcomes such as a held lock or a full
/// semaphore are never errors.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

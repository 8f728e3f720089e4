use thiserror::Error;

/// Errors raised while configuring or wiring locks and semaphores.
///
/// Runtime operations report store failures as
/// [`StateError`](turnstile_state::StateError) directly.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// A configuration value is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The configuration file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for [`TurnstileConfig`](crate::TurnstileConfig).
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// The state backend could not be created.
    #[error("state error: {0}")]
    State(#[from] turnstile_state::StateError),
}

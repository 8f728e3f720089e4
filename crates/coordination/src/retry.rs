//! Bounded retry policy for lock acquisition.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use turnstile_state::StateError;

/// Default pause between attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long, and how often, to keep retrying an acquisition.
///
/// A budget is always bounded: it is built from an attempt count, a timeout,
/// or both, and may additionally carry a [`CancellationToken`] that stops the
/// loop early. Pauses go through `tokio::time`, so tests running with a paused
/// clock finish instantly.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    max_attempts: Option<u32>,
    timeout: Option<Duration>,
    poll_interval: Duration,
    cancel: Option<CancellationToken>,
}

impl RetryBudget {
    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self::attempts(1)
    }

    /// At most `max_attempts` attempts (at least one is always made).
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: None,
        }
    }

    /// Keep trying until `timeout` has elapsed.
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            max_attempts: None,
            timeout: Some(timeout),
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Stop retrying as soon as `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Run `attempt` until it yields a value or the budget runs out.
    ///
    /// Returns `Ok(None)` on exhaustion or cancellation. Errors from an
    /// attempt are returned immediately and never retried.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<Option<T>, StateError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>, StateError>> + Send,
        T: Send,
    {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut attempts: u32 = 0;

        loop {
            if self.is_cancelled() {
                return Ok(None);
            }

            attempts = attempts.saturating_add(1);
            if let Some(value) = attempt().await? {
                return Ok(Some(value));
            }

            if self.max_attempts.is_some_and(|max| attempts >= max) {
                return Ok(None);
            }

            let mut pause = self.poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                pause = pause.min(deadline - now);
            }

            match &self.cancel {
                Some(cancel) => {
                    tokio::select! {
                        () = cancel.cancelled() => return Ok(None),
                        () = tokio::time::sleep(pause) => {}
                    }
                }
                None => tokio::time::sleep(pause).await,
            }
        }
    }
}

//! Status-driven retry policies.
//!
//! A [`RetryPolicy`] maps each failure of a remote call to a [`RetryAction`]
//! through a per-status table, and bounds retries with an optional delay
//! ceiling and an optional attempt ceiling. The generic backoff used around
//! every remote call and the upload loop are two instances of the same
//! policy type with different tables.

use std::future::Future;
use std::time::Duration;

use common::error::ApiError;
use http::StatusCode;

pub const INITIAL_DELAY: Duration = Duration::from_millis(1000);
pub const MAX_DELAY: Duration = Duration::from_millis(16000);
pub const MAX_UPLOAD_ATTEMPTS: u32 = 5;

/// What to do about one kind of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Give up and surface the error
    Fail,
    /// Sleep for the server's `Retry-After`, then reset the exponential delay
    WaitRetryAfter,
    /// Sleep for the current delay, then double it
    Exponential,
    /// Retry at once with a fresh credential
    Reacquire,
}

/// Outcome of feeding one failure into a [`RetryState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Retry { wait: Duration, reacquire: bool },
    Fail,
    /// The attempt ceiling was reached on a retryable failure
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    name: &'static str,
    rules: Vec<(StatusCode, RetryAction)>,
    on_connection: RetryAction,
    initial_delay: Duration,
    max_delay: Option<Duration>,
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// An empty policy: every failure is fatal.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rules: Vec::new(),
            on_connection: RetryAction::Fail,
            initial_delay: INITIAL_DELAY,
            max_delay: None,
            max_attempts: None,
        }
    }

    /// Backoff applied around remote calls.
    ///
    /// 429 waits out `Retry-After` with no limit; 503 backs off from 1s,
    /// doubling, until the delay would exceed 16s; everything else fails.
    pub fn backoff() -> Self {
        Self::new("backoff")
            .with_rule(StatusCode::TOO_MANY_REQUESTS, RetryAction::WaitRetryAfter)
            .with_rule(StatusCode::SERVICE_UNAVAILABLE, RetryAction::Exponential)
            .with_max_delay(MAX_DELAY)
    }

    /// Policy for a single upload, bounded at five attempts.
    ///
    /// Connection failures and 401 swap the upload credential; 408 and 429
    /// keep it and back off from 1s, doubling.
    pub fn upload() -> Self {
        Self::new("upload")
            .on_connection(RetryAction::Reacquire)
            .with_rule(StatusCode::UNAUTHORIZED, RetryAction::Reacquire)
            .with_rule(StatusCode::REQUEST_TIMEOUT, RetryAction::Exponential)
            .with_rule(StatusCode::TOO_MANY_REQUESTS, RetryAction::Exponential)
            .with_max_attempts(MAX_UPLOAD_ATTEMPTS)
    }

    pub fn with_rule(mut self, status: StatusCode, action: RetryAction) -> Self {
        self.rules.retain(|(existing, _)| *existing != status);
        self.rules.push((status, action));
        self
    }

    pub fn on_connection(mut self, action: RetryAction) -> Self {
        self.on_connection = action;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// An undecodable response is always fatal: the request may already
    /// have taken effect.
    pub fn action_for(&self, error: &ApiError) -> RetryAction {
        match error {
            ApiError::Connection(_) => self.on_connection,
            ApiError::Decode(_) | ApiError::UrlParse(_) => RetryAction::Fail,
            ApiError::Status { status, .. } => self
                .rules
                .iter()
                .find(|(rule, _)| rule == status)
                .map(|(_, action)| *action)
                .unwrap_or(RetryAction::Fail),
        }
    }

    /// Fresh per-operation state.
    pub fn start(&self) -> RetryState<'_> {
        RetryState {
            policy: self,
            delay: self.initial_delay,
            attempts: 0,
        }
    }

    /// Run `operation` until it succeeds or the policy gives up.
    ///
    /// Returns the last error when giving up. Credentials are not managed
    /// here, so `Reacquire` simply retries.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut state = self.start();
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match state.on_error(&error) {
                Verdict::Retry { wait, .. } => {
                    tracing::debug!(
                        policy = self.name,
                        status = ?error.status_code(),
                        attempt = state.attempts(),
                        wait_ms = wait.as_millis() as u64,
                        "remote call failed, retrying: {}",
                        error
                    );
                    tokio::time::sleep(wait).await;
                }
                Verdict::Fail | Verdict::Exhausted => return Err(error),
            }
        }
    }
}

/// Per-operation progress through a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryState<'a> {
    policy: &'a RetryPolicy,
    delay: Duration,
    attempts: u32,
}

impl RetryState<'_> {
    /// Failed attempts seen so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The delay the next exponential wait would use.
    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    pub fn on_error(&mut self, error: &ApiError) -> Verdict {
        self.attempts += 1;

        let action = self.policy.action_for(error);
        if action == RetryAction::Fail {
            return Verdict::Fail;
        }
        if let Some(max) = self.policy.max_attempts {
            if self.attempts >= max {
                return Verdict::Exhausted;
            }
        }

        match action {
            RetryAction::Fail => Verdict::Fail,
            RetryAction::Reacquire => Verdict::Retry {
                wait: Duration::ZERO,
                reacquire: true,
            },
            RetryAction::WaitRetryAfter => {
                // Without the header, fall back to the current delay
                let wait = error.retry_after().unwrap_or(self.delay);
                self.delay = self.policy.initial_delay;
                Verdict::Retry {
                    wait,
                    reacquire: false,
                }
            }
            RetryAction::Exponential => {
                if let Some(max) = self.policy.max_delay {
                    if self.delay > max {
                        return Verdict::Fail;
                    }
                }
                let wait = self.delay;
                self.delay = self.delay.saturating_mul(2);
                Verdict::Retry {
                    wait,
                    reacquire: false,
                }
            }
        }
    }
}

/// Run `operation` under [`RetryPolicy::backoff`].
pub async fn execute_with_backoff<T, F, Fut>(operation: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    RetryPolicy::backoff().execute(operation).await
}

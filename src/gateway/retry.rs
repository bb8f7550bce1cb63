//! Bounded retry with exponential backoff.
//!
//! ## Retry Strategy
//!
//! Transport errors, timeouts, 5xx and 429 are transient under load. Each
//! failed attempt moves the machine through three states:
//!
//! ```text
//!   Attempting(n) ──retryable, n < max──▶ BackingOff(n, delay) ──sleep──▶ Attempting(n+1)
//!        │
//!        ├──retryable, n == max──▶ Exhausted(n)
//!        └──permanent──▶ error returned as-is
//! ```
//!
//! The delay is `base * 2^(n-1)` capped at `max_delay`; with the defaults
//! (500 ms base, 4 attempts) the waits are 500 ms → 1 s → 2 s. A 429 with
//! `Retry-After` waits at least that long.

use crate::error::RemoteError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to try a call and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_millis(500), Duration::from_millis(8000))
    }
}

/// Where a call stands after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryState {
    /// About to send attempt `n` (1-based).
    Attempting(u32),
    /// Attempt `n` failed with a retryable error; wait before the next one.
    BackingOff(u32, Duration),
    /// All `n` attempts failed with retryable errors.
    Exhausted(u32),
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; it is raised to at least 1.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before attempt `failed_attempt + 1`.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Transition taken when attempt `attempt` fails with a retryable error.
    pub fn next_state(&self, attempt: u32, error: &RemoteError) -> RetryState {
        if attempt >= self.max_attempts {
            return RetryState::Exhausted(attempt);
        }
        let mut delay = self.delay_after(attempt);
        if let Some(server_delay) = error.retry_after() {
            delay = delay.max(server_delay);
        }
        RetryState::BackingOff(attempt, delay)
    }

    /// Run `call` under this policy.
    ///
    /// `call` receives the 1-based attempt number. Permanent errors return
    /// immediately; exhausted retries become [`RemoteError::Exhausted`].
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, RemoteError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut state = RetryState::Attempting(1);
        loop {
            match state {
                RetryState::Attempting(attempt) => match call(attempt).await {
                    Ok(value) => {
                        if attempt > 1 {
                            debug!("{}: succeeded on attempt {}", operation, attempt);
                        }
                        return Ok(value);
                    }
                    Err(e) if !e.is_retryable() => return Err(e),
                    Err(e) => {
                        state = self.next_state(attempt, &e);
                        match state {
                            RetryState::BackingOff(_, delay) => warn!(
                                "{}: attempt {}/{} failed ({}); retrying in {}ms",
                                operation,
                                attempt,
                                self.max_attempts,
                                e,
                                delay.as_millis()
                            ),
                            RetryState::Exhausted(attempts) => {
                                return Err(RemoteError::Exhausted {
                                    operation: operation.to_string(),
                                    attempts,
                                    last: e.to_string(),
                                })
                            }
                            RetryState::Attempting(_) => {}
                        }
                    }
                },
                RetryState::BackingOff(attempt, delay) => {
                    tokio::time::sleep(delay).await;
                    state = RetryState::Attempting(attempt + 1);
                }
                RetryState::Exhausted(attempts) => {
                    return Err(RemoteError::Exhausted {
                        operation: operation.to_string(),
                        attempts,
                        last: String::new(),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(4))
    }

    fn server_error() -> RemoteError {
        RemoteError::Server {
            operation: "op".into(),
            status: 503,
            detail: "busy".into(),
        }
    }

    #[test]
    fn delays_double_and_cap() {
        let p = RetryPolicy::new(10, Duration::from_millis(500), Duration::from_millis(3000));
        assert_eq!(p.delay_after(1), Duration::from_millis(500));
        assert_eq!(p.delay_after(2), Duration::from_millis(1000));
        assert_eq!(p.delay_after(3), Duration::from_millis(2000));
        assert_eq!(p.delay_after(4), Duration::from_millis(3000));
        assert_eq!(p.delay_after(60), Duration::from_millis(3000));
    }

    #[test]
    fn retry_after_extends_backoff() {
        let p = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_millis(200));
        let e = RemoteError::RateLimited {
            operation: "op".into(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(
            p.next_state(1, &e),
            RetryState::BackingOff(1, Duration::from_secs(2))
        );
        assert_eq!(p.next_state(3, &e), RetryState::Exhausted(3));
    }

    #[tokio::test]
    async fn succeeds_on_final_attempt_with_exact_count() {
        let calls = AtomicU32::new(0);
        let result = fast(4)
            .run("op", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 4 {
                        Err(server_error())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast(3)
            .run("upload", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(server_error()) }
            })
            .await;
        match result.unwrap_err() {
            RemoteError::Exhausted {
                operation,
                attempts,
                last,
            } => {
                assert_eq!(operation, "upload");
                assert_eq!(attempts, 3);
                assert!(last.contains("503"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast(5)
            .run("grade", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(RemoteError::Client {
                        operation: "grade".into(),
                        status: 404,
                        detail: "not found".into(),
                    })
                }
            })
            .await;
        assert_eq!(result.unwrap_err().status(), Some(404));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

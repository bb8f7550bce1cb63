//! Process-wide spacing of outbound calls.
//!
//! One limiter is created per process and shared (behind an `Arc`) by every
//! worker that talks to the gateway. Tests pass [`NoopLimiter`].

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Gate every outbound call goes through.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until the next call may be sent.
    async fn acquire(&self);

    /// Push the next free slot at least `delay` into the future
    /// (e.g. after a `Retry-After` response).
    fn penalize(&self, delay: Duration);
}

/// Enforces a minimum interval between consecutive calls.
///
/// Slots are handed out in order: a caller reserves the next slot under a
/// short lock and sleeps outside it, so concurrent callers queue up at
/// `interval` spacing instead of waking together.
#[derive(Debug)]
pub struct IntervalLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl IntervalLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn reserve(&self) -> Duration {
        let mut next = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let slot = (*next).max(now);
        *next = slot + self.interval;
        slot - now
    }
}

#[async_trait]
impl RateLimiter for IntervalLimiter {
    async fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    fn penalize(&self, delay: Duration) {
        let mut next = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
        let until = Instant::now() + delay;
        if until > *next {
            debug!("Rate limiter paused for {}ms", delay.as_millis());
            *next = until;
        }
    }
}

/// Never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLimiter;

#[async_trait]
impl RateLimiter for NoopLimiter {
    async fn acquire(&self) {}

    fn penalize(&self, _delay: Duration) {}
}

//! Per-endpoint token-bucket admission control.
//!
//! The `RateLimiter` is the only mutable state shared across sessions.
//! Buckets are created lazily per endpoint key and live for the process
//! lifetime; each admission check (token deduction + refill) is atomic
//! under the bucket's own mutex. There is no queuing here — callers own
//! the decision to wait for the hint or fail fast.

use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::{BucketConfig, RateLimitConfig};

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Granted,
    /// Denied; minimum time until one token will be available.
    Wait(Duration),
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted)
    }
}

/// Refill-on-read token bucket. Tokens never exceed capacity and never go
/// negative.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(config: BucketConfig, now: Instant) -> Self {
        // A zero or negative refill rate would make wait hints meaningless.
        let refill_per_sec = config.refill_per_sec.max(f64::MIN_POSITIVE);
        let capacity = config.capacity.max(1.0);
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens =
            (self.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Attempt to remove one token. On deficit, the wait hint is
    /// `deficit / refill_rate`.
    pub fn try_admit(&mut self, now: Instant) -> Admission {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Admission::Granted
        } else {
            let deficit = 1.0 - self.tokens;
            Admission::Wait(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }

    #[cfg(test)]
    fn tokens(&self) -> f64 {
        self.tokens
    }
}

/// Process-wide admission control, keyed by tool endpoint.
pub struct RateLimiter {
    buckets: DashMap<String, Mutex<TokenBucket>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    /// Check admission for one call on `endpoint`, creating the bucket from
    /// its configured class on first use.
    pub fn admit(&self, endpoint: &str) -> Admission {
        let now = Instant::now();
        let bucket = self
            .buckets
            .entry(endpoint.to_string())
            .or_insert_with(|| Mutex::new(TokenBucket::new(self.config.bucket_for(endpoint), now)));
        let admission = bucket.lock().try_admit(now);
        if let Admission::Wait(hint) = admission {
            tracing::debug!(endpoint, wait_ms = hint.as_millis() as u64, "rate limit deficit");
        }
        admission
    }
}

//! Configuration surface for the orchestration core.
//!
//! Loading these from disk/env is an external collaborator's job; the core
//! consumes plain values. Everything derives `Deserialize` with defaults so
//! a loader can feed partial TOML/JSON.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration consumed by [`crate::Orchestrator`] and
/// [`crate::InvocationAdapter`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Hard bound on observe/decide/act cycles per session.
    pub max_iterations: usize,
    /// Ceiling on a single reasoning call, in seconds.
    pub reasoning_timeout_secs: u64,
    /// Tool payloads longer than this are truncated with a marker.
    pub max_tool_output_chars: usize,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub rate_limit_wait: RateLimitWaitMode,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            reasoning_timeout_secs: 120,
            max_tool_output_chars: 30_000,
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            rate_limit_wait: RateLimitWaitMode::default(),
        }
    }
}

impl CoreConfig {
    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_secs(self.reasoning_timeout_secs)
    }
}

/// Per-endpoint token bucket parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BucketConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

/// Process-wide rate-limit configuration: a default bucket class plus
/// per-endpoint overrides keyed by endpoint name.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub default_capacity: f64,
    pub default_refill_per_sec: f64,
    pub overrides: HashMap<String, BucketConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_capacity: 5.0,
            default_refill_per_sec: 1.0,
            overrides: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Resolve the bucket parameters for an endpoint key.
    pub fn bucket_for(&self, endpoint: &str) -> BucketConfig {
        self.overrides
            .get(endpoint)
            .copied()
            .unwrap_or(BucketConfig {
                capacity: self.default_capacity,
                refill_per_sec: self.default_refill_per_sec,
            })
    }
}

/// Retry executor policy. Rate-limit waits are bounded separately from the
/// retry budget and never count against `max_attempts`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_rate_limit_wait_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_rate_limit_wait_ms: 60_000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn max_rate_limit_wait(&self) -> Duration {
        Duration::from_millis(self.max_rate_limit_wait_ms)
    }
}

/// What the invocation adapter does when admission is denied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitWaitMode {
    /// Return `rate_limited` to the caller immediately.
    FailFast,
    /// Sleep for the bucket's wait hint, bounded by
    /// `retry.max_rate_limit_wait`, then give up with
    /// `rate_limit_timeout`.
    #[default]
    Wait,
}

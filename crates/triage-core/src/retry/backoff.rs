//! Classification-aware retry executor.
//!
//! Policy:
//! - `Fatal` → propagate immediately, no retry.
//! - `RateLimited` → sleep the admission wait hint; these waits never
//!   consume a retry-budget slot but their sum is bounded by
//!   `max_rate_limit_wait`, after which `RateLimitTimeout` is surfaced.
//! - `Retryable` → exponential backoff `base * 2^(attempt-1)` capped at
//!   `max_delay`, ±20% jitter. Only idempotent operations are re-invoked;
//!   a non-idempotent operation gets exactly one physical attempt so a
//!   transient network error can never trigger a duplicate remediation
//!   action (e.g. a double rollback).

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::CoreError;

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
    RateLimited,
}

/// Default classifier for tool errors.
///
/// Admission denials map to `RateLimited`. Tool-internal errors are
/// retryable only when the cause reads as transient (timeouts, dropped
/// connections, upstream unavailability, rate-limit text from providers
/// that surface it as an opaque message). Everything else is fatal.
pub fn default_error_class(err: &CoreError) -> ErrorClass {
    match err {
        CoreError::RateLimited { .. } => ErrorClass::RateLimited,
        CoreError::ToolInternalError { source } => {
            let message = format!("{source:#}").to_ascii_lowercase();
            let transient = ["timed out", "timeout", "unavailable", "connection", "rate limit"]
                .iter()
                .any(|needle| message.contains(needle));
            if transient {
                ErrorClass::Retryable
            } else {
                ErrorClass::Fatal
            }
        }
        _ => ErrorClass::Fatal,
    }
}

/// Run `op` under the retry policy. `op` receives the 1-based attempt
/// number; it is expected to re-check rate-limit admission itself on every
/// call, which is what makes the `RateLimited` branch converge.
pub async fn with_retry<T, F, Fut, C>(
    config: &RetryConfig,
    idempotent: bool,
    classify: C,
    mut op: F,
) -> Result<T, CoreError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
    C: Fn(&CoreError) -> ErrorClass,
{
    let mut attempts: u32 = 0;
    let mut rate_limit_waited = Duration::ZERO;
    let max_wait = config.max_rate_limit_wait();

    loop {
        let err = match op(attempts + 1).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match classify(&err) {
            ErrorClass::Fatal => return Err(err),

            ErrorClass::RateLimited => {
                let (endpoint, hint) = match &err {
                    CoreError::RateLimited {
                        endpoint,
                        retry_after,
                    } => (endpoint.clone(), *retry_after),
                    _ => (String::new(), config.base_delay()),
                };

                if rate_limit_waited >= max_wait {
                    return Err(CoreError::RateLimitTimeout { endpoint });
                }
                let wait = hint.min(max_wait - rate_limit_waited);
                rate_limit_waited += wait;
                tracing::debug!(
                    endpoint = %endpoint,
                    wait_ms = wait.as_millis() as u64,
                    "rate limited, suspending before re-admission"
                );
                tokio::time::sleep(wait).await;
            }

            ErrorClass::Retryable => {
                attempts += 1;
                if !idempotent || attempts >= config.max_attempts {
                    return Err(CoreError::RetriesExhausted {
                        attempts,
                        last: Box::new(err),
                    });
                }
                let delay = backoff_delay(config, attempts);
                tracing::warn!(
                    attempt = attempts,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// `base * 2^(attempt-1)` capped at `max_delay`, with ±20% jitter.
fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config.base_delay().as_secs_f64() * 2f64.powi(attempt.saturating_sub(1) as i32);
    let capped = exp.min(config.max_delay().as_secs_f64());
    let jitter = rand::thread_rng().gen_range(0.8..=1.2);
    Duration::from_secs_f64(capped * jitter)
}

//! Retry and backoff logic for tool invocations.
//!
//! Provides exponential backoff with jitter for transient failures, with
//! rate-limit waits accounted separately from the retry budget.

mod backoff;

pub use backoff::{default_error_class, with_retry, ErrorClass};

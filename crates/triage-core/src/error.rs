//! Error taxonomy for the orchestration core.
//!
//! Per-call errors (unknown tool, invalid arguments, retries exhausted,
//! tool internals) are not fatal to a session — the orchestrator converts
//! them into tool-result turns so the reasoning engine can adapt. Only
//! loop-level conditions terminate the session directly.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors the core can produce.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {}", fields.join("; "))]
    InvalidArguments { fields: Vec<String> },

    /// Admission denied on a rate-limit bucket. `retry_after` is the wait
    /// hint computed from the bucket's deficit and refill rate.
    #[error("rate limited on '{endpoint}' (retry after {retry_after:?})")]
    RateLimited {
        endpoint: String,
        retry_after: Duration,
    },

    #[error("gave up waiting for rate limit on '{endpoint}'")]
    RateLimitTimeout { endpoint: String },

    #[error("retries exhausted after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<CoreError>,
    },

    /// Catch-all for anything unexpected escaping a tool, including panics.
    /// The original cause is retained for diagnostics.
    #[error("tool internal error: {source}")]
    ToolInternalError {
        #[source]
        source: anyhow::Error,
    },

    #[error("duplicate call id in reply: {0}")]
    DuplicateCallId(String),

    #[error("reasoning call timed out")]
    ReasoningTimeout,

    #[error("iteration limit exceeded ({0})")]
    IterationLimitExceeded(usize),

    #[error("session cancelled")]
    Cancelled,
}

impl CoreError {
    /// Stable machine-readable code, used in error descriptors and failure
    /// signatures.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::UnknownTool(_) => "unknown_tool",
            CoreError::InvalidArguments { .. } => "invalid_arguments",
            CoreError::RateLimited { .. } => "rate_limited",
            CoreError::RateLimitTimeout { .. } => "rate_limit_timeout",
            CoreError::RetriesExhausted { .. } => "retries_exhausted",
            CoreError::ToolInternalError { .. } => "tool_internal_error",
            CoreError::DuplicateCallId(_) => "duplicate_call_id",
            CoreError::ReasoningTimeout => "reasoning_timeout",
            CoreError::IterationLimitExceeded(_) => "iteration_limit_exceeded",
            CoreError::Cancelled => "cancelled",
        }
    }

    /// Whether this error terminates the whole session rather than becoming
    /// a tool-result turn.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::ReasoningTimeout
                | CoreError::IterationLimitExceeded(_)
                | CoreError::Cancelled
        )
    }

    pub fn internal(source: impl Into<anyhow::Error>) -> Self {
        CoreError::ToolInternalError {
            source: source.into(),
        }
    }
}

/// Serializable `{code, message}` envelope carried in tool-result turns so
/// the reasoning engine (and the audit trail) see structured failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub code: String,
    pub message: String,
}

impl From<&CoreError> for ErrorDescriptor {
    fn from(err: &CoreError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

//! Tool invocation adapter.
//!
//! Normalizes every requested call into a `ToolResult`: registry lookup,
//! schema validation, rate-limit admission, retry-wrapped execution gated
//! on the tool's idempotency flag. Nothing escapes — unexpected errors and
//! panics are captured as `tool_internal_error` with the cause retained.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::config::{CoreConfig, RateLimitWaitMode, RetryConfig};
use crate::error::{CoreError, ErrorDescriptor};
use crate::ratelimit::{Admission, RateLimiter};
use crate::reasoning::ToolCallRequest;
use crate::retry::{default_error_class, with_retry, ErrorClass};
use crate::tools::registry::ToolRegistry;

/// Outcome of one tool call: payload on success, structured descriptor on
/// failure.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { payload: Value },
    Error { error: ErrorDescriptor },
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error { .. })
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            ToolOutcome::Error { error } => Some(&error.code),
            ToolOutcome::Success { .. } => None,
        }
    }
}

/// Exactly one `ToolResult` is produced per `ToolCallRequest`; the call id
/// ties them together.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub call_id: String,
    pub outcome: ToolOutcome,
    pub duration_ms: u64,
}

/// Routes requested calls through registry → rate limiter → retry executor.
pub struct InvocationAdapter {
    registry: Arc<ToolRegistry>,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
    wait_mode: RateLimitWaitMode,
    max_output_chars: usize,
}

impl InvocationAdapter {
    pub fn new(registry: Arc<ToolRegistry>, limiter: Arc<RateLimiter>, config: &CoreConfig) -> Self {
        Self {
            registry,
            limiter,
            retry: config.retry.clone(),
            wait_mode: config.rate_limit_wait,
            max_output_chars: config.max_tool_output_chars,
        }
    }

    /// Rate-limit key for a requested tool, falling back to the tool name
    /// when the tool is unknown. Used by the orchestrator to group an
    /// Acting batch into independent endpoints.
    pub fn endpoint_key(&self, tool_name: &str) -> String {
        self.registry
            .lookup(tool_name)
            .map(|t| t.endpoint_key())
            .unwrap_or_else(|| tool_name.to_string())
    }

    /// Invoke one requested call. Always returns a `ToolResult`.
    pub async fn invoke(&self, request: &ToolCallRequest) -> ToolResult {
        let started = Instant::now();
        let outcome = match self.invoke_inner(request).await {
            Ok(payload) => ToolOutcome::Success {
                payload: truncate_payload(payload, self.max_output_chars),
            },
            Err(err) => {
                tracing::warn!(
                    tool = %request.tool_name,
                    call_id = %request.call_id,
                    code = err.code(),
                    error = %err,
                    "tool call failed"
                );
                ToolOutcome::Error {
                    error: ErrorDescriptor::from(&err),
                }
            }
        };

        ToolResult {
            call_id: request.call_id.clone(),
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn invoke_inner(&self, request: &ToolCallRequest) -> Result<Value, CoreError> {
        let tool = self
            .registry
            .lookup(&request.tool_name)
            .ok_or_else(|| CoreError::UnknownTool(request.tool_name.clone()))?;

        tool.schema()
            .validate(&request.arguments)
            .map_err(|fields| CoreError::InvalidArguments { fields })?;

        let endpoint = tool.endpoint_key();
        let idempotent = tool.idempotent();
        tracing::debug!(
            tool = %request.tool_name,
            call_id = %request.call_id,
            endpoint = %endpoint,
            idempotent,
            "dispatching tool call"
        );

        let wait_mode = self.wait_mode;
        let classify = move |err: &CoreError| {
            let class = default_error_class(err);
            // Fail-fast: the first admission denial returns to the caller
            // instead of suspending.
            if class == ErrorClass::RateLimited && wait_mode == RateLimitWaitMode::FailFast {
                ErrorClass::Fatal
            } else {
                class
            }
        };

        let limiter = Arc::clone(&self.limiter);
        let tool_name = request.tool_name.clone();
        let arguments = request.arguments.clone();
        let endpoint_key = endpoint.clone();

        with_retry(&self.retry, idempotent, classify, move |attempt| {
            let tool = Arc::clone(&tool);
            let limiter = Arc::clone(&limiter);
            let endpoint = endpoint_key.clone();
            let tool_name = tool_name.clone();
            let arguments = arguments.clone();
            async move {
                // Admission is re-checked on every attempt, including
                // retries after a rate-limit wait.
                if let Admission::Wait(hint) = limiter.admit(&endpoint) {
                    return Err(CoreError::RateLimited {
                        endpoint,
                        retry_after: hint,
                    });
                }

                tracing::debug!(tool = %tool_name, attempt, "invoking tool");
                match AssertUnwindSafe(tool.invoke(arguments)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(CoreError::internal(anyhow::anyhow!(
                        "tool '{}' panicked: {}",
                        tool_name,
                        panic_message(&panic)
                    ))),
                }
            }
        })
        .await
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Cap oversized payloads before they enter the conversation. String
/// payloads are cut at a char boundary with an explicit marker; other
/// payloads are stringified first if their serialized form is oversized.
fn truncate_payload(payload: Value, max_chars: usize) -> Value {
    match payload {
        Value::String(s) if s.len() > max_chars => Value::String(truncate_text(&s, max_chars)),
        other => {
            let serialized = other.to_string();
            if serialized.len() > max_chars {
                Value::String(truncate_text(&serialized, max_chars))
            } else {
                other
            }
        }
    }
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    let truncated_len = floor_char_boundary(text, max_chars);
    let truncated = &text[..truncated_len];
    let break_point = truncated.rfind('\n').unwrap_or(truncated_len);
    let clean = &text[..break_point];
    format!(
        "{}\n\n[... OUTPUT TRUNCATED: {} chars -> {} chars ...]",
        clean,
        text.len(),
        clean.len()
    )
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut boundary = index.min(text.len());
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    boundary
}

//! Orchestration core for Triage — an LLM-directed incident-response agent.
//!
//! This crate contains only the control plane: conversation state, the tool
//! registry and dispatch contract, rate limiting, the retry executor, and the
//! observe/decide/act loop with its termination rules. Concrete tools
//! (metrics, logs, cluster, CI/CD, source control) and the language-model
//! client are external collaborators wired in through the [`tools::Tool`] and
//! [`reasoning::ReasoningEngine`] traits.
//!
//! ```text
//!  incident ──► Orchestrator ──► ReasoningEngine (external)
//!                  │  ▲                │
//!                  ▼  │          tool-call requests
//!            Conversation              ▼
//!                  ▲          InvocationAdapter
//!                  │         (registry → rate limit → retry)
//!                  └──────────── tool results
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod reasoning;
pub mod retry;
pub mod session;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorServices};
pub use agent::{LoopEvent, SessionHandle};
pub use config::{BucketConfig, CoreConfig, RateLimitConfig, RateLimitWaitMode, RetryConfig};
pub use error::{CoreError, ErrorDescriptor};
pub use ratelimit::{Admission, RateLimiter};
pub use reasoning::{Reply, ReasoningEngine, ToolCallRequest};
pub use session::{Session, SessionStatus, SessionSummary, Turn, TurnContent, TurnRole};
pub use tools::invoke::{InvocationAdapter, ToolOutcome, ToolResult};
pub use tools::registry::{Tool, ToolDescriptor, ToolRegistry};
pub use tools::schema::{ArgumentSchema, FieldKind, FieldSpec};

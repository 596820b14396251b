//! Seam to the external reasoning collaborator (the language model).
//!
//! The core never constructs prompts or talks to a provider; it hands the
//! full ordered turn history to a [`ReasoningEngine`] and consumes the
//! structured reply. The orchestrator wraps `send` in a timeout — this is
//! the loop's sole engine suspension point.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::session::Turn;

/// A structured request, emitted by the reasoning engine, to invoke a
/// registered tool. Call ids must be unique within a reply; uniqueness
/// across the session is the engine's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// One reply from the reasoning engine.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Investigation complete. Only accepted when no tool calls are
    /// requested alongside it.
    FinalAnswer(String),

    /// Tool-call requests, optionally with accompanying reasoning text.
    /// When both text and calls are present the calls take precedence —
    /// the loop treats the reply as incomplete reasoning and keeps acting.
    ToolCalls {
        text: Option<String>,
        calls: Vec<ToolCallRequest>,
    },

    /// The model deliberately hands off to a human. Not an error: a
    /// policy-driven terminal state. The justification is preserved
    /// verbatim in the session summary.
    Escalate { justification: String },
}

/// External reasoning collaborator contract.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Produce the next reply given the full ordered turn history.
    async fn send(&self, turns: &[Turn]) -> Result<Reply, CoreError>;
}

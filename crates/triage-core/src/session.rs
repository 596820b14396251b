//! Session and conversation state.
//!
//! A `Session` is one incident investigation. Its `Conversation` is an
//! append-only record of turns, mutated only by the orchestration loop that
//! owns the session — no locking is needed. The sequence index is the sole
//! ordering key and is stamped on append.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorDescriptor;
use crate::reasoning::ToolCallRequest;
use crate::tools::invoke::{ToolOutcome, ToolResult};

/// Terminal and non-terminal session states. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Succeeded,
    Failed,
    Escalated,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

/// Payload of one turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnContent {
    Text { text: String },

    /// Assistant turn carrying tool-call requests, optionally alongside
    /// reasoning text (the calls take precedence over the text).
    ToolCalls {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        calls: Vec<ToolCallRequest>,
    },

    ToolResult { result: ToolResult },
}

/// One atomic entry in the conversation record.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: TurnContent,
    pub timestamp: DateTime<Utc>,
    /// Monotonic per-session sequence index, assigned on append.
    pub seq: u64,
}

/// Append-only ordered turn record.
#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn push(&mut self, role: TurnRole, content: TurnContent) -> u64 {
        let seq = self.turns.len() as u64;
        self.turns.push(Turn {
            role,
            content,
            timestamp: Utc::now(),
            seq,
        });
        seq
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// One incident investigation run of the orchestration loop.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    status: SessionStatus,
    iterations: usize,
    max_iterations: usize,
    conversation: Conversation,
}

impl Session {
    /// Create a session seeded with the incident description as the first
    /// user turn (preceded by an optional system preamble turn).
    pub fn new(incident: &str, preamble: Option<&str>, max_iterations: usize) -> Self {
        let mut conversation = Conversation::default();
        if let Some(preamble) = preamble {
            conversation.push(
                TurnRole::User,
                TurnContent::Text {
                    text: preamble.to_string(),
                },
            );
        }
        conversation.push(
            TurnRole::User,
            TurnContent::Text {
                text: incident.to_string(),
            },
        );

        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            status: SessionStatus::Running,
            iterations: 0,
            max_iterations,
            conversation,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Count one observe/decide/act cycle. Called when a reply enters the
    /// Acting phase.
    pub fn begin_acting(&mut self) -> usize {
        self.iterations += 1;
        self.iterations
    }

    pub fn push_assistant_text(&mut self, text: impl Into<String>) {
        self.conversation
            .push(TurnRole::Assistant, TurnContent::Text { text: text.into() });
    }

    pub fn push_assistant_calls(&mut self, text: Option<String>, calls: Vec<ToolCallRequest>) {
        self.conversation
            .push(TurnRole::Assistant, TurnContent::ToolCalls { text, calls });
    }

    pub fn push_tool_result(&mut self, result: ToolResult) {
        self.conversation
            .push(TurnRole::Tool, TurnContent::ToolResult { result });
    }

    /// Surface an error back to the reasoning engine as a tool-result turn
    /// without terminating the session.
    pub fn push_error_result(&mut self, call_id: impl Into<String>, descriptor: ErrorDescriptor) {
        self.push_tool_result(ToolResult {
            call_id: call_id.into(),
            outcome: ToolOutcome::Error { error: descriptor },
            duration_ms: 0,
        });
    }

    /// Diagnostic text the loop injects for the engine to read (e.g. the
    /// repeated-failure fail-fast notice).
    pub fn push_diagnostic(&mut self, text: impl Into<String>) {
        self.conversation
            .push(TurnRole::Tool, TurnContent::Text { text: text.into() });
    }

    /// Move to a terminal state and produce the session summary. Terminal
    /// states are absorbing: once set, a later call keeps the first status.
    pub fn finish(
        mut self,
        status: SessionStatus,
        reason: impl Into<String>,
        final_answer: Option<String>,
        justification: Option<String>,
    ) -> SessionSummary {
        if !self.status.is_terminal() {
            self.status = status;
        }
        SessionSummary {
            session_id: self.id,
            status: self.status,
            reason: reason.into(),
            final_answer,
            justification,
            iterations: self.iterations,
            turns: self.conversation.turns,
        }
    }
}

/// Returned by `SessionHandle::await_result`: the terminal status, a
/// human-readable reason, and the full turn history for audit.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub reason: String,
    /// The model's final answer (`Succeeded` only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    /// The model's stated justification for requiring a human
    /// (`Escalated` only), preserved verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    pub iterations: usize,
    pub turns: Vec<Turn>,
}

impl SessionSummary {
    /// Count of tool-result turns, the audit measure of what was attempted.
    pub fn tool_result_turns(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| matches!(t.content, TurnContent::ToolResult { .. }))
            .count()
    }
}

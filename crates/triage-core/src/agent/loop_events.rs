//! Canonical event protocol for the orchestration loop.
//!
//! `LoopEvent` is the single source of truth for everything the
//! orchestrator emits. Consumers (a CLI, a dashboard, an audit sink)
//! receive these over an mpsc channel and map them to their own
//! presentation; the loop never blocks on — or fails because of — a
//! missing consumer.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::session::SessionStatus;

/// Events emitted by the orchestrator, one per discrete state change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// The loop is sending the conversation to the reasoning engine.
    Reasoning { turns: usize },

    /// A reply entered the Acting phase.
    IterationStarted { iteration: usize },

    /// A requested call is being dispatched.
    ToolDispatched {
        call_id: String,
        tool: String,
        endpoint: String,
    },

    /// A dispatched call produced its result.
    ToolCompleted {
        call_id: String,
        tool: String,
        is_error: bool,
        duration_ms: u64,
    },

    /// A loop-level error was surfaced to the engine as an error turn.
    ErrorTurn { call_id: String, code: String },

    /// The session reached a terminal state.
    Finished {
        session_id: String,
        status: SessionStatus,
    },
}

/// Send an event, ignoring a dropped receiver.
pub(crate) fn emit(tx: &mpsc::UnboundedSender<LoopEvent>, event: LoopEvent) {
    let _ = tx.send(event);
}

//! Shared fixtures for unit and loop tests: a scriptable reasoning engine
//! and a recording tool with canned responses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::reasoning::{Reply, ReasoningEngine, ToolCallRequest};
use crate::session::Turn;
use crate::tools::{ArgumentSchema, FieldKind, Tool};

pub(crate) fn request(call_id: &str, tool_name: &str, arguments: Value) -> ToolCallRequest {
    ToolCallRequest {
        call_id: call_id.to_string(),
        tool_name: tool_name.to_string(),
        arguments,
    }
}

/// One scripted engine step: an optional artificial delay, then a reply or
/// a transport error.
pub(crate) struct EngineStep {
    delay: Option<Duration>,
    reply: Result<Reply, CoreError>,
}

impl EngineStep {
    pub fn reply(reply: Reply) -> Self {
        Self { delay: None, reply: Ok(reply) }
    }

    pub fn error(err: CoreError) -> Self {
        Self { delay: None, reply: Err(err) }
    }

    pub fn delayed(delay: Duration, reply: Reply) -> Self {
        Self { delay: Some(delay), reply: Ok(reply) }
    }
}

/// Reasoning engine that replays a fixed script and records the turn count
/// it was shown at each step.
pub(crate) struct ScriptedEngine {
    steps: Mutex<VecDeque<EngineStep>>,
    observed_turn_counts: Mutex<Vec<usize>>,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<EngineStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            observed_turn_counts: Mutex::new(Vec::new()),
        }
    }

    pub fn observed_turn_counts(&self) -> Vec<usize> {
        self.observed_turn_counts.lock().clone()
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn send(&self, turns: &[Turn]) -> Result<Reply, CoreError> {
        self.observed_turn_counts.lock().push(turns.len());
        let step = self
            .steps
            .lock()
            .pop_front()
            .unwrap_or_else(|| panic!("scripted engine ran out of steps at turn {}", turns.len()));
        if let Some(delay) = step.delay {
            tokio::time::sleep(delay).await;
        }
        step.reply
    }
}

/// Canned response for one `RecordingTool` invocation.
pub(crate) enum ToolResponse {
    Success(Value),
    Transient(String),
    Panic,
    Slow(Duration, Value),
}

impl ToolResponse {
    pub fn success(payload: Value) -> Self {
        ToolResponse::Success(payload)
    }

    pub fn transient(message: &str) -> Self {
        ToolResponse::Transient(message.to_string())
    }
}

/// Tool double that counts invocations and replays scripted responses,
/// falling back to a default once the script runs dry.
pub(crate) struct RecordingTool {
    name: String,
    idempotent: bool,
    required_fields: Vec<String>,
    responses: Mutex<VecDeque<ToolResponse>>,
    /// When set, every unscripted invocation fails with this message.
    default_failure: Option<&'static str>,
    invocations: AtomicUsize,
    seen_arguments: Mutex<Vec<Value>>,
}

impl RecordingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            idempotent: false,
            required_fields: Vec::new(),
            responses: Mutex::new(VecDeque::new()),
            default_failure: None,
            invocations: AtomicUsize::new(0),
            seen_arguments: Mutex::new(Vec::new()),
        }
    }

    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    pub fn with_required_field(mut self, field: &str) -> Self {
        self.required_fields.push(field.to_string());
        self
    }

    pub fn respond(self, response: ToolResponse) -> Self {
        self.responses.lock().push_back(response);
        self
    }

    pub fn always_fail_transient(mut self, message: &'static str) -> Self {
        self.default_failure = Some(message);
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn seen_arguments(&self) -> Vec<Value> {
        self.seen_arguments.lock().clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "recording test tool"
    }

    fn schema(&self) -> ArgumentSchema {
        let mut schema = ArgumentSchema::new();
        for field in &self.required_fields {
            schema = schema.required(field, FieldKind::String, "required test field");
        }
        schema
    }

    fn idempotent(&self) -> bool {
        self.idempotent
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, CoreError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.seen_arguments.lock().push(arguments);
        let scripted = self.responses.lock().pop_front();
        match scripted {
            Some(ToolResponse::Success(payload)) => Ok(payload),
            Some(ToolResponse::Transient(message)) => {
                Err(CoreError::internal(anyhow::anyhow!("{message}")))
            }
            Some(ToolResponse::Panic) => panic!("scripted panic"),
            Some(ToolResponse::Slow(delay, payload)) => {
                tokio::time::sleep(delay).await;
                Ok(payload)
            }
            None => match self.default_failure {
                Some(message) => Err(CoreError::internal(anyhow::anyhow!("{message}"))),
                None => Ok(json!({"ok": true})),
            },
        }
    }
}

//! Incident orchestrator — the observe/decide/act loop.
//!
//! `Orchestrator` owns one session's lifecycle: it ships the ordered turn
//! history to the reasoning engine (Observing), interprets the reply
//! (Deciding), fans requested tool calls out through the invocation
//! adapter (Acting), and folds the results back into the conversation
//! until a terminal state is reached.
//!
//! ```text
//!  Created ──► Observing ──► Deciding ──► Acting ──► Observing ─ ─ ─
//!                  │             │
//!                  ▼             ▼
//!               Failed    Succeeded | Escalated | Failed
//! ```
//!
//! Consumers watch the loop through the `LoopEvent` channel and control it
//! through the `SessionHandle` (cancellation, awaiting the summary).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::{CoreError, ErrorDescriptor};
use crate::reasoning::{Reply, ReasoningEngine, ToolCallRequest};
use crate::session::{Session, SessionStatus, SessionSummary};
use crate::tools::invoke::{InvocationAdapter, ToolResult};

use super::failure::{self, FailureVerdict};
use super::loop_events::{emit, LoopEvent};

/// Configuration for one orchestrator run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_iterations: usize,
    pub reasoning_timeout: Duration,
    /// Optional system preamble seeded as the first turn, before the
    /// incident description.
    pub system_preamble: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            reasoning_timeout: Duration::from_secs(120),
            system_preamble: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_core(config: &CoreConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            reasoning_timeout: config.reasoning_timeout(),
            system_preamble: None,
        }
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.system_preamble = Some(preamble.into());
        self
    }
}

/// Shared services the orchestrator needs.
pub struct OrchestratorServices {
    pub engine: Arc<dyn ReasoningEngine>,
    pub adapter: Arc<InvocationAdapter>,
}

/// Runs the observe/decide/act loop for one incident session.
pub struct Orchestrator {
    services: OrchestratorServices,
    config: OrchestratorConfig,
}

/// Control surface for a running session: cancel it, await its summary.
pub struct SessionHandle {
    session_id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<SessionSummary>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.session_id
    }

    /// Request cancellation. Honored at the next state boundary; an
    /// in-flight Acting batch runs to completion first.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn await_result(self) -> SessionSummary {
        match self.task.await {
            Ok(summary) => summary,
            Err(err) => SessionSummary {
                session_id: self.session_id,
                status: SessionStatus::Failed,
                reason: format!("orchestration task failed: {err}"),
                final_answer: None,
                justification: None,
                iterations: 0,
                turns: Vec::new(),
            },
        }
    }
}

impl Orchestrator {
    pub fn new(services: OrchestratorServices, config: OrchestratorConfig) -> Self {
        Self { services, config }
    }

    /// Start a session for the given incident description.
    ///
    /// The loop runs as a spawned task and emits a `LoopEvent` per state
    /// change. Dropping the receiver is fine; events are then discarded.
    pub fn start(self, incident: &str) -> (SessionHandle, mpsc::UnboundedReceiver<LoopEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let session = Session::new(
            incident,
            self.config.system_preamble.as_deref(),
            self.config.max_iterations,
        );
        let session_id = session.id;
        tracing::info!(session_id = %session_id, "session started");

        let loop_cancel = cancel.clone();
        let task = tokio::spawn(run_loop(
            session,
            self.services,
            self.config,
            loop_cancel,
            event_tx,
        ));

        (
            SessionHandle {
                session_id,
                cancel,
                task,
            },
            event_rx,
        )
    }
}

async fn run_loop(
    mut session: Session,
    services: OrchestratorServices,
    config: OrchestratorConfig,
    cancel: CancellationToken,
    event_tx: mpsc::UnboundedSender<LoopEvent>,
) -> SessionSummary {
    let OrchestratorServices { engine, adapter } = services;
    let mut failure_counters: HashMap<String, usize> = HashMap::new();

    loop {
        if cancel.is_cancelled() {
            return finish(session, SessionStatus::Failed, CoreError::Cancelled.to_string(), None, None, &event_tx);
        }

        // Observing: the sole engine suspension point.
        emit(
            &event_tx,
            LoopEvent::Reasoning {
                turns: session.conversation().len(),
            },
        );
        let reply = tokio::select! {
            _ = cancel.cancelled() => {
                return finish(session, SessionStatus::Failed, CoreError::Cancelled.to_string(), None, None, &event_tx);
            }
            outcome = tokio::time::timeout(
                config.reasoning_timeout,
                engine.send(session.conversation().turns()),
            ) => match outcome {
                Ok(Ok(reply)) => reply,
                Ok(Err(err)) => {
                    tracing::warn!(session_id = %session.id, error = %err, "reasoning engine failed");
                    return finish(
                        session,
                        SessionStatus::Failed,
                        format!("reasoning engine error: {err}"),
                        None,
                        None,
                        &event_tx,
                    );
                }
                Err(_) => {
                    return finish(
                        session,
                        SessionStatus::Failed,
                        CoreError::ReasoningTimeout.to_string(),
                        None,
                        None,
                        &event_tx,
                    );
                }
            }
        };

        // Deciding.
        let (text, calls) = match reply {
            Reply::FinalAnswer(answer) => {
                session.push_assistant_text(&answer);
                return finish(
                    session,
                    SessionStatus::Succeeded,
                    "final answer",
                    Some(answer),
                    None,
                    &event_tx,
                );
            }
            Reply::Escalate { justification } => {
                session.push_assistant_text(&justification);
                return finish(
                    session,
                    SessionStatus::Escalated,
                    "escalated by reasoning engine",
                    None,
                    Some(justification),
                    &event_tx,
                );
            }
            // An empty call list is a final answer in disguise.
            Reply::ToolCalls { text, calls } if calls.is_empty() => {
                let answer = text.unwrap_or_default();
                session.push_assistant_text(&answer);
                return finish(
                    session,
                    SessionStatus::Succeeded,
                    "final answer",
                    Some(answer),
                    None,
                    &event_tx,
                );
            }
            Reply::ToolCalls { text, calls } => (text, calls),
        };

        // Tool calls take precedence over any accompanying text; entering
        // Acting is what consumes an iteration.
        if session.iterations() >= session.max_iterations() {
            let reason = CoreError::IterationLimitExceeded(session.max_iterations()).to_string();
            return finish(session, SessionStatus::Failed, reason, None, None, &event_tx);
        }
        let iteration = session.begin_acting();
        emit(&event_tx, LoopEvent::IterationStarted { iteration });
        tracing::debug!(
            session_id = %session.id,
            iteration,
            calls = calls.len(),
            "entering acting phase"
        );

        session.push_assistant_calls(text, calls.clone());

        if let Some(dup) = find_duplicate_call_id(&calls) {
            let err = CoreError::DuplicateCallId(dup.clone());
            tracing::warn!(session_id = %session.id, call_id = %dup, "duplicate call id in reply");
            emit(
                &event_tx,
                LoopEvent::ErrorTurn {
                    call_id: dup.clone(),
                    code: err.code().to_string(),
                },
            );
            session.push_error_result(dup, ErrorDescriptor::from(&err));
            continue;
        }

        // Acting.
        let results = dispatch_batch(&adapter, &calls, &event_tx).await;
        let verdict = failure::detect_repeated_failures(&mut failure_counters, &calls, &results);
        for result in results {
            session.push_tool_result(result);
        }

        match verdict {
            FailureVerdict::Clean => {}
            FailureVerdict::Diagnostic(text) => {
                tracing::warn!(session_id = %session.id, "repeated tool failure, injecting diagnostic");
                session.push_diagnostic(text);
            }
            FailureVerdict::Abort(reason) => {
                session.push_diagnostic(&reason);
                return finish(session, SessionStatus::Failed, reason, None, None, &event_tx);
            }
        }
    }
}

/// Fan one Acting batch out: calls on distinct endpoint keys run
/// concurrently, calls sharing an endpoint key run in issue order within
/// their group. Results come back in request-issue order regardless of
/// completion order.
async fn dispatch_batch(
    adapter: &Arc<InvocationAdapter>,
    calls: &[ToolCallRequest],
    event_tx: &mpsc::UnboundedSender<LoopEvent>,
) -> Vec<ToolResult> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (idx, call) in calls.iter().enumerate() {
        let key = adapter.endpoint_key(&call.tool_name);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, indices)) => indices.push(idx),
            None => groups.push((key, vec![idx])),
        }
    }

    let group_futures = groups.into_iter().map(|(endpoint, indices)| {
        let adapter = Arc::clone(adapter);
        let event_tx = event_tx.clone();
        let batch: Vec<(usize, ToolCallRequest)> =
            indices.into_iter().map(|i| (i, calls[i].clone())).collect();
        async move {
            let mut out = Vec::with_capacity(batch.len());
            for (idx, call) in batch {
                emit(
                    &event_tx,
                    LoopEvent::ToolDispatched {
                        call_id: call.call_id.clone(),
                        tool: call.tool_name.clone(),
                        endpoint: endpoint.clone(),
                    },
                );
                let result = adapter.invoke(&call).await;
                emit(
                    &event_tx,
                    LoopEvent::ToolCompleted {
                        call_id: result.call_id.clone(),
                        tool: call.tool_name.clone(),
                        is_error: result.outcome.is_error(),
                        duration_ms: result.duration_ms,
                    },
                );
                out.push((idx, result));
            }
            out
        }
    });

    let mut indexed: Vec<(usize, ToolResult)> = futures::future::join_all(group_futures)
        .await
        .into_iter()
        .flatten()
        .collect();
    indexed.sort_by_key(|(idx, _)| *idx);
    indexed.into_iter().map(|(_, result)| result).collect()
}

fn find_duplicate_call_id(calls: &[ToolCallRequest]) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    for call in calls {
        if !seen.insert(call.call_id.as_str()) {
            return Some(call.call_id.clone());
        }
    }
    None
}

fn finish(
    session: Session,
    status: SessionStatus,
    reason: impl Into<String>,
    final_answer: Option<String>,
    justification: Option<String>,
    event_tx: &mpsc::UnboundedSender<LoopEvent>,
) -> SessionSummary {
    let reason = reason.into();
    tracing::info!(
        session_id = %session.id,
        status = ?status,
        iterations = session.iterations(),
        %reason,
        "session finished"
    );
    let summary = session.finish(status, reason, final_answer, justification);
    emit(
        event_tx,
        LoopEvent::Finished {
            session_id: summary.session_id.to_string(),
            status: summary.status,
        },
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::ratelimit::RateLimiter;
    use crate::session::{TurnContent, TurnRole};
    use crate::testing::{request, EngineStep, RecordingTool, ScriptedEngine, ToolResponse};
    use crate::tools::invoke::ToolOutcome;
    use crate::tools::registry::{Tool, ToolRegistry};
    use crate::tools::schema::ArgumentSchema;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn build(
        engine: ScriptedEngine,
        tools: Vec<Arc<dyn Tool>>,
        config: OrchestratorConfig,
    ) -> Orchestrator {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        let mut core = CoreConfig::default();
        core.retry.base_delay_ms = 10;
        core.retry.max_delay_ms = 50;
        // Generous buckets keep rate limiting out of loop tests.
        core.rate_limit = RateLimitConfig {
            default_capacity: 1_000.0,
            default_refill_per_sec: 1_000.0,
            ..Default::default()
        };
        let limiter = Arc::new(RateLimiter::new(core.rate_limit.clone()));
        let adapter = Arc::new(InvocationAdapter::new(Arc::new(registry), limiter, &core));
        Orchestrator::new(
            OrchestratorServices {
                engine: Arc::new(engine),
                adapter,
            },
            config,
        )
    }

    fn tool_calls(calls: Vec<ToolCallRequest>) -> Reply {
        Reply::ToolCalls { text: None, calls }
    }

    fn result_call_ids(summary: &SessionSummary) -> Vec<String> {
        summary
            .turns
            .iter()
            .filter_map(|t| match &t.content {
                TurnContent::ToolResult { result } => Some(result.call_id.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn five_xx_investigation_succeeds_in_two_iterations() {
        let engine = ScriptedEngine::new(vec![
            EngineStep::reply(tool_calls(vec![
                request("c1", "check_service_health", json!({})),
                request("c2", "query_metrics", json!({})),
            ])),
            EngineStep::reply(tool_calls(vec![
                request("c3", "list_pods", json!({})),
                request("c4", "rollback", json!({})),
            ])),
            EngineStep::reply(Reply::FinalAnswer(
                "Rolled back service X due to a crash-looping pod.".to_string(),
            )),
        ]);
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(RecordingTool::new("check_service_health").idempotent()),
            Arc::new(RecordingTool::new("query_metrics").idempotent()),
            Arc::new(RecordingTool::new("list_pods").idempotent()),
            Arc::new(RecordingTool::new("rollback")),
        ];
        let orchestrator = build(engine, tools, OrchestratorConfig::default());

        let (handle, _events) = orchestrator.start("high 5xx rate on service X");
        let summary = handle.await_result().await;

        assert_eq!(summary.status, SessionStatus::Succeeded);
        assert_eq!(summary.iterations, 2);
        assert_eq!(summary.tool_result_turns(), 4);
        assert_eq!(
            summary.final_answer.as_deref(),
            Some("Rolled back service X due to a crash-looping pod.")
        );
    }

    #[tokio::test]
    async fn escalation_preserves_justification_verbatim() {
        let justification = "Deleting the PVC risks data loss; a human must approve.";
        let engine = ScriptedEngine::new(vec![EngineStep::reply(Reply::Escalate {
            justification: justification.to_string(),
        })]);
        let orchestrator = build(engine, vec![], OrchestratorConfig::default());

        let (handle, _events) = orchestrator.start("stuck PVC on payments");
        let summary = handle.await_result().await;

        assert_eq!(summary.status, SessionStatus::Escalated);
        assert_eq!(summary.justification.as_deref(), Some(justification));
        assert_eq!(summary.iterations, 0);
    }

    #[tokio::test]
    async fn iteration_limit_fails_the_session() {
        let batch = || tool_calls(vec![request("c1", "list_pods", json!({}))]);
        let engine = ScriptedEngine::new(vec![
            EngineStep::reply(batch()),
            EngineStep::reply(batch()),
            EngineStep::reply(batch()),
        ]);
        let tools: Vec<Arc<dyn Tool>> =
            vec![Arc::new(RecordingTool::new("list_pods").idempotent())];
        let config = OrchestratorConfig {
            max_iterations: 2,
            ..Default::default()
        };
        let orchestrator = build(engine, tools, config);

        let (handle, _events) = orchestrator.start("incident");
        let summary = handle.await_result().await;

        assert_eq!(summary.status, SessionStatus::Failed);
        assert!(summary.reason.contains("iteration limit exceeded"));
        assert_eq!(summary.iterations, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_idempotent_failure_becomes_error_turn_and_session_continues() {
        let rollback = Arc::new(
            RecordingTool::new("rollback_deploy")
                .respond(ToolResponse::transient("request timed out")),
        );
        let engine = ScriptedEngine::new(vec![
            EngineStep::reply(tool_calls(vec![request("c1", "rollback_deploy", json!({}))])),
            EngineStep::reply(Reply::FinalAnswer(
                "Rollback failed with a timeout; manual verification needed.".to_string(),
            )),
        ]);
        let orchestrator = build(engine, vec![rollback.clone()], OrchestratorConfig::default());

        let (handle, _events) = orchestrator.start("bad deploy on api");
        let summary = handle.await_result().await;

        assert_eq!(summary.status, SessionStatus::Succeeded);
        assert_eq!(rollback.invocations(), 1);
        let error_codes: Vec<String> = summary
            .turns
            .iter()
            .filter_map(|t| match &t.content {
                TurnContent::ToolResult { result } => match &result.outcome {
                    ToolOutcome::Error { error } => Some(error.code.clone()),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert_eq!(error_codes, vec!["retries_exhausted".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_call_ids_abort_the_batch_not_the_session() {
        let probe = Arc::new(RecordingTool::new("list_pods").idempotent());
        let engine = ScriptedEngine::new(vec![
            EngineStep::reply(tool_calls(vec![
                request("c1", "list_pods", json!({})),
                request("c1", "list_pods", json!({"namespace": "prod"})),
            ])),
            EngineStep::reply(Reply::FinalAnswer("done".to_string())),
        ]);
        let orchestrator = build(engine, vec![probe.clone()], OrchestratorConfig::default());

        let (handle, _events) = orchestrator.start("incident");
        let summary = handle.await_result().await;

        assert_eq!(summary.status, SessionStatus::Succeeded);
        assert_eq!(probe.invocations(), 0);
        let error_codes: Vec<String> = summary
            .turns
            .iter()
            .filter_map(|t| match &t.content {
                TurnContent::ToolResult { result } => result.outcome.error_code().map(String::from),
                _ => None,
            })
            .collect();
        assert_eq!(error_codes, vec!["duplicate_call_id".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn results_append_in_request_order_despite_completion_order() {
        let slow = Arc::new(
            RecordingTool::new("fetch_logs")
                .idempotent()
                .respond(ToolResponse::Slow(
                    Duration::from_millis(200),
                    json!({"lines": 10}),
                )),
        );
        let fast = Arc::new(RecordingTool::new("query_metrics").idempotent());
        let engine = ScriptedEngine::new(vec![
            EngineStep::reply(tool_calls(vec![
                request("c1", "fetch_logs", json!({})),
                request("c2", "query_metrics", json!({})),
            ])),
            EngineStep::reply(Reply::FinalAnswer("done".to_string())),
        ]);
        let orchestrator = build(engine, vec![slow, fast], OrchestratorConfig::default());

        let (handle, _events) = orchestrator.start("incident");
        let summary = handle.await_result().await;

        assert_eq!(result_call_ids(&summary), vec!["c1", "c2"]);
        // seq strictly increasing across the whole record
        let seqs: Vec<u64> = summary.turns.iter().map(|t| t.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    /// Probe that records whether two invocations ever overlapped.
    struct SerialProbe {
        name: String,
        endpoint: String,
        in_flight: Arc<AtomicBool>,
        overlapped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Tool for SerialProbe {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "overlap probe"
        }
        fn schema(&self) -> ArgumentSchema {
            ArgumentSchema::new()
        }
        fn idempotent(&self) -> bool {
            true
        }
        fn endpoint_key(&self) -> String {
            self.endpoint.clone()
        }
        async fn invoke(&self, _arguments: Value) -> Result<Value, CoreError> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.store(false, Ordering::SeqCst);
            Ok(json!({"ok": true}))
        }
    }

    fn probe_pair(endpoint_a: &str, endpoint_b: &str) -> (Vec<Arc<dyn Tool>>, Arc<AtomicBool>) {
        let in_flight = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(SerialProbe {
                name: "query_metrics".to_string(),
                endpoint: endpoint_a.to_string(),
                in_flight: Arc::clone(&in_flight),
                overlapped: Arc::clone(&overlapped),
            }),
            Arc::new(SerialProbe {
                name: "query_alerts".to_string(),
                endpoint: endpoint_b.to_string(),
                in_flight,
                overlapped: Arc::clone(&overlapped),
            }),
        ];
        (tools, overlapped)
    }

    #[tokio::test(start_paused = true)]
    async fn same_endpoint_calls_are_serialized() {
        let (tools, overlapped) = probe_pair("prometheus", "prometheus");
        let engine = ScriptedEngine::new(vec![
            EngineStep::reply(tool_calls(vec![
                request("c1", "query_metrics", json!({})),
                request("c2", "query_alerts", json!({})),
            ])),
            EngineStep::reply(Reply::FinalAnswer("done".to_string())),
        ]);
        let orchestrator = build(engine, tools, OrchestratorConfig::default());

        let (handle, _events) = orchestrator.start("incident");
        let summary = handle.await_result().await;

        assert_eq!(summary.status, SessionStatus::Succeeded);
        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_endpoint_calls_run_concurrently() {
        let (tools, overlapped) = probe_pair("prometheus", "loki");
        let engine = ScriptedEngine::new(vec![
            EngineStep::reply(tool_calls(vec![
                request("c1", "query_metrics", json!({})),
                request("c2", "query_alerts", json!({})),
            ])),
            EngineStep::reply(Reply::FinalAnswer("done".to_string())),
        ]);
        let orchestrator = build(engine, tools, OrchestratorConfig::default());

        let (handle, _events) = orchestrator.start("incident");
        handle.await_result().await;

        assert!(overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn reasoning_timeout_fails_the_session() {
        let engine = ScriptedEngine::new(vec![EngineStep::delayed(
            Duration::from_secs(300),
            Reply::FinalAnswer("too late".to_string()),
        )]);
        let config = OrchestratorConfig {
            reasoning_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let orchestrator = build(engine, vec![], config);

        let (handle, _events) = orchestrator.start("incident");
        let summary = handle.await_result().await;

        assert_eq!(summary.status, SessionStatus::Failed);
        assert!(summary.reason.contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_honored_at_the_reasoning_boundary() {
        let engine = ScriptedEngine::new(vec![EngineStep::delayed(
            Duration::from_secs(60),
            Reply::FinalAnswer("never".to_string()),
        )]);
        let orchestrator = build(engine, vec![], OrchestratorConfig::default());

        let (handle, _events) = orchestrator.start("incident");
        handle.cancel();
        let summary = handle.await_result().await;

        assert_eq!(summary.status, SessionStatus::Failed);
        assert!(summary.reason.contains("cancelled"));
    }

    #[tokio::test]
    async fn engine_transport_error_fails_the_session() {
        let engine = ScriptedEngine::new(vec![EngineStep::error(CoreError::internal(
            anyhow::anyhow!("connection reset by peer"),
        ))]);
        let orchestrator = build(engine, vec![], OrchestratorConfig::default());

        let (handle, _events) = orchestrator.start("incident");
        let summary = handle.await_result().await;

        assert_eq!(summary.status, SessionStatus::Failed);
        assert!(summary.reason.contains("reasoning engine error"));
    }

    #[tokio::test]
    async fn empty_call_list_counts_as_final_answer() {
        let engine = ScriptedEngine::new(vec![EngineStep::reply(Reply::ToolCalls {
            text: Some("Nothing left to check; the service recovered.".to_string()),
            calls: vec![],
        })]);
        let orchestrator = build(engine, vec![], OrchestratorConfig::default());

        let (handle, _events) = orchestrator.start("incident");
        let summary = handle.await_result().await;

        assert_eq!(summary.status, SessionStatus::Succeeded);
        assert_eq!(
            summary.final_answer.as_deref(),
            Some("Nothing left to check; the service recovered.")
        );
        assert_eq!(summary.iterations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_identical_failures_get_diagnostic_then_abort() {
        let broken = Arc::new(
            RecordingTool::new("query_metrics")
                .idempotent()
                .with_required_field("query")
                .always_fail_transient("upstream unavailable"),
        );
        let batch = || tool_calls(vec![request("c1", "query_metrics", json!({"query": "up"}))]);
        let engine = ScriptedEngine::new(vec![
            EngineStep::reply(batch()),
            EngineStep::reply(batch()),
            EngineStep::reply(batch()),
        ]);
        let orchestrator = build(engine, vec![broken], OrchestratorConfig::default());

        let (handle, _events) = orchestrator.start("incident");
        let summary = handle.await_result().await;

        assert_eq!(summary.status, SessionStatus::Failed);
        assert!(summary.reason.contains("failed 3 times"));
        let diagnostics: Vec<&str> = summary
            .turns
            .iter()
            .filter_map(|t| match (&t.role, &t.content) {
                (TurnRole::Tool, TurnContent::Text { text }) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(diagnostics.iter().any(|d| d.contains("different strategy")));
    }

    #[tokio::test]
    async fn system_preamble_is_seeded_before_the_incident() {
        let engine = ScriptedEngine::new(vec![EngineStep::reply(Reply::FinalAnswer(
            "ok".to_string(),
        ))]);
        let engine = Arc::new(engine);
        let registry = ToolRegistry::new();
        let core = CoreConfig::default();
        let limiter = Arc::new(RateLimiter::new(core.rate_limit.clone()));
        let adapter = Arc::new(InvocationAdapter::new(Arc::new(registry), limiter, &core));
        let orchestrator = Orchestrator::new(
            OrchestratorServices {
                engine: engine.clone(),
                adapter,
            },
            OrchestratorConfig::default().with_preamble("You are an SRE triage agent."),
        );

        let (handle, _events) = orchestrator.start("incident");
        handle.await_result().await;

        // Preamble turn plus incident turn were shown to the engine.
        assert_eq!(engine.observed_turn_counts(), vec![2]);
    }

    #[tokio::test]
    async fn loop_events_cover_the_lifecycle() {
        let engine = ScriptedEngine::new(vec![
            EngineStep::reply(tool_calls(vec![request("c1", "list_pods", json!({}))])),
            EngineStep::reply(Reply::FinalAnswer("done".to_string())),
        ]);
        let tools: Vec<Arc<dyn Tool>> =
            vec![Arc::new(RecordingTool::new("list_pods").idempotent())];
        let orchestrator = build(engine, tools, OrchestratorConfig::default());

        let (handle, mut events) = orchestrator.start("incident");
        handle.await_result().await;

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(match event {
                LoopEvent::Reasoning { .. } => "reasoning",
                LoopEvent::IterationStarted { .. } => "iteration_started",
                LoopEvent::ToolDispatched { .. } => "tool_dispatched",
                LoopEvent::ToolCompleted { .. } => "tool_completed",
                LoopEvent::ErrorTurn { .. } => "error_turn",
                LoopEvent::Finished { .. } => "finished",
            });
        }
        assert_eq!(
            kinds,
            vec![
                "reasoning",
                "iteration_started",
                "tool_dispatched",
                "tool_completed",
                "reasoning",
                "finished",
            ]
        );
    }
}

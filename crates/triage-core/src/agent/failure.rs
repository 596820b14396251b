//! Repeated tool failure detection.
//!
//! Tracks failure signatures (tool, error code, argument shape) across
//! iterations. The same call shape failing twice earns the engine a
//! diagnostic turn telling it to change strategy; a third identical
//! failure aborts the session instead of churning forever.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::reasoning::ToolCallRequest;
use crate::tools::invoke::{ToolOutcome, ToolResult};

/// Identical failures before the engine gets a diagnostic turn.
pub const REPEATED_FAILURE_DIAGNOSTIC_THRESHOLD: usize = 2;

/// Identical failures before the session is failed outright.
pub const REPEATED_FAILURE_ABORT_THRESHOLD: usize = 3;

/// Outcome of scanning one Acting batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureVerdict {
    Clean,
    /// Inject this text as a diagnostic turn and keep going.
    Diagnostic(String),
    /// Fail the session with this reason.
    Abort(String),
}

/// Scan one batch of results against the running signature counters.
///
/// Any success in the batch clears all counters afterwards (the engine
/// recovered), but a verdict reached in the same batch still stands.
pub fn detect_repeated_failures(
    counters: &mut HashMap<String, usize>,
    calls: &[ToolCallRequest],
    results: &[ToolResult],
) -> FailureVerdict {
    let mut call_meta: HashMap<&str, (&str, u64)> = HashMap::new();
    for call in calls {
        call_meta.insert(
            call.call_id.as_str(),
            (call.tool_name.as_str(), hash_arguments(&call.arguments)),
        );
    }

    let mut saw_success = false;
    let mut verdict = FailureVerdict::Clean;

    for result in results {
        let error = match &result.outcome {
            ToolOutcome::Error { error } => error,
            ToolOutcome::Success { .. } => {
                saw_success = true;
                continue;
            }
        };

        let Some((tool_name, args_hash)) = call_meta.get(result.call_id.as_str()) else {
            continue;
        };

        let signature = format!("{}|{}|{}", tool_name, error.code, args_hash);
        let count = counters
            .entry(signature)
            .and_modify(|c| *c += 1)
            .or_insert(1);

        if *count >= REPEATED_FAILURE_ABORT_THRESHOLD {
            return FailureVerdict::Abort(format!(
                "Stopping investigation: tool '{}' failed {} times with the same '{}' error.",
                tool_name, *count, error.code
            ));
        }

        if *count >= REPEATED_FAILURE_DIAGNOSTIC_THRESHOLD && verdict == FailureVerdict::Clean {
            verdict = FailureVerdict::Diagnostic(format!(
                "Tool '{}' has failed {} times with the same '{}' error. Do not repeat this call; try a different strategy.",
                tool_name, *count, error.code
            ));
        }
    }

    if saw_success {
        counters.clear();
    }

    verdict
}

fn hash_arguments(arguments: &serde_json::Value) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    arguments.to_string().hash(&mut hasher);
    hasher.finish()
}

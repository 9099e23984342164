//! Tool dispatch with anti-spin guardrails (§4.5).
//!
//! Wraps registry lookup + execution with:
//! - a duplicate-call guard (exact `(name, canonical-json(args))` repeat, minus an allow-list)
//! - a circuit breaker (consecutive tool failures)
//! - a repetition guard (the same tool dominating a recent window)
//! - a per-tool execution timeout

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;

use super::registry::ToolRegistry;
use super::{ToolError, ToolObservation};

/// Number of consecutive tool failures that trips the circuit breaker.
pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 3;

/// Window size for the repetition guard.
pub const REPETITION_WINDOW: usize = 6;

/// Minimum occurrences of the same tool within the window to trigger the guard.
pub const REPETITION_THRESHOLD: usize = 4;

/// Default per-tool execution timeout when no override is configured.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Tool names exempt from the duplicate-call guard (idempotent/read-only
/// calls that are legitimately repeated, e.g. polling a clock).
pub const DUPLICATE_GUARD_ALLOW_LIST: &[&str] = &["current_time"];

/// Outcome of a dispatch attempt, distinguishing guardrail interventions
/// from the tool's own result so the orchestrator can trace them separately.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The tool ran and returned a result (ok or tool-level error).
    Ran(Result<ToolObservation, ToolError>),
    /// Blocked: identical `(name, args)` as the immediately preceding call.
    DuplicateBlocked,
    /// Blocked: the tool is not registered.
    ToolNotFound,
    /// Terminates the turn: consecutive tool failures hit the threshold.
    CircuitBreakerTripped,
    /// Not blocked, but flagged: the same tool dominates the recent window.
    /// The call still ran; `result` carries its outcome alongside the nudge.
    RepetitionGuard {
        /// The tool's own result, still delivered to the conversation.
        result: Result<ToolObservation, ToolError>,
    },
}

/// Tracks cross-call state needed to enforce the guardrails over a session.
#[derive(Debug, Default)]
pub struct DispatchState {
    last_call: Option<(String, String)>,
    consecutive_failures: u32,
    recent_tools: VecDeque<String>,
}

impl DispatchState {
    /// Fresh state for a new session/turn sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the repetition window (done after a repetition-guard nudge).
    pub fn clear_window(&mut self) {
        self.recent_tools.clear();
    }

    /// Snapshot of the recent-tool rolling window, oldest first — for checkpointing.
    pub fn recent_tools_snapshot(&self) -> Vec<String> {
        self.recent_tools.iter().cloned().collect()
    }

    /// Current consecutive-failure tally — for checkpointing.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Canonicalize a JSON value for duplicate-call comparison: stable key
/// ordering regardless of how the LLM emitted the object.
fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by_key(|(k, _)| k.clone());
                let mut out = serde_json::Map::new();
                for (k, v) in entries {
                    out.insert(k.clone(), sorted(v));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

/// Dispatch one tool call, applying all guardrails in order (§4.5):
/// duplicate-call guard -> registry lookup -> circuit breaker check ->
/// timeout-wrapped execution -> repetition-window update.
pub async fn dispatch(
    registry: &ToolRegistry,
    state: &mut DispatchState,
    tool_name: &str,
    args: &Value,
    timeout_override: Option<Duration>,
) -> DispatchOutcome {
    let canonical = canonical_json(args);

    if !DUPLICATE_GUARD_ALLOW_LIST.contains(&tool_name) {
        if let Some((last_name, last_args)) = &state.last_call {
            if last_name == tool_name && last_args == &canonical {
                return DispatchOutcome::DuplicateBlocked;
            }
        }
    }
    state.last_call = Some((tool_name.to_owned(), canonical));

    let Some(tool) = registry.get(tool_name) else {
        return DispatchOutcome::ToolNotFound;
    };

    if state.consecutive_failures >= CIRCUIT_BREAKER_THRESHOLD {
        return DispatchOutcome::CircuitBreakerTripped;
    }

    let call_timeout = timeout_override.unwrap_or(DEFAULT_TOOL_TIMEOUT);
    let result = match timeout(call_timeout, tool.call(args)).await {
        Ok(result) => result,
        Err(_) => Err(ToolError::Timeout(call_timeout)),
    };

    match &result {
        Ok(_) => state.consecutive_failures = 0,
        Err(_) => state.consecutive_failures = state.consecutive_failures.saturating_add(1),
    }

    // The failure that just pushed the tally to the threshold trips the
    // breaker itself, rather than waiting for a subsequent call to observe it.
    if state.consecutive_failures >= CIRCUIT_BREAKER_THRESHOLD {
        return DispatchOutcome::CircuitBreakerTripped;
    }

    state.recent_tools.push_back(tool_name.to_owned());
    while state.recent_tools.len() > REPETITION_WINDOW {
        state.recent_tools.pop_front();
    }

    let repeated = state
        .recent_tools
        .iter()
        .filter(|name| name.as_str() == tool_name)
        .count();

    if state.recent_tools.len() >= REPETITION_WINDOW && repeated >= REPETITION_THRESHOLD {
        state.clear_window();
        return DispatchOutcome::RepetitionGuard { result };
    }

    DispatchOutcome::Ran(result)
}

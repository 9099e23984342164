//! Structured trace events emitted by the orchestrator (§4.9).
//!
//! Events are handed to an external [`TraceSink`] — persistence, wiring to a
//! UI, or discarding them entirely are all the sink's business, not the
//! orchestrator's.

use serde::Serialize;
use serde_json::Value;

/// Closed set of trace phases the orchestrator can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TracePhase {
    /// A session has started.
    SessionStart,
    /// A new turn has begun.
    TurnStart,
    /// The planner sub-agent has been invoked.
    PlanningStart,
    /// The planner produced a step list.
    PlanGenerated,
    /// A `<think>` span was stripped from the raw LLM response.
    Thinking,
    /// Raw LLM response received.
    LlmResponse,
    /// A tool call was extracted and is about to be dispatched.
    ToolCall,
    /// A tool call completed (success or tool-level error).
    ToolResult,
    /// The extracted call named a tool that isn't registered.
    ToolNotFound,
    /// The duplicate-call guard blocked a repeat.
    DuplicateBlocked,
    /// The circuit breaker tripped.
    CircuitBreaker,
    /// The repetition guard fired.
    RepetitionGuard,
    /// The fallback engine served the turn from a non-primary provider.
    ModelFallback,
    /// The turn produced a final answer.
    FinalAnswer,
    /// The session aborted (max turns, timeout, or cancellation).
    SessionAbort,
}

/// Maximum length for response/tool-result string fields before clamping (§4.9).
pub const MAX_RESPONSE_CHARS: usize = 3000;
/// Maximum length for short content-snippet string fields before clamping (§4.9).
pub const MAX_SNIPPET_CHARS: usize = 500;

/// Clamp a string to at most `max_chars` characters, appending a truncation
/// marker when it was cut.
pub fn clamp(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...[truncated]")
}

/// One structured trace event (§4.9 wire format).
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    /// Which phase of the loop emitted this event.
    pub phase: TracePhase,
    /// Turn counter at emission time.
    pub turn: u32,
    /// Emission timestamp (RFC 3339).
    pub ts: String,
    /// Owning session's correlation id.
    pub session_id: String,
    /// Phase-specific payload fields.
    #[serde(flatten)]
    pub payload: Value,
}

impl TraceEvent {
    /// Build an event with no extra payload fields.
    pub fn new(phase: TracePhase, turn: u32, session_id: impl Into<String>) -> Self {
        Self::with_payload(phase, turn, session_id, Value::Object(serde_json::Map::new()))
    }

    /// Build an event carrying phase-specific payload fields.
    pub fn with_payload(phase: TracePhase, turn: u32, session_id: impl Into<String>, payload: Value) -> Self {
        Self {
            phase,
            turn,
            ts: chrono::Utc::now().to_rfc3339(),
            session_id: session_id.into(),
            payload,
        }
    }
}

/// External sink that trace events are flushed to.
///
/// Implementations must not block the orchestrator for long — a channel
/// send or a fire-and-forget write, not a network round trip.
pub trait TraceSink: Send + Sync {
    /// Emit one trace event.
    fn emit(&self, event: TraceEvent);
}

/// A [`TraceSink`] that discards every event — useful for the planner's
/// isolated sub-invocation (§4.8), which must not pollute the parent trace.
pub struct NullTraceSink;

impl TraceSink for NullTraceSink {
    fn emit(&self, _event: TraceEvent) {}
}

/// A [`TraceSink`] backed by an in-memory buffer, for tests and for
/// transports that poll rather than push.
#[derive(Default)]
pub struct BufferingTraceSink {
    events: std::sync::Mutex<Vec<TraceEvent>>,
}

impl BufferingTraceSink {
    /// Build an empty buffering sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot all events emitted so far, in emission order.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().expect("trace buffer lock poisoned").clone()
    }
}

impl TraceSink for BufferingTraceSink {
    fn emit(&self, event: TraceEvent) {
        self.events.lock().expect("trace buffer lock poisoned").push(event);
    }
}

/// Transport-side keep-alive, pinged periodically while a turn is in
/// flight (§4.7 Loop step 3, §5: "periodic typing pings").
pub trait TypingSink: Send + Sync {
    /// Signal that the session identified by `correlation_id` is still working.
    fn ping(&self, correlation_id: &str);
}

/// A [`TypingSink`] that does nothing — the default when no transport is bound.
pub struct NullTypingSink;

impl TypingSink for NullTypingSink {
    fn ping(&self, _correlation_id: &str) {}
}

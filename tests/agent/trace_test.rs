//! Tests for `src/agent/trace.rs`.

use wintermute::agent::trace::{clamp, BufferingTraceSink, NullTraceSink, TraceEvent, TracePhase, TraceSink};

#[test]
fn clamp_marks_truncation_only_when_it_actually_truncates() {
    assert_eq!(clamp("short", 100), "short");
    let clamped = clamp(&"z".repeat(20), 5);
    assert!(clamped.ends_with("...[truncated]"));
    assert!(clamped.starts_with("zzzzz"));
}

#[test]
fn buffering_sink_round_trips_payload_fields() {
    let sink = BufferingTraceSink::new();
    let payload = serde_json::json!({"tool": "current_time", "args": {}});
    sink.emit(TraceEvent::with_payload(TracePhase::ToolCall, 2, "session-x", payload));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].turn, 2);
    assert_eq!(events[0].payload["tool"], "current_time");
}

#[test]
fn null_trace_sink_discards_every_event_silently() {
    NullTraceSink.emit(TraceEvent::new(TracePhase::SessionStart, 0, "s1"));
}

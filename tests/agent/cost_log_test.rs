//! Tests for `src/agent/cost_log.rs`.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use wintermute::agent::cost_log::{append, load_all, prune, CostLogEntry, CostRecorder, JsonlCostRecorder, ModelPricing, NullCostRecorder, MAX_ENTRY_AGE_DAYS};

fn entry(ts: chrono::DateTime<Utc>, model: &str) -> CostLogEntry {
    CostLogEntry {
        ts,
        model: model.to_owned(),
        provider: "anthropic".to_owned(),
        tin: 100,
        tout: 200,
        cost_in: 0.01,
        cost_out: 0.02,
        cost: 0.03,
        free: false,
        actual: 0.03,
    }
}

#[test]
fn load_all_skips_malformed_lines_rather_than_erroring() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cost_log.jsonl");
    std::fs::write(&path, "not json\n").expect("write");
    append(&path, &entry(Utc::now(), "claude-sonnet-4-5")).expect("append");

    let loaded = load_all(&path).expect("should not error on the malformed line");
    assert_eq!(loaded.len(), 1);
}

#[test]
fn prune_keeps_entries_exactly_at_the_retention_boundary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cost_log.jsonl");
    let now = Utc::now();

    append(&path, &entry(now - Duration::days(MAX_ENTRY_AGE_DAYS), "at-boundary")).expect("append");
    append(&path, &entry(now - Duration::days(MAX_ENTRY_AGE_DAYS + 1), "past-boundary")).expect("append");

    prune(&path, now).expect("prune should succeed");
    let remaining = load_all(&path).expect("load should succeed");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].model, "at-boundary");
}

#[test]
fn jsonl_recorder_zero_rates_produce_a_paid_but_zero_cost_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cost_log.jsonl");
    let pricing = HashMap::from([(
        "free-tier-model".to_owned(),
        ModelPricing { cost_per_1k_input: 0.0, cost_per_1k_output: 0.0, free: false },
    )]);
    let recorder = JsonlCostRecorder::new(path.clone(), pricing);
    recorder.record(Utc::now(), "free-tier-model", "ollama", 10_000, 10_000);

    let loaded = load_all(&path).expect("load should succeed");
    assert!(!loaded[0].free);
    assert!((loaded[0].cost).abs() < f64::EPSILON);
}

#[test]
fn null_cost_recorder_writes_nothing() {
    NullCostRecorder.record(Utc::now(), "any-model", "any-provider", 1, 1);
}

//! Append-only cost log (§6 Persistence layout, §4.9 supplement).
//!
//! One JSON object per line in `cost_log.jsonl`. Pricing tables are a
//! deployment concern external to this crate — `record` accepts
//! already-computed costs rather than a price list.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum age, in days, a cost log entry is retained for (§8 Testable properties).
pub const MAX_ENTRY_AGE_DAYS: i64 = 90;

/// One cost-log line (§6: `{ts, model, provider, tin, tout, cost_in, cost_out, cost, free, actual}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostLogEntry {
    /// Emission timestamp (RFC 3339).
    pub ts: DateTime<Utc>,
    /// Model id served.
    pub model: String,
    /// Provider id served.
    pub provider: String,
    /// Input token count.
    pub tin: u32,
    /// Output token count.
    pub tout: u32,
    /// Computed input cost.
    pub cost_in: f64,
    /// Computed output cost.
    pub cost_out: f64,
    /// Total computed cost.
    pub cost: f64,
    /// Whether this call was served under a free tier.
    pub free: bool,
    /// Actual billed amount, if different from `cost` (e.g. rounding, credits).
    pub actual: f64,
}

/// Append one entry to `path`, creating the file if absent.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or written.
pub fn append(path: &Path, entry: &CostLogEntry) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(entry)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Load all entries from `path`, silently skipping malformed lines (a
/// partially-written crash-time line should not prevent startup).
///
/// # Errors
///
/// Returns an error only if the file cannot be opened at all.
pub fn load_all(path: &Path) -> anyhow::Result<Vec<CostLogEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(entry) = serde_json::from_str(&line) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Rewrite `path` keeping only entries no older than [`MAX_ENTRY_AGE_DAYS`],
/// relative to `now`. Called once at startup (§6, §8).
///
/// # Errors
///
/// Returns an error if the file cannot be read or rewritten.
pub fn prune(path: &Path, now: DateTime<Utc>) -> anyhow::Result<()> {
    let entries = load_all(path)?;
    let cutoff = now - chrono::Duration::days(MAX_ENTRY_AGE_DAYS);
    let kept: Vec<_> = entries.into_iter().filter(|e| e.ts >= cutoff).collect();

    let mut buf = String::new();
    for entry in &kept {
        buf.push_str(&serde_json::to_string(entry)?);
        buf.push('\n');
    }
    std::fs::write(path, buf)?;
    Ok(())
}

/// Per-1k-token pricing for one model. Pricing tables live in deployment
/// configuration, not this crate — callers build [`JsonlCostRecorder`] from
/// whatever source they like.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelPricing {
    /// Cost per 1000 input tokens.
    pub cost_per_1k_input: f64,
    /// Cost per 1000 output tokens.
    pub cost_per_1k_output: f64,
    /// Whether this model is served under a free tier regardless of usage.
    pub free: bool,
}

/// Records one completion's token usage as a cost-log entry, given a turn's
/// outcome (§4.7 Loop step 6: "update token counters, log cost").
pub trait CostRecorder: Send + Sync {
    /// Record usage for one completion call.
    fn record(&self, ts: DateTime<Utc>, model: &str, provider: &str, input_tokens: u32, output_tokens: u32);
}

/// A [`CostRecorder`] that appends to a `cost_log.jsonl` file, pricing each
/// call from a static per-model table (zero-cost/free if the model is unlisted).
pub struct JsonlCostRecorder {
    path: PathBuf,
    pricing: HashMap<String, ModelPricing>,
}

impl JsonlCostRecorder {
    /// Build a recorder writing to `path`, pricing models from `pricing`.
    pub fn new(path: PathBuf, pricing: HashMap<String, ModelPricing>) -> Self {
        Self { path, pricing }
    }
}

impl CostRecorder for JsonlCostRecorder {
    fn record(&self, ts: DateTime<Utc>, model: &str, provider: &str, input_tokens: u32, output_tokens: u32) {
        let pricing = self.pricing.get(model).copied().unwrap_or(ModelPricing { free: true, ..ModelPricing::default() });
        let cost_in = pricing.cost_per_1k_input * f64::from(input_tokens) / 1000.0;
        let cost_out = pricing.cost_per_1k_output * f64::from(output_tokens) / 1000.0;
        let cost = cost_in + cost_out;
        let entry = CostLogEntry {
            ts,
            model: model.to_owned(),
            provider: provider.to_owned(),
            tin: input_tokens,
            tout: output_tokens,
            cost_in,
            cost_out,
            cost,
            free: pricing.free,
            actual: if pricing.free { 0.0 } else { cost },
        };
        let _ = append(&self.path, &entry);
    }
}

/// A [`CostRecorder`] that discards every call — for tests and for
/// deployments that don't care to track spend.
pub struct NullCostRecorder;

impl CostRecorder for NullCostRecorder {
    fn record(&self, _ts: DateTime<Utc>, _model: &str, _provider: &str, _input_tokens: u32, _output_tokens: u32) {}
}

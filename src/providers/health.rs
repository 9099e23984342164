//! Per-provider health tracking with cooldowns (§4.3 Provider Health Tracker).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::ErrorKind;

/// One provider's health record: failure streak and active cooldown.
#[derive(Debug, Clone, Copy)]
struct HealthRecord {
    failures: u32,
    cooldown_until: Option<Instant>,
}

/// Shortcut-cache entry: the last provider/model combination that
/// successfully served a fallback call, with the time it happened (§4.3 step 3).
#[derive(Debug, Clone)]
pub struct ShortcutEntry {
    /// Provider id that last succeeded as a fallback.
    pub provider_id: String,
    /// Model id used on that successful call.
    pub model_id: String,
    /// When the success was recorded.
    pub recorded_at: Instant,
}

/// Optional overrides for per-kind cooldown durations, keyed by
/// [`ErrorKind::config_key`] (`models.fallback_cooldowns.<kind>`).
pub type CooldownOverrides = HashMap<String, u64>;

/// Tracks failure counts and cooldowns for every known provider id.
///
/// Not internally synchronized — callers serialize access through the single
/// mutex described in §4.3 ("the entire walk is serialized by a single
/// mutex"); see [`super::fallback::FallbackEngine`].
#[derive(Debug, Default)]
pub struct HealthTable {
    records: HashMap<String, HealthRecord>,
    shortcut: Option<ShortcutEntry>,
}

/// How long the shortcut cache entry stays valid before the chain is walked
/// from the top again (§4.3 step 3: "timestamp < 60s old").
pub const SHORTCUT_TTL: Duration = Duration::from_secs(60);

impl HealthTable {
    /// Create an empty health table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `provider_id` is currently available (no active cooldown).
    pub fn is_available(&self, provider_id: &str) -> bool {
        match self.records.get(provider_id) {
            Some(record) => match record.cooldown_until {
                Some(until) => Instant::now() >= until,
                None => true,
            },
            None => true,
        }
    }

    /// Record a failure against `provider_id`, applying a cooldown derived
    /// from `kind` (overridden by `overrides` if present).
    pub fn record_failure(
        &mut self,
        provider_id: &str,
        kind: ErrorKind,
        overrides: &CooldownOverrides,
    ) {
        let secs = overrides
            .get(kind.config_key())
            .copied()
            .unwrap_or_else(|| kind.default_cooldown_secs());

        let record = self.records.entry(provider_id.to_owned()).or_insert(HealthRecord {
            failures: 0,
            cooldown_until: None,
        });
        record.failures = record.failures.saturating_add(1);
        record.cooldown_until = Some(Instant::now() + Duration::from_secs(secs));
    }

    /// Clear `provider_id`'s record entirely on success (§4.3: "Success
    /// clears its record entirely").
    pub fn record_success(&mut self, provider_id: &str) {
        self.records.remove(provider_id);
    }

    /// Current consecutive-failure count for `provider_id`.
    pub fn failure_count(&self, provider_id: &str) -> u32 {
        self.records.get(provider_id).map_or(0, |r| r.failures)
    }

    /// Update the shortcut cache with the most recent successful fallback.
    pub fn update_shortcut(&mut self, provider_id: String, model_id: String) {
        self.shortcut = Some(ShortcutEntry { provider_id, model_id, recorded_at: Instant::now() });
    }

    /// Return the shortcut entry if it exists and is still within TTL.
    pub fn shortcut(&self) -> Option<&ShortcutEntry> {
        self.shortcut
            .as_ref()
            .filter(|entry| entry.recorded_at.elapsed() < SHORTCUT_TTL)
    }
}

//! Append-only chat history log (§6 Persistence layout).
//!
//! Separate from the [`crate::agent::checkpoint`] store: this is a flat,
//! human-browsable transcript across all sessions, not a per-turn resume
//! snapshot.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content fields are capped to this many characters before logging (§6).
pub const MAX_CONTENT_CHARS: usize = 2000;

/// One chat-history line (§6: `{ts, role, content (capped 2000 chars), source}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatLogEntry {
    /// Emission timestamp (RFC 3339).
    pub ts: DateTime<Utc>,
    /// Message role (`"user"`, `"assistant"`, …).
    pub role: String,
    /// Message content, capped to [`MAX_CONTENT_CHARS`].
    pub content: String,
    /// Originating session/correlation id.
    pub source: String,
}

impl ChatLogEntry {
    /// Build an entry, capping `content` to [`MAX_CONTENT_CHARS`].
    pub fn new(ts: DateTime<Utc>, role: impl Into<String>, content: &str, source: impl Into<String>) -> Self {
        let capped: String = content.chars().take(MAX_CONTENT_CHARS).collect();
        Self { ts, role: role.into(), content: capped, source: source.into() }
    }
}

/// Append one entry to `path`, creating the file if absent.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or written.
pub fn append(path: &Path, entry: &ChatLogEntry) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(entry)?;
    writeln!(file, "{line}")?;
    Ok(())
}

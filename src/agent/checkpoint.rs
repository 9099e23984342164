//! Durable per-turn checkpoints (§4.9).
//!
//! A checkpoint is a point-in-time snapshot of [`crate::agent::orchestrator::TurnState`]
//! written atomically (tmp file + rename, matching `credentials::update_env_credentials`)
//! so a crash mid-write never leaves a half-written `checkpoint.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credentials::mask_key;
use crate::providers::Message;

/// A snapshotted plan, if the planner ran for this turn (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSnapshot {
    /// Ordered plan steps.
    pub steps: Vec<String>,
    /// Index of the step currently being worked on.
    pub current_index: usize,
    /// The original query the plan was generated for.
    pub original_query: String,
}

/// Per-turn state persisted to disk (§3 Checkpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint/trace correlation id.
    pub uuid: String,
    /// Full conversation history at checkpoint time.
    pub history: Vec<Message>,
    /// Active plan, if any.
    pub plan: Option<PlanSnapshot>,
    /// Turn counter at checkpoint time.
    pub turn_count: u32,
    /// Masked model-selection key reference — never a full key (§3 Invariants).
    pub masked_key: String,
    /// Trace correlation id (normally equal to `uuid`).
    pub trace_id: String,
    /// Recent-tool rolling window at checkpoint time.
    pub recent_tools: Vec<String>,
    /// Consecutive tool-failure count at checkpoint time.
    pub failure_count: u32,
}

impl Checkpoint {
    /// Build a checkpoint, masking `api_key` down to its last-8-char suffix
    /// (or `"NONE"`) per §3 Invariants — callers must never pass a raw key
    /// through any other field.
    pub fn new(
        uuid: String,
        history: Vec<Message>,
        plan: Option<PlanSnapshot>,
        turn_count: u32,
        api_key: Option<&str>,
        trace_id: String,
        recent_tools: Vec<String>,
        failure_count: u32,
    ) -> Self {
        Self {
            uuid,
            history,
            plan,
            turn_count,
            masked_key: mask_key(api_key),
            trace_id,
            recent_tools,
            failure_count,
        }
    }
}

/// Errors writing or loading a checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// The runs directory could not be created.
    #[error("cannot create runs directory {path}: {source}")]
    CreateDir {
        /// Directory path that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Serialization or file I/O failed.
    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The checkpoint JSON was malformed.
    #[error("checkpoint JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Writes and loads checkpoints under `<runs_dir>/<uuid>/checkpoint.json`.
pub struct CheckpointStore {
    runs_dir: PathBuf,
}

impl CheckpointStore {
    /// Build a store rooted at `runs_dir` (§6 Persistence layout).
    pub fn new(runs_dir: PathBuf) -> Self {
        Self { runs_dir }
    }

    /// Directory a given checkpoint's files live under.
    fn turn_dir(&self, uuid: &str) -> PathBuf {
        self.runs_dir.join(uuid)
    }

    /// Write `checkpoint` atomically to `<runs_dir>/<uuid>/checkpoint.json`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the directory cannot be created or the
    /// file cannot be written.
    pub fn write(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let dir = self.turn_dir(&checkpoint.uuid);
        std::fs::create_dir_all(&dir).map_err(|source| CheckpointError::CreateDir { path: dir.clone(), source })?;

        let final_path = dir.join("checkpoint.json");
        let tmp_path = dir.join("checkpoint.json.tmp");
        let serialized = serde_json::to_vec_pretty(checkpoint)?;
        std::fs::write(&tmp_path, &serialized)?;
        std::fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    /// Load a previously written checkpoint, if one exists for `uuid`.
    ///
    /// Restores history, plan, counters, and trace id. Keys are never
    /// restored — the active configuration's keys are used on resume (§4.9).
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the file exists but cannot be parsed.
    pub fn load(&self, uuid: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.turn_dir(uuid).join("checkpoint.json");
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read(&path)?;
        let checkpoint: Checkpoint = serde_json::from_slice(&contents)?;
        Ok(Some(checkpoint))
    }
}

/// Generate a fresh checkpoint/trace correlation id.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

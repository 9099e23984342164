//! Process-level wiring: one [`Gateway`] owns the router, fallback engine,
//! model manager, tool registry, and orchestrator for the whole process
//! (§9 Design Notes: "the single gateway instance... becomes an explicit
//! `Gateway` value owned by the process entry point").

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::agent::chat_log::{self, ChatLogEntry};
use crate::agent::checkpoint::CheckpointStore;
use crate::agent::cost_log::{CostRecorder, JsonlCostRecorder};
use crate::agent::orchestrator::{ImageAttachment, Orchestrator, OrchestratorConfig, SessionState};
use crate::agent::trace::{TraceSink, TypingSink};
use crate::config::{Config, ModelOverride, RuntimePaths};
use crate::credentials::Credentials;
use crate::model_manager::{ModelManager, RoutingTable, TaskType};
use crate::providers::fallback::FallbackEngine;
use crate::providers::health::CooldownOverrides;
use crate::providers::router::ModelRouter;
use crate::tools::builtin::{CalculatorTool, CurrentTimeTool};
use crate::tools::registry::ToolRegistry;

/// Owns every long-lived collaborator and per-session state for one process.
pub struct Gateway {
    orchestrator: Arc<Orchestrator>,
    paths: RuntimePaths,
    sessions: std::sync::Mutex<HashMap<String, Arc<AsyncMutex<SessionState>>>>,
}

impl Gateway {
    /// Build a gateway from loaded configuration, credentials, resolved
    /// runtime paths, and a trace/typing transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the model router cannot be built (e.g. a missing
    /// credential for the default model).
    pub fn new(
        config: &Config,
        credentials: &Credentials,
        paths: RuntimePaths,
        trace_sink: Arc<dyn TraceSink>,
        typing_sink: Arc<dyn TypingSink>,
    ) -> anyhow::Result<Self> {
        let router = ModelRouter::from_config(&config.models, &config.providers, credentials)?;
        let cooldowns: CooldownOverrides = config.fallback.fallback_cooldowns.clone();
        let fallback = Arc::new(FallbackEngine::new(Arc::new(router), config.fallback.fallback_chain.clone(), cooldowns));

        let routing_table = build_routing_table(&config.agent.model_overrides);
        let model_manager = Arc::new(ModelManager::new(
            config.models.default.clone(),
            routing_table,
            fallback,
            config.agent.smart_routing,
        ));

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CurrentTimeTool));
        registry.register(Arc::new(CalculatorTool));
        let tools = Arc::new(registry);

        let checkpoints = Arc::new(CheckpointStore::new(paths.runs_dir.clone()));
        if paths.cost_log.exists() {
            crate::agent::cost_log::prune(&paths.cost_log, chrono::Utc::now())?;
        }
        let cost_recorder: Arc<dyn CostRecorder> = Arc::new(JsonlCostRecorder::new(paths.cost_log.clone(), HashMap::new()));
        let orchestrator_config = OrchestratorConfig::from_config(&config.agent, &config.personality);

        let orchestrator = Arc::new(Orchestrator::new(
            model_manager,
            tools,
            trace_sink,
            typing_sink,
            checkpoints,
            cost_recorder,
            orchestrator_config,
        ));

        Ok(Self { orchestrator, paths, sessions: std::sync::Mutex::new(HashMap::new()) })
    }

    /// Build a gateway directly from an already-constructed orchestrator, for
    /// tests that don't need real providers wired up.
    #[doc(hidden)]
    pub fn for_testing(orchestrator: Arc<Orchestrator>, paths: RuntimePaths) -> Self {
        Self { orchestrator, paths, sessions: std::sync::Mutex::new(HashMap::new()) }
    }

    /// Run one user turn for `session_id` to completion, persisting the
    /// updated session history and appending to the chat log (§6).
    ///
    /// # Errors
    ///
    /// Returns an error if the chat log cannot be written.
    pub async fn handle_turn(
        &self,
        session_id: &str,
        user_text: &str,
        images: Vec<ImageAttachment>,
        api_key_for_masking: Option<&str>,
        cancel: CancellationToken,
    ) -> anyhow::Result<String> {
        let lock = self.session_lock(session_id);
        let mut session = lock.lock().await;

        chat_log::append(&self.paths.chat_history, &ChatLogEntry::new(chrono::Utc::now(), "user", user_text, session_id))?;

        let result = self
            .orchestrator
            .speak(session_id, std::mem::take(&mut *session), user_text, images, None, api_key_for_masking, cancel)
            .await;

        chat_log::append(
            &self.paths.chat_history,
            &ChatLogEntry::new(chrono::Utc::now(), "assistant", &result.answer, session_id),
        )?;

        *session = result.session;
        Ok(result.answer)
    }

    /// Get or create the per-session mutex serializing turns for `session_id`
    /// (§4.2: "turns for a given session are serialized").
    fn session_lock(&self, session_id: &str) -> Arc<AsyncMutex<SessionState>> {
        let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
        Arc::clone(
            sessions
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(AsyncMutex::new(SessionState::default()))),
        )
    }
}

/// Build a smart-routing table from `model_overrides.<model>.task_types`
/// config entries (§4.4, §6).
fn build_routing_table(overrides: &HashMap<String, ModelOverride>) -> RoutingTable {
    let mut entries = Vec::new();
    for (spec, entry) in overrides {
        for task_name in &entry.task_types {
            if let Some(task_type) = parse_task_type(task_name) {
                entries.push((task_type, spec.clone()));
            }
        }
    }
    RoutingTable::new(entries)
}

/// Parse a `task_types` config string into a [`TaskType`], ignoring unknown names.
fn parse_task_type(name: &str) -> Option<TaskType> {
    match name.to_lowercase().as_str() {
        "coding" => Some(TaskType::Coding),
        "reasoning" => Some(TaskType::Reasoning),
        "creative" => Some(TaskType::Creative),
        "local" => Some(TaskType::Local),
        "quick" => Some(TaskType::Quick),
        "vision" => Some(TaskType::Vision),
        "math" => Some(TaskType::Math),
        "chat" => Some(TaskType::Chat),
        _ => None,
    }
}

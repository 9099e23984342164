//! Primary/fallback model selection and opt-in smart routing (§4.4).
//!
//! The model manager owns the "current selection" for a session: normally
//! the configured default, but smart routing can swap it for the duration of
//! one turn based on a task-type classification. Every turn-exit path must
//! restore the pre-route selection — callers drive that via [`RouteGuard`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::providers::fallback::{FallbackEngine, FallbackExhausted, FallbackOutcome};
use crate::providers::CompletionRequest;

/// Coarse task-type classification used to pick a smart-routing target (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// Source code generation or review.
    Coding,
    /// Multi-step logical or mathematical reasoning.
    Reasoning,
    /// Open-ended or stylistic writing.
    Creative,
    /// Should run on a local model rather than a hosted API.
    Local,
    /// Short, low-latency factual lookups.
    Quick,
    /// Requires image understanding.
    Vision,
    /// Numeric/arithmetic-heavy work.
    Math,
    /// Default conversational turn.
    Chat,
}

/// Routing table mapping task types to a preferred `<provider>/<model>` spec.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: std::collections::HashMap<TaskType, String>,
}

impl RoutingTable {
    /// Build a routing table from `(task_type, spec)` pairs.
    pub fn new(entries: impl IntoIterator<Item = (TaskType, String)>) -> Self {
        Self { entries: entries.into_iter().collect() }
    }

    /// Look up the preferred spec for a task type.
    pub fn lookup(&self, task_type: TaskType) -> Option<&str> {
        self.entries.get(&task_type).map(String::as_str)
    }
}

/// Owns the live model selection and the fallback engine underneath it.
pub struct ModelManager {
    default_spec: String,
    selection: RwLock<String>,
    routing_table: RoutingTable,
    smart_routing_enabled: AtomicBool,
    fallback: Arc<FallbackEngine>,
}

impl ModelManager {
    /// Construct a manager with `default_spec` as the initial/resting
    /// selection.
    pub fn new(default_spec: String, routing_table: RoutingTable, fallback: Arc<FallbackEngine>, smart_routing_enabled: bool) -> Self {
        Self {
            selection: RwLock::new(default_spec.clone()),
            default_spec,
            routing_table,
            smart_routing_enabled: AtomicBool::new(smart_routing_enabled),
            fallback,
        }
    }

    /// The spec currently selected for calls.
    pub fn current_selection(&self) -> String {
        self.selection.read().expect("selection lock poisoned").clone()
    }

    /// Enable or disable smart routing at runtime.
    pub fn set_smart_routing(&self, enabled: bool) {
        self.smart_routing_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Whether smart routing is currently enabled.
    pub fn smart_routing_enabled(&self) -> bool {
        self.smart_routing_enabled.load(Ordering::SeqCst)
    }

    /// Begin a turn: if smart routing is enabled and the routing table has
    /// an entry for `task_type`, swap the live selection to it and return a
    /// guard that restores the previous selection — on success, error,
    /// cancellation, or timeout alike — when dropped (§4.4: "save
    /// `_pre_route_state`, restore on all turn-exit paths").
    ///
    /// Before applying an override, the target provider must not be in
    /// cooldown and must have a credentialed provider instance loaded
    /// (§4.4: "check that the target provider is not in cooldown and has a
    /// key"); otherwise the turn stays pinned to the resting selection.
    ///
    /// The restore runs synchronously in [`Drop`], which is what makes it
    /// fire even when the turn future is cancelled rather than awaited to
    /// completion.
    pub async fn begin_turn(self: &Arc<Self>, task_type: Option<TaskType>) -> RouteGuard {
        let pre_route_state = self.current_selection();

        if self.smart_routing_enabled() {
            if let Some(spec) = task_type.and_then(|t| self.routing_table.lookup(t)) {
                if self.fallback.has_model(spec)
                    && self.fallback.is_provider_available(crate::providers::router::provider_id_of(spec)).await
                {
                    *self.selection.write().expect("selection lock poisoned") = spec.to_owned();
                }
            }
        }

        RouteGuard { manager: Arc::clone(self), pre_route_state }
    }

    /// Run a completion against the current selection, with resilient
    /// fallback (§4.3). Does not itself mutate the persistent selection —
    /// fallback is transient per-call, per [`FallbackOutcome`].
    ///
    /// # Errors
    ///
    /// Returns [`FallbackExhausted`] if every candidate fails.
    pub async fn complete(&self, request: CompletionRequest) -> Result<FallbackOutcome, FallbackExhausted> {
        let selection = self.current_selection();
        self.fallback.complete(&selection, request).await
    }

    /// The statically configured default/resting selection.
    pub fn default_spec(&self) -> &str {
        &self.default_spec
    }
}

/// Seam the orchestrator calls through without knowing about the manager,
/// fallback engine, or provider adapters underneath (§9 Design Notes: "the
/// orchestrator knows only an `LLMCallable`").
#[async_trait::async_trait]
pub trait LlmCallable: Send + Sync {
    /// Run one completion call, with resilient fallback applied transparently.
    ///
    /// # Errors
    ///
    /// Returns [`FallbackExhausted`] if every candidate fails.
    async fn complete(&self, request: CompletionRequest) -> Result<FallbackOutcome, FallbackExhausted>;
}

#[async_trait::async_trait]
impl LlmCallable for ModelManager {
    async fn complete(&self, request: CompletionRequest) -> Result<FallbackOutcome, FallbackExhausted> {
        ModelManager::complete(self, request).await
    }
}

/// RAII guard restoring the pre-route model selection when a turn ends,
/// regardless of how it ended (§4.4).
pub struct RouteGuard {
    manager: Arc<ModelManager>,
    pre_route_state: String,
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        *self.manager.selection.write().expect("selection lock poisoned") =
            std::mem::take(&mut self.pre_route_state);
    }
}

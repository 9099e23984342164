//! Integration tests driving `Orchestrator::speak` end to end: tool-name
//! resolution, the anti-spin guardrails, and turn-level abort messages, all
//! observed the way a caller would — through the returned answer and history.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use wintermute::agent::checkpoint::CheckpointStore;
use wintermute::agent::cost_log::NullCostRecorder;
use wintermute::agent::orchestrator::{Orchestrator, OrchestratorConfig, SessionState};
use wintermute::agent::trace::{BufferingTraceSink, NullTypingSink};
use wintermute::model_manager::ModelManager;
use wintermute::providers::fallback::FallbackEngine;
use wintermute::providers::health::CooldownOverrides;
use wintermute::providers::router::ModelRouter;
use wintermute::providers::{CompletionRequest, CompletionResponse, ContentPart, LlmProvider, MessageContent, ProviderError, Role, StopReason, UsageStats};
use wintermute::tools::builtin::{CalculatorTool, CurrentTimeTool};
use wintermute::tools::dispatch::CIRCUIT_BREAKER_THRESHOLD;
use wintermute::tools::registry::ToolRegistry;
use wintermute::tools::{Tool, ToolError, ToolObservation};

struct ScriptedProvider {
    replies: Mutex<Vec<&'static str>>,
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let mut replies = self.replies.lock().expect("lock poisoned");
        let text = if replies.is_empty() { "done" } else { replies.remove(0) };
        Ok(CompletionResponse {
            content: vec![ContentPart::Text { text: text.to_owned() }],
            stop_reason: StopReason::EndTurn,
            usage: UsageStats { input_tokens: 1, output_tokens: 1 },
            model: "scripted".to_owned(),
        })
    }
    fn supports_tool_calling(&self) -> bool {
        false
    }
    fn supports_streaming(&self) -> bool {
        false
    }
    fn model_id(&self) -> &str {
        "scripted"
    }
}

struct AlwaysFailsTool {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for AlwaysFailsTool {
    fn name(&self) -> &str {
        "failer"
    }
    fn definition(&self) -> wintermute::providers::ToolDefinition {
        wintermute::providers::ToolDefinition { name: "failer".to_owned(), description: String::new(), input_schema: json!({}) }
    }
    async fn call(&self, _args: &Value) -> Result<ToolObservation, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ToolError::ExecutionFailed("always fails".to_owned()))
    }
}

struct AlwaysSucceedsTool {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for AlwaysSucceedsTool {
    fn name(&self) -> &str {
        "repeater"
    }
    fn definition(&self) -> wintermute::providers::ToolDefinition {
        wintermute::providers::ToolDefinition { name: "repeater".to_owned(), description: String::new(), input_schema: json!({}) }
    }
    async fn call(&self, _args: &Value) -> Result<ToolObservation, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ToolObservation::text("ok"))
    }
}

fn manager_with_replies(replies: Vec<&'static str>) -> Arc<ModelManager> {
    let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider { replies: Mutex::new(replies) });
    let router = ModelRouter::for_testing("test/scripted".to_owned(), provider);
    let fallback = Arc::new(FallbackEngine::new(Arc::new(router), vec![], CooldownOverrides::new()));
    Arc::new(ModelManager::new("test/scripted".to_owned(), Default::default(), fallback, false))
}

fn orchestrator(model_manager: Arc<ModelManager>, tools: Arc<ToolRegistry>, checkpoints_dir: &std::path::Path, max_turns: u32) -> Orchestrator {
    let config = OrchestratorConfig {
        max_turns,
        speak_timeout: Duration::from_secs(5),
        wall_clock_timeout: Duration::from_secs(5),
        personality: "You are terse.".to_owned(),
        tool_timeouts: HashMap::new(),
    };
    Orchestrator::new(
        model_manager,
        tools,
        Arc::new(BufferingTraceSink::new()),
        Arc::new(NullTypingSink),
        Arc::new(CheckpointStore::new(checkpoints_dir.to_path_buf())),
        Arc::new(NullCostRecorder),
        config,
    )
}

fn tool_result_texts(history: &[wintermute::providers::Message]) -> Vec<(String, bool)> {
    history
        .iter()
        .filter(|m| m.role == Role::Tool)
        .flat_map(|m| match &m.content {
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ToolResult { content, is_error, .. } => Some((content.clone(), *is_error)),
                    _ => None,
                })
                .collect::<Vec<_>>(),
            MessageContent::Text(_) => vec![],
        })
        .collect()
}

#[tokio::test]
async fn an_unresolvable_tool_name_surfaces_the_available_tools_list() {
    let manager = manager_with_replies(vec![r#"{"tool": "totally_bogus", "args": {}}"#, "giving up"]);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CurrentTimeTool));
    registry.register(Arc::new(CalculatorTool));
    let dir = tempfile::tempdir().expect("tempdir");
    let session_orchestrator = orchestrator(manager, Arc::new(registry), dir.path(), 10);

    let result = session_orchestrator
        .speak("unknown-tool", SessionState::default(), "do something odd", vec![], None, None, CancellationToken::new())
        .await;

    assert_eq!(result.answer, "giving up");
    let results = tool_result_texts(&result.session.history);
    let (message, is_error) = results.first().expect("a tool-result message should have been recorded");
    assert!(*is_error);
    assert!(message.starts_with("unknown tool; available tools include "));
    assert!(message.contains("current_time"));
    assert!(message.contains("calculator"));
}

#[tokio::test]
async fn a_differently_cased_tool_name_still_resolves_and_runs() {
    let manager = manager_with_replies(vec![r#"{"tool": "Current-Time", "args": {}}"#, "final answer"]);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CurrentTimeTool));
    let dir = tempfile::tempdir().expect("tempdir");
    let session_orchestrator = orchestrator(manager, Arc::new(registry), dir.path(), 10);

    let result = session_orchestrator
        .speak("fuzzy-match", SessionState::default(), "what time is it", vec![], None, None, CancellationToken::new())
        .await;

    assert_eq!(result.answer, "final answer");
    let results = tool_result_texts(&result.session.history);
    let (_, is_error) = results.first().expect("the fuzzy-matched tool should have run and recorded a result");
    assert!(!is_error, "a resolved tool call should not be reported as the unknown-tool error");
}

#[tokio::test]
async fn the_third_consecutive_tool_failure_trips_the_breaker_without_a_fourth_attempt() {
    let calls = Arc::new(AtomicUsize::new(0));
    let replies = vec![
        r#"{"tool": "failer", "args": {"n": 1}}"#,
        r#"{"tool": "failer", "args": {"n": 2}}"#,
        r#"{"tool": "failer", "args": {"n": 3}}"#,
        r#"{"tool": "failer", "args": {"n": 4}}"#,
    ];
    let manager = manager_with_replies(replies);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(AlwaysFailsTool { calls: Arc::clone(&calls) }));
    let dir = tempfile::tempdir().expect("tempdir");
    let session_orchestrator = orchestrator(manager, Arc::new(registry), dir.path(), 10);

    let result = session_orchestrator
        .speak("breaker", SessionState::default(), "keep trying", vec![], None, None, CancellationToken::new())
        .await;

    assert!(result.answer.contains("repeated tool failures"));
    assert_eq!(calls.load(Ordering::SeqCst), usize::try_from(CIRCUIT_BREAKER_THRESHOLD).expect("fits usize"));
}

#[tokio::test]
async fn six_calls_to_the_same_tool_in_the_window_trigger_a_nudge_not_an_abort() {
    let calls = Arc::new(AtomicUsize::new(0));
    let replies = vec![
        r#"{"tool": "repeater", "args": {"n": 1}}"#,
        r#"{"tool": "repeater", "args": {"n": 2}}"#,
        r#"{"tool": "repeater", "args": {"n": 3}}"#,
        r#"{"tool": "repeater", "args": {"n": 4}}"#,
        r#"{"tool": "repeater", "args": {"n": 5}}"#,
        r#"{"tool": "repeater", "args": {"n": 6}}"#,
        "done after the nudge",
    ];
    let manager = manager_with_replies(replies);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(AlwaysSucceedsTool { calls: Arc::clone(&calls) }));
    let dir = tempfile::tempdir().expect("tempdir");
    let session_orchestrator = orchestrator(manager, Arc::new(registry), dir.path(), 20);

    let result = session_orchestrator
        .speak("repetition", SessionState::default(), "loop it", vec![], None, None, CancellationToken::new())
        .await;

    assert_eq!(result.answer, "done after the nudge");
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    let nudged = result.session.history.iter().any(|m| {
        matches!(&m.content, MessageContent::Text(text) if text.contains("Try a different approach."))
    });
    assert!(nudged, "the repetition guard should have appended its nudge message");
}

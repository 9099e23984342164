//! ReAct Orchestrator: the central think/tool-call/observe loop (§4.7).
//!
//! One call to [`Orchestrator::speak`] accepts a user turn and returns the
//! final answer, having appended exactly one final assistant message (or an
//! abort message) to the returned history. The loop itself may run several
//! internal LLM/tool iterations before that happens.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::agent::checkpoint::{Checkpoint, CheckpointStore, PlanSnapshot};
use crate::agent::cost_log::CostRecorder;
use crate::agent::planner::{self, PlannerError};
use crate::agent::prompt::assemble_system_prompt;
use crate::agent::trace::{TraceEvent, TracePhase, TraceSink, TypingSink};
use crate::config::{AgentLoopConfig, PersonalityConfig};
use crate::model_manager::{ModelManager, TaskType};
use crate::providers::{CompletionRequest, ContentPart, Message, MessageContent, Role};
use crate::tools::dispatch::{self, DispatchOutcome, DispatchState};
use crate::tools::extractor::extract_tool_call;
use crate::tools::registry::ToolRegistry;

/// Tool names exempt from the repetition guard (mirrors the duplicate-call
/// allow-list; read-only/idempotent tools are expected to be called often).
const REPETITION_ALLOW_LIST: &[&str] = dispatch::DUPLICATE_GUARD_ALLOW_LIST;

/// Write a checkpoint after this many tool calls within a turn, in addition
/// to writing one immediately after any tool failure (§4.7 Loop step 11).
const CHECKPOINT_EVERY_N_TOOL_CALLS: u32 = 5;

/// Configuration an [`Orchestrator`] runs under, derived from [`AgentLoopConfig`]
/// and [`PersonalityConfig`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum loop iterations before forced termination (default 50, §4.7).
    pub max_turns: u32,
    /// Per-provider-call timeout.
    pub speak_timeout: Duration,
    /// Wall-clock budget for the entire turn (default 600s, §4.7).
    pub wall_clock_timeout: Duration,
    /// Personality/identity text folded into the system prompt.
    pub personality: String,
    /// Per-tool timeout overrides.
    pub tool_timeouts: HashMap<String, Duration>,
}

impl OrchestratorConfig {
    /// Build from the loaded config sections.
    pub fn from_config(agent: &AgentLoopConfig, personality: &PersonalityConfig) -> Self {
        let tool_timeouts = agent
            .tool_timeouts
            .iter()
            .map(|(name, secs)| (name.clone(), Duration::from_secs(*secs)))
            .collect();
        Self {
            max_turns: agent.max_turns,
            speak_timeout: Duration::from_secs(agent.speak_timeout),
            wall_clock_timeout: Duration::from_secs(agent.wall_clock_timeout),
            personality: personality.soul.clone(),
            tool_timeouts,
        }
    }
}

/// One session's worth of state carried across calls to [`Orchestrator::speak`].
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Full conversation history.
    pub history: Vec<Message>,
    /// Active plan, if the planner has run and not yet been cleared.
    pub plan: Option<PlanSnapshot>,
}

/// The result of one `speak` call.
#[derive(Debug)]
pub struct SpeakResult {
    /// The final answer text (or an abort/timeout/cancellation message).
    pub answer: String,
    /// Updated session state — feed this back into the next call.
    pub session: SessionState,
}

/// An inline image attached to a user turn (§3 Message).
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    /// MIME type, e.g. `"image/png"`.
    pub media_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

enum LoopExit {
    FinalAnswer(String),
    MaxTurnsExhausted,
    CircuitBreakerTripped,
}

/// Drives the ReAct loop over a model, a tool registry, and a checkpoint/trace sink.
pub struct Orchestrator {
    model_manager: Arc<ModelManager>,
    tools: Arc<ToolRegistry>,
    trace_sink: Arc<dyn TraceSink>,
    typing_sink: Arc<dyn TypingSink>,
    checkpoints: Arc<CheckpointStore>,
    cost_recorder: Arc<dyn CostRecorder>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Build an orchestrator over the given collaborators.
    pub fn new(
        model_manager: Arc<ModelManager>,
        tools: Arc<ToolRegistry>,
        trace_sink: Arc<dyn TraceSink>,
        typing_sink: Arc<dyn TypingSink>,
        checkpoints: Arc<CheckpointStore>,
        cost_recorder: Arc<dyn CostRecorder>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { model_manager, tools, trace_sink, typing_sink, checkpoints, cost_recorder, config }
    }

    /// Run one user turn to completion (§4.7).
    ///
    /// `session_id` doubles as the checkpoint/trace correlation id.
    /// `api_key_for_masking` is only ever used to compute a masked suffix
    /// for checkpoints — the full key is never stored.
    pub async fn speak(
        &self,
        session_id: &str,
        mut session: SessionState,
        user_text: &str,
        images: Vec<ImageAttachment>,
        extra_context: Option<&str>,
        api_key_for_masking: Option<&str>,
        cancel: CancellationToken,
    ) -> SpeakResult {
        self.trace_sink.emit(TraceEvent::new(TracePhase::SessionStart, 0, session_id));

        // Setup: append the user message (multimodal if images were attached).
        session.history.push(user_message(user_text, images));

        // Snapshot the pre-turn model selection; restored unconditionally
        // on every exit path via this guard's Drop impl (§4.4, §4.7 Finally).
        let _route_guard = self.model_manager.begin_turn(classify_task(user_text)).await;

        // Optionally invoke the planner.
        if planner::should_plan(user_text, session.plan.is_some()) {
            self.trace_sink.emit(TraceEvent::new(TracePhase::PlanningStart, 0, session_id));
            match planner::generate_plan(self.model_manager.as_ref(), user_text).await {
                Ok(plan) => {
                    let payload = serde_json::json!({"steps": plan.steps.len()});
                    self.trace_sink.emit(TraceEvent::with_payload(TracePhase::PlanGenerated, 0, session_id, payload));
                    session.plan = Some(plan);
                }
                Err(PlannerError::Timeout(_) | PlannerError::CallFailed(_)) => {
                    // Planning is best-effort; fall through without a plan.
                }
            }
        }

        let plan_context = session.plan.as_ref().map(|p| p.steps.join("\n"));
        let combined_context = match (extra_context, plan_context.as_deref()) {
            (Some(extra), Some(plan)) => Some(format!("{extra}\n\n{plan}")),
            (Some(extra), None) => Some(extra.to_owned()),
            (None, Some(plan)) => Some(plan.to_owned()),
            (None, None) => None,
        };
        let system_prompt = assemble_system_prompt(&self.config.personality, &self.tools.definitions(), combined_context.as_deref());

        let mut dispatch_state = DispatchState::new();
        let loop_future = self.run_loop(session_id, &mut session.history, &system_prompt, &mut dispatch_state, api_key_for_masking);

        let answer = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let message = "[ABORT] cancelled by user.".to_owned();
                self.trace_sink.emit(TraceEvent::with_payload(
                    TracePhase::SessionAbort, 0, session_id, serde_json::json!({"reason": "user_cancelled"}),
                ));
                message
            }
            result = tokio::time::timeout(self.config.wall_clock_timeout, loop_future) => {
                match result {
                    Ok(LoopExit::FinalAnswer(text)) => text,
                    Ok(LoopExit::MaxTurnsExhausted) => {
                        let message = format!("[ABORT] reached the maximum of {} turns without a final answer.", self.config.max_turns);
                        self.trace_sink.emit(TraceEvent::new(TracePhase::SessionAbort, 0, session_id));
                        message
                    }
                    Ok(LoopExit::CircuitBreakerTripped) => {
                        let message = "[ABORT] repeated tool failures; stopping.".to_owned();
                        self.trace_sink.emit(TraceEvent::new(TracePhase::SessionAbort, 0, session_id));
                        message
                    }
                    Err(_elapsed) => {
                        let message = format!("[ABORT] timed out after {:?} without a final answer.", self.config.wall_clock_timeout);
                        self.trace_sink.emit(TraceEvent::with_payload(
                            TracePhase::SessionAbort, 0, session_id, serde_json::json!({"reason": "speak_timeout"}),
                        ));
                        message
                    }
                }
            }
        };

        session.history.push(Message { role: Role::Assistant, content: MessageContent::Text(answer.clone()) });

        // Finally block: `_route_guard` drops here, restoring the pre-turn
        // model selection regardless of which exit path was taken.
        SpeakResult { answer, session }
    }

    async fn run_loop(
        &self,
        session_id: &str,
        history: &mut Vec<Message>,
        system_prompt: &str,
        dispatch_state: &mut DispatchState,
        api_key_for_masking: Option<&str>,
    ) -> LoopExit {
        let half_turn = self.config.max_turns.checked_div(2).unwrap_or(u32::MAX);
        let eighty_turn = self
            .config
            .max_turns
            .checked_mul(4)
            .and_then(|v| v.checked_div(5))
            .unwrap_or(u32::MAX);

        let mut turn: u32 = 0;
        let mut tool_calls_this_speak: u32 = 0;

        loop {
            turn = turn.saturating_add(1);
            if turn > self.config.max_turns {
                return LoopExit::MaxTurnsExhausted;
            }
            self.trace_sink.emit(TraceEvent::new(TracePhase::TurnStart, turn, session_id));

            if turn == half_turn {
                history.push(nudge_message("We're over halfway through the available turns — start wrapping up."));
            } else if turn == eighty_turn {
                history.push(nudge_message("Give your final answer now."));
            }

            self.typing_sink.ping(session_id);

            let request = CompletionRequest {
                messages: history.clone(),
                system: Some(system_prompt.to_owned()),
                tools: self.tools.definitions(),
                max_tokens: None,
                stop_sequences: vec![],
            };

            let outcome = match tokio::time::timeout(self.config.speak_timeout, self.model_manager.complete(request)).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_exhausted)) => {
                    history.push(nudge_message("[LLM Error] every provider failed; try again or rephrase."));
                    continue;
                }
                Err(_elapsed) => {
                    history.push(nudge_message("[LLM Timeout] the model did not respond in time."));
                    continue;
                }
            };

            if outcome.fell_back {
                let payload = serde_json::json!({"served_by": outcome.served_by});
                self.trace_sink.emit(TraceEvent::with_payload(TracePhase::ModelFallback, turn, session_id, payload));
            }

            let provider_id = outcome.served_by.split('/').next().unwrap_or(&outcome.served_by);
            self.cost_recorder.record(
                chrono::Utc::now(),
                &outcome.response.model,
                provider_id,
                outcome.response.usage.input_tokens,
                outcome.response.usage.output_tokens,
            );

            let raw_text = outcome.response.content.iter().filter_map(text_of).collect::<Vec<_>>().join("");
            let (visible_text, thinking) = strip_think_span(&raw_text);

            if let Some(thought) = thinking {
                let payload = serde_json::json!({"content": crate::agent::trace::clamp(&thought, crate::agent::trace::MAX_SNIPPET_CHARS)});
                self.trace_sink.emit(TraceEvent::with_payload(TracePhase::Thinking, turn, session_id, payload));
            }
            let response_payload = serde_json::json!({
                "content": crate::agent::trace::clamp(&raw_text, crate::agent::trace::MAX_RESPONSE_CHARS),
            });
            self.trace_sink.emit(TraceEvent::with_payload(TracePhase::LlmResponse, turn, session_id, response_payload));

            let known = |name: &str| self.tools.has(name);
            match extract_tool_call(&visible_text, &known) {
                None => {
                    history.push(Message { role: Role::Assistant, content: MessageContent::Text(visible_text.clone()) });
                    let payload = serde_json::json!({
                        "content": crate::agent::trace::clamp(&visible_text, crate::agent::trace::MAX_RESPONSE_CHARS),
                    });
                    self.trace_sink.emit(TraceEvent::with_payload(TracePhase::FinalAnswer, turn, session_id, payload));
                    return LoopExit::FinalAnswer(visible_text);
                }
                Some(call) => {
                    // Keep the original raw form in history so tool-call JSON is preserved.
                    history.push(Message { role: Role::Assistant, content: MessageContent::Text(raw_text.clone()) });

                    let Some(tool_name) = fuzzy_match_tool_name(&call.tool, &self.tools) else {
                        self.trace_sink.emit(TraceEvent::new(TracePhase::ToolNotFound, turn, session_id));
                        history.push(tool_result_message(&call.tool, &unknown_tool_message(&self.tools), true));
                        continue;
                    };
                    let payload = serde_json::json!({"tool": tool_name, "args": call.args});
                    self.trace_sink.emit(TraceEvent::with_payload(TracePhase::ToolCall, turn, session_id, payload));

                    let timeout_override = self.config.tool_timeouts.get(&tool_name).copied();
                    let dispatch_outcome =
                        dispatch::dispatch(&self.tools, dispatch_state, &tool_name, &call.args, timeout_override).await;

                    match dispatch_outcome {
                        DispatchOutcome::DuplicateBlocked => {
                            self.trace_sink.emit(TraceEvent::new(TracePhase::DuplicateBlocked, turn, session_id));
                            history.push(nudge_message("[Tool Error] duplicate call blocked; try something different."));
                        }
                        DispatchOutcome::ToolNotFound => {
                            self.trace_sink.emit(TraceEvent::new(TracePhase::ToolNotFound, turn, session_id));
                            history.push(tool_result_message(&tool_name, &unknown_tool_message(&self.tools), true));
                        }
                        DispatchOutcome::CircuitBreakerTripped => {
                            self.trace_sink.emit(TraceEvent::new(TracePhase::CircuitBreaker, turn, session_id));
                            history.push(nudge_message("[ABORT] stop calling tools, explain the failure to the user."));
                            return LoopExit::CircuitBreakerTripped;
                        }
                        DispatchOutcome::Ran(result) => {
                            tool_calls_this_speak = tool_calls_this_speak.saturating_add(1);
                            let failed = result.is_err();
                            history.push(tool_outcome_message(&tool_name, result));
                            self.trace_sink.emit(TraceEvent::new(TracePhase::ToolResult, turn, session_id));
                            self.maybe_checkpoint(
                                session_id, history, dispatch_state, turn, tool_calls_this_speak, failed, api_key_for_masking,
                            );
                        }
                        DispatchOutcome::RepetitionGuard { result } => {
                            tool_calls_this_speak = tool_calls_this_speak.saturating_add(1);
                            let failed = result.is_err();
                            history.push(tool_outcome_message(&tool_name, result));
                            self.trace_sink.emit(TraceEvent::new(TracePhase::ToolResult, turn, session_id));
                            if !REPETITION_ALLOW_LIST.contains(&tool_name.as_str()) {
                                self.trace_sink.emit(TraceEvent::new(TracePhase::RepetitionGuard, turn, session_id));
                                history.push(nudge_message("Try a different approach."));
                            }
                            self.maybe_checkpoint(
                                session_id, history, dispatch_state, turn, tool_calls_this_speak, failed, api_key_for_masking,
                            );
                        }
                    }
                }
            }
        }
    }

    fn maybe_checkpoint(
        &self,
        session_id: &str,
        history: &[Message],
        dispatch_state: &DispatchState,
        turn: u32,
        tool_calls_this_speak: u32,
        failed: bool,
        api_key_for_masking: Option<&str>,
    ) {
        let due = failed || tool_calls_this_speak.checked_rem(CHECKPOINT_EVERY_N_TOOL_CALLS) == Some(0);
        if !due {
            return;
        }
        let checkpoint = Checkpoint::new(
            session_id.to_owned(),
            history.to_vec(),
            None,
            turn,
            api_key_for_masking,
            session_id.to_owned(),
            dispatch_state.recent_tools_snapshot(),
            dispatch_state.consecutive_failures(),
        );
        let _ = self.checkpoints.write(&checkpoint);
    }
}

fn user_message(text: &str, images: Vec<ImageAttachment>) -> Message {
    if images.is_empty() {
        return Message { role: Role::User, content: MessageContent::Text(text.to_owned()) };
    }
    let mut parts = vec![ContentPart::Text { text: text.to_owned() }];
    parts.extend(images.into_iter().map(|img| ContentPart::Image { media_type: img.media_type, data: img.data }));
    Message { role: Role::User, content: MessageContent::Parts(parts) }
}

fn nudge_message(text: &str) -> Message {
    Message { role: Role::User, content: MessageContent::Text(text.to_owned()) }
}

fn tool_result_message(tool_name: &str, content: &str, is_error: bool) -> Message {
    Message {
        role: Role::Tool,
        content: MessageContent::Parts(vec![ContentPart::ToolResult {
            tool_use_id: tool_name.to_owned(),
            content: content.to_owned(),
            is_error,
        }]),
    }
}

fn tool_outcome_message(tool_name: &str, result: Result<crate::tools::ToolObservation, crate::tools::ToolError>) -> Message {
    match result {
        Ok(observation) => {
            let mut parts = Vec::new();
            for part in &observation.parts {
                match part {
                    crate::tools::ToolObservationPart::Text(text) => {
                        parts.push(ContentPart::ToolResult { tool_use_id: tool_name.to_owned(), content: text.clone(), is_error: false });
                    }
                    crate::tools::ToolObservationPart::Image { media_type, data } => {
                        parts.push(ContentPart::Image { media_type: media_type.clone(), data: data.clone() });
                    }
                }
            }
            if parts.is_empty() {
                parts.push(ContentPart::ToolResult { tool_use_id: tool_name.to_owned(), content: String::new(), is_error: false });
            }
            Message { role: Role::Tool, content: MessageContent::Parts(parts) }
        }
        Err(error) => tool_result_message(tool_name, &error.to_string(), true),
    }
}

fn text_of(part: &ContentPart) -> Option<&str> {
    match part {
        ContentPart::Text { text } => Some(text.as_str()),
        _ => None,
    }
}

/// Strip the first `<think>...</think>` span, returning `(visible, thought)`.
fn strip_think_span(raw: &str) -> (String, Option<String>) {
    let Some(start) = raw.find("<think>") else {
        return (raw.to_owned(), None);
    };
    let Some(end_rel) = raw[start..].find("</think>") else {
        return (raw.to_owned(), None);
    };
    let end = start + end_rel + "</think>".len();
    let thought = raw[start + "<think>".len()..start + end_rel].to_owned();
    let visible = format!("{}{}", &raw[..start], &raw[end..]);
    (visible.trim().to_owned(), Some(thought))
}

/// Lightweight keyword heuristic for smart-routing task classification.
/// Not spec-mandated; absent a classifier, `None` leaves the default
/// selection untouched regardless of smart-routing being enabled.
fn classify_task(text: &str) -> Option<TaskType> {
    let lower = text.to_lowercase();
    if lower.contains("code") || lower.contains("function") || lower.contains("refactor") {
        Some(TaskType::Coding)
    } else if lower.contains("image") || lower.contains("picture") || lower.contains("photo") {
        Some(TaskType::Vision)
    } else if lower.contains("calculate") || lower.contains("equation") {
        Some(TaskType::Math)
    } else {
        None
    }
}

/// Resolve a model-emitted tool name against the registry: exact match,
/// then normalized (dots/dashes to underscores, lowercased) match, then a
/// unique normalized-prefix match (e.g. `navigate` -> `browser_navigate`).
/// Returns `None` when none of the three steps resolves to exactly one
/// registered tool (§4.5 step 1).
fn fuzzy_match_tool_name(name: &str, registry: &ToolRegistry) -> Option<String> {
    if registry.has(name) {
        return Some(name.to_owned());
    }
    let normalized = normalize_tool_name(name);
    if let Some(exact) = registry.names().into_iter().find(|candidate| normalize_tool_name(candidate) == normalized) {
        return Some(exact.to_owned());
    }
    let mut prefix_matches = registry
        .names()
        .into_iter()
        .filter(|candidate| normalize_tool_name(candidate).starts_with(&normalized));
    match (prefix_matches.next(), prefix_matches.next()) {
        (Some(only), None) => Some(only.to_owned()),
        _ => None,
    }
}

/// Lowercase, dots/dashes to underscores (§4.5 step 1's normalization rule).
fn normalize_tool_name(name: &str) -> String {
    name.to_lowercase().replace(['-', '.'], "_")
}

/// The "unknown tool" observation for a name that resolved to nothing,
/// listing up to the first 20 registered tool names (§4.5 step 1).
fn unknown_tool_message(registry: &ToolRegistry) -> String {
    let mut names = registry.names();
    names.sort_unstable();
    names.truncate(20);
    format!("unknown tool; available tools include {}", names.join(", "))
}

//! Planner sub-agent (§4.8).
//!
//! Triggered when the input begins with an explicit plan directive or
//! contains intent keywords (refactor/build/implement/etc.) and no active
//! plan exists. Runs an isolated, single completion call — no recursion into
//! the orchestrator, no tool calling, a strict wall-clock timeout — and
//! parses `<plan>…</plan>` tags into a numbered step list.

use std::time::Duration;

use crate::agent::checkpoint::PlanSnapshot;
use crate::model_manager::LlmCallable;
use crate::providers::{CompletionRequest, ContentPart, Message, MessageContent, Role};

/// Wall-clock timeout for a planner invocation (§4.8).
pub const PLANNER_TIMEOUT: Duration = Duration::from_secs(300);

/// Keywords whose presence in the input suggests multi-step work that
/// benefits from an upfront plan (§4.8).
const INTENT_KEYWORDS: &[&str] = &["refactor", "build", "implement", "migrate", "design"];

/// Explicit plan-directive prefix a user can type to force planning.
const PLAN_DIRECTIVE_PREFIX: &str = "/plan";

/// Whether `input` should trigger the planner, given whether a plan is
/// already active for this session.
pub fn should_plan(input: &str, has_active_plan: bool) -> bool {
    if has_active_plan {
        return false;
    }
    let lower = input.to_lowercase();
    lower.starts_with(PLAN_DIRECTIVE_PREFIX) || INTENT_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// System context instructing the planner to investigate and emit a
/// `<plan>…</plan>`-wrapped numbered list (§4.8).
const PLANNER_SYSTEM_PROMPT: &str = "\
You are a planning assistant. Investigate the request (consider what files, \
directories, or context would need to be examined) and produce an ordered \
plan. Respond with your plan as a numbered list wrapped in literal \
<plan>...</plan> tags, with nothing else outside the tags.";

/// Errors from a planner invocation.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// The underlying LLM call failed outright.
    #[error("planner LLM call failed: {0}")]
    CallFailed(String),
    /// The call did not complete within [`PLANNER_TIMEOUT`].
    #[error("planner timed out after {0:?}")]
    Timeout(Duration),
}

/// Run the planner in isolation and return the parsed plan.
///
/// `original_query` is the triggering user input. The call uses an empty
/// history (§4.8: "isolated mode: empty history") and never recurses.
///
/// # Errors
///
/// Returns [`PlannerError`] if the call fails or times out.
pub async fn generate_plan(
    llm: &dyn LlmCallable,
    original_query: &str,
) -> Result<PlanSnapshot, PlannerError> {
    let request = CompletionRequest {
        messages: vec![Message { role: Role::User, content: MessageContent::Text(original_query.to_owned()) }],
        system: Some(PLANNER_SYSTEM_PROMPT.to_owned()),
        tools: vec![],
        max_tokens: Some(1024),
        stop_sequences: vec![],
    };

    let outcome = tokio::time::timeout(PLANNER_TIMEOUT, llm.complete(request))
        .await
        .map_err(|_| PlannerError::Timeout(PLANNER_TIMEOUT))?
        .map_err(|e| PlannerError::CallFailed(e.to_string()))?;

    let raw: String = outcome
        .response
        .content
        .iter()
        .filter_map(|p| match p {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    let steps = parse_plan(&raw);
    Ok(PlanSnapshot { steps, current_index: 0, original_query: original_query.to_owned() })
}

/// Parse a `<plan>…</plan>`-wrapped numbered list; fall back to splitting
/// the raw text into non-empty lines if the tags are absent or malformed.
fn parse_plan(raw: &str) -> Vec<String> {
    let inner = match (raw.find("<plan>"), raw.find("</plan>")) {
        (Some(start), Some(end)) if end > start => &raw[start + "<plan>".len()..end],
        _ => raw,
    };

    inner
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(strip_numbering)
        .map(str::to_owned)
        .collect()
}

/// Strip a leading `"1. "`/`"1) "`/`"- "` list marker, if present.
fn strip_numbering(line: &str) -> &str {
    let without_bullet = line.strip_prefix("- ").unwrap_or(line);
    let Some(dot_or_paren) = without_bullet.find(['.', ')']) else { return without_bullet };
    let (prefix, rest) = without_bullet.split_at(dot_or_paren);
    if prefix.chars().all(|c| c.is_ascii_digit()) && !prefix.is_empty() {
        rest[1..].trim_start()
    } else {
        without_bullet
    }
}

//! System prompt assembly (§4.7 Setup).
//!
//! Built fresh every turn from: personality text, the full tool-schema JSON,
//! a few literal tool-call examples, and the tool-use protocol rules. The
//! system message is never stored in conversation history (§3).

use crate::providers::ToolDefinition;

/// Tool-use protocol rules, verbatim: raw JSON only, no fences, no prose
/// around the JSON, a bounded tool chain, and no duplicate calls (§4.7).
const PROTOCOL_RULES: &str = "\
When you need a tool, respond with exactly one raw JSON object of the form \
{\"tool\": \"<name>\", \"args\": {...}} — no markdown fences, no prose before \
or after it. Do not call more than 10 tools in a single turn. Never repeat \
an identical tool call (same name, same arguments) back to back. When you \
have the information you need, respond with your final answer in plain \
text and no tool call.";

/// Literal, schema-valid tool-call examples shown to the model as few-shot
/// context (§4.7 Setup).
const TOOL_CALL_EXAMPLES: &str = "\
Example tool call: {\"tool\": \"current_time\", \"args\": {}}
Example tool call with arguments: {\"tool\": \"calculator\", \"args\": {\"expression\": \"2 + 2\"}}";

/// Assemble the system prompt for one turn.
///
/// `extra_context` carries planner output or other supplemental context
/// (§4.7 Setup: "attach it to the prompt as context"), when present.
pub fn assemble_system_prompt(personality: &str, tools: &[ToolDefinition], extra_context: Option<&str>) -> String {
    let mut sections = Vec::new();

    if !personality.is_empty() {
        sections.push(personality.to_owned());
    }

    if let Some(context) = extra_context {
        sections.push(format!("Context:\n{context}"));
    }

    let schema = serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_owned());
    sections.push(format!("Available tools (JSON Schema):\n{schema}"));

    sections.push(TOOL_CALL_EXAMPLES.to_owned());
    sections.push(PROTOCOL_RULES.to_owned());

    sections.join("\n\n")
}

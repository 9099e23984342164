//! Tool-call extraction from raw LLM text (§4.6).
//!
//! Providers without native tool calling emit a JSON object embedded in
//! prose. The extractor strips `<think>` blocks, prefers a fenced code
//! block if present, then scans for balanced `{...}` substrings via
//! brace-matching (not regex — nested braces in arguments would break a
//! regex) and tries each of four schemas in order, last-completed
//! candidate first (a model that second-guesses itself usually means the
//! final object is the intended call).

use serde_json::Value;

/// A tool call extracted from raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCall {
    /// Tool name.
    pub tool: String,
    /// Tool arguments.
    pub args: Value,
}

/// Extract a tool call from raw LLM output, trying the extraction pipeline
/// described in §4.6. Returns `None` if no candidate matched any schema.
pub fn extract_tool_call(raw: &str, known_tools: &dyn Fn(&str) -> bool) -> Option<ExtractedCall> {
    let stripped = strip_think_blocks(raw);
    let search_text = fenced_block(&stripped).unwrap_or(stripped.clone());

    for candidate in balanced_brace_candidates(&search_text) {
        if let Some(call) = try_schemas(&candidate, known_tools) {
            return Some(call);
        }
    }
    None
}

/// Remove every `<think>...</think>` span, including the tags.
fn strip_think_blocks(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    loop {
        match rest.find("<think>") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                match rest[start..].find("</think>") {
                    Some(end_rel) => {
                        let end = start + end_rel + "</think>".len();
                        rest = &rest[end..];
                    }
                    None => break, // unterminated; drop the rest
                }
            }
        }
    }
    out
}

/// Prefer the contents of a fenced ``` or ```json block if one is present.
fn fenced_block(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after_open = &text[start + 3..];
    let after_open = after_open.strip_prefix("json").unwrap_or(after_open);
    let after_open = after_open.strip_prefix('\n').unwrap_or(after_open);
    let end = after_open.find("```")?;
    Some(after_open[..end].to_owned())
}

/// Enumerate every balanced `{...}` substring via a brace-matching scan,
/// then reverse so the last-appearing candidate is tried first.
fn balanced_brace_candidates(text: &str) -> Vec<String> {
    let bytes: Vec<char> = text.chars().collect();
    let mut candidates = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == '{' {
            if let Some(end) = matching_brace_end(&bytes, i) {
                let candidate: String = bytes[i..=end].iter().collect();
                candidates.push(candidate);
            }
        }
        i += 1;
    }
    candidates.reverse();
    candidates
}

/// Find the index of the `}` matching the `{` at `start`, respecting string
/// literals so braces inside quoted JSON strings don't confuse the scan.
fn matching_brace_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &ch) in chars.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Try each of the four recognized JSON schemas against one candidate
/// substring, in the fixed order from §4.6 step 4.
fn try_schemas(candidate: &str, known_tools: &dyn Fn(&str) -> bool) -> Option<ExtractedCall> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    let object = value.as_object()?;

    // Canonical: {tool, args}
    if let Some(tool) = object.get("tool").and_then(Value::as_str) {
        let args = object.get("args").cloned().unwrap_or(Value::Object(serde_json::Map::new()));
        return Some(ExtractedCall { tool: tool.to_owned(), args });
    }

    // LangChain-style: {action, action_input}
    if let Some(action) = object.get("action").and_then(Value::as_str) {
        let args = object.get("action_input").cloned().unwrap_or(Value::Object(serde_json::Map::new()));
        return Some(ExtractedCall { tool: action.to_owned(), args });
    }

    // {name, parameters} — name must be a registered tool, to avoid
    // matching unrelated JSON that happens to have a "name" field.
    if let Some(name) = object.get("name").and_then(Value::as_str) {
        if known_tools(name) {
            let args = object.get("parameters").cloned().unwrap_or(Value::Object(serde_json::Map::new()));
            return Some(ExtractedCall { tool: name.to_owned(), args });
        }
    }

    // {function, arguments} — arguments may be a JSON-encoded string.
    if let Some(function) = object.get("function").and_then(Value::as_str) {
        let args = match object.get("arguments") {
            Some(Value::String(s)) => serde_json::from_str(s).unwrap_or(Value::String(s.clone())),
            Some(other) => other.clone(),
            None => Value::Object(serde_json::Map::new()),
        };
        return Some(ExtractedCall { tool: function.to_owned(), args });
    }

    None
}

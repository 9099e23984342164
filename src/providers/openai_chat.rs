//! OpenAI chat-completions wire family (§4.2): OpenAI, NVIDIA, Groq, Mistral,
//! Cerebras, OpenRouter, HuggingFace, Kimi, Z.ai, MiniMax, Ollama, xAI, and
//! any other provider whose `wire_family` is `openai-chat`.
//!
//! Provider-specific quirks (per-model thinking-mode parameters, streaming
//! opt-outs, OpenRouter's extra headers, Ollama's context trimming) are
//! data-driven through [`ProviderQuirks`] rather than branches per provider
//! id, per the Design Notes: "adding a model should not touch adapter code."

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;

use super::{
    check_http_response, CompletionRequest, CompletionResponse, ContentPart, LlmProvider,
    MessageContent, ProviderError, Role, StopReason, UsageStats,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_CONTEXT_WINDOW_TOKENS: usize = 32_000;
const CONTEXT_WINDOW_FRACTION: f64 = 0.8;
const CHARS_PER_TOKEN: usize = 4;
const STREAM_BATCH_SIZE: usize = 8;
const NVIDIA_COLD_START_RETRIES: u32 = 2;
const NVIDIA_COLD_START_SLEEP: Duration = Duration::from_secs(10);

/// Data-driven per-provider/per-model quirks (Design Notes §9).
#[derive(Debug, Clone, Default)]
pub struct ProviderQuirks {
    /// Provider id, e.g. `"openrouter"`, `"nvidia"`, `"ollama"`.
    pub provider_id: String,
    /// Extra JSON fields merged into the request body, keyed by model id
    /// (e.g. NVIDIA thinking-mode parameters).
    pub model_extras: HashMap<String, Value>,
    /// Models for which SSE streaming is known broken; force non-streaming.
    pub streaming_opt_out: Vec<String>,
    /// Whether this provider wants `HTTP-Referer`/`X-Title` (OpenRouter).
    pub send_openrouter_headers: bool,
    /// Enable context-window trimming by character-count heuristic (Ollama).
    pub context_window_trim: bool,
    /// Per-model context window override in tokens.
    pub context_windows: HashMap<String, usize>,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct WireRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
    pub stream: bool,
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: WireMessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WireMessageContent {
    Text(String),
    Parts(Vec<WireContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireContentPart {
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Serialize)]
pub struct WireImageUrl {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunction,
}

#[derive(Debug, Serialize)]
pub struct WireFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    model: Option<String>,
    usage: Option<WireUsage>,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct WireResponseMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireToolCallFunction,
}

#[derive(Debug, Deserialize)]
struct WireToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

// ---------------------------------------------------------------------------
// build_request / parse_response
// ---------------------------------------------------------------------------

/// Build the wire request body (§4.2). `stream` controls the SSE path.
pub fn build_request(
    model: &str,
    request: &CompletionRequest,
    quirks: &ProviderQuirks,
    stream: bool,
) -> WireRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(WireMessage {
            role: "system".to_owned(),
            content: WireMessageContent::Text(system.clone()),
        });
    }

    let trimmed = if quirks.context_window_trim {
        trim_to_context_window(&request.messages, context_window_tokens(model, quirks))
    } else {
        request.messages.clone()
    };

    for message in &trimmed {
        messages.push(WireMessage {
            role: map_role(message.role),
            content: map_content(&message.content),
        });
    }

    let mut extras = serde_json::Map::new();
    if let Some(model_extra) = quirks.model_extras.get(model) {
        if let Value::Object(map) = model_extra {
            extras.extend(map.clone());
        }
    }
    if quirks.send_openrouter_headers {
        // Headers, not body fields — handled by the HTTP layer; no-op here.
    }

    WireRequest {
        model: model.to_owned(),
        messages,
        max_tokens: request.max_tokens,
        stop: request.stop_sequences.clone(),
        tools: request
            .tools
            .iter()
            .map(|t| WireTool {
                kind: "function",
                function: WireFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect(),
        stream,
        extras,
    }
}

fn map_role(role: Role) -> String {
    match role {
        Role::System => "system".to_owned(),
        Role::User | Role::Tool => "user".to_owned(),
        Role::Assistant => "assistant".to_owned(),
    }
}

fn map_content(content: &MessageContent) -> WireMessageContent {
    match content {
        MessageContent::Text(text) => WireMessageContent::Text(text.clone()),
        MessageContent::Parts(parts) => WireMessageContent::Parts(
            parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(WireContentPart::Text { text: text.clone() }),
                    ContentPart::Image { media_type, data } => Some(WireContentPart::ImageUrl {
                        image_url: WireImageUrl {
                            url: format!("data:{media_type};base64,{data}"),
                        },
                    }),
                    ContentPart::ToolResult { content, .. } => {
                        Some(WireContentPart::Text { text: content.clone() })
                    }
                    ContentPart::ToolUse { .. } => None,
                })
                .collect(),
        ),
    }
}

/// Context window in tokens for `model`, honoring per-model overrides (§4.2).
fn context_window_tokens(model: &str, quirks: &ProviderQuirks) -> usize {
    quirks
        .context_windows
        .get(model)
        .copied()
        .unwrap_or(DEFAULT_CONTEXT_WINDOW_TOKENS)
}

/// Drop oldest non-system messages until the estimated token count (char
/// count / 4) fits within 80% of the context window (§4.2 Ollama trimming).
pub fn trim_to_context_window(
    messages: &[super::Message],
    context_window_tokens: usize,
) -> Vec<super::Message> {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let budget_chars = {
        let scaled = (context_window_tokens as f64) * CONTEXT_WINDOW_FRACTION;
        (scaled as usize).saturating_mul(CHARS_PER_TOKEN)
    };

    let mut kept: Vec<super::Message> = messages.to_vec();
    let mut total_chars: usize = kept.iter().map(|m| m.content.text().chars().count()).sum();

    let mut i = 0;
    while total_chars > budget_chars && i < kept.len() {
        if kept[i].role == Role::System {
            i += 1;
            continue;
        }
        total_chars = total_chars.saturating_sub(kept[i].content.text().chars().count());
        kept.remove(i);
    }

    kept
}

/// Parse a non-streaming response body (§4.2).
///
/// Native `tool_calls` short-circuit: the first one is serialized as a
/// `{tool, args}` text content, matching the extractor's canonical schema.
/// If `content` is empty but `reasoning_content` is present, the reasoning
/// is surfaced prefixed with `[Reasoning]` so the orchestrator still has
/// text to act on (Ollama-style local models).
///
/// # Errors
///
/// Returns [`ProviderError::Parse`] on malformed JSON, or
/// [`ProviderError::EmptyResponse`] when there is no content, no tool call,
/// and no reasoning text.
pub fn parse_response(body: &str) -> Result<CompletionResponse, ProviderError> {
    let wire: WireResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyResponse { finish_reason: None })?;

    let usage = wire.usage.unwrap_or_default();
    let model = wire.model.unwrap_or_default();

    if let Some(tool_calls) = &choice.message.tool_calls {
        if let Some(first) = tool_calls.first() {
            let args: Value = serde_json::from_str(&first.function.arguments)
                .unwrap_or_else(|_| Value::String(first.function.arguments.clone()));
            let text = serde_json::json!({"tool": first.function.name, "args": args}).to_string();
            return Ok(CompletionResponse {
                content: vec![ContentPart::Text { text }],
                stop_reason: StopReason::ToolUse,
                usage: UsageStats {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                },
                model,
            });
        }
    }

    let text = match (&choice.message.content, &choice.message.reasoning_content) {
        (Some(content), _) if !content.is_empty() => content.clone(),
        (_, Some(reasoning)) if !reasoning.is_empty() => format!("[Reasoning] {reasoning}"),
        _ => {
            return Err(ProviderError::EmptyResponse {
                finish_reason: choice.finish_reason,
            })
        }
    };

    Ok(CompletionResponse {
        content: vec![ContentPart::Text { text }],
        stop_reason: map_finish_reason(choice.finish_reason.as_deref()),
        usage: UsageStats {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        },
        model,
    })
}

fn map_finish_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("stop") => StopReason::EndTurn,
        Some("tool_calls") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        Some(other) => StopReason::Other(other.to_owned()),
        None => StopReason::Other("unknown".to_owned()),
    }
}

// ---------------------------------------------------------------------------
// Streaming assembly
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
    usage: Option<WireUsage>,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<StreamToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    function: StreamFunctionDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Accumulates a streamed response across SSE chunks: tool_call fragments
/// (name set once, arguments concatenated), text content batched into
/// `STREAM_BATCH_SIZE`-token groups and a guard against mixing content
/// accumulation with tool_call accumulation (§4.2, §9 Streaming assembly).
#[derive(Debug, Default)]
struct StreamAssembler {
    text: String,
    tool_name: Option<String>,
    tool_args: String,
    finish_reason: Option<String>,
    usage: Option<WireUsage>,
    generation_id: Option<String>,
    chunk_count: usize,
}

impl StreamAssembler {
    fn ingest_line(&mut self, line: &str) -> bool {
        let Some(payload) = line.strip_prefix("data: ") else {
            return true;
        };
        if payload.trim() == "[DONE]" {
            return false;
        }
        let Ok(chunk) = serde_json::from_str::<StreamChunk>(payload) else {
            return true;
        };
        if self.generation_id.is_none() {
            self.generation_id = chunk.id;
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }
        if let Some(choice) = chunk.choices.into_iter().next() {
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
            if let Some(content) = choice.delta.content {
                self.text.push_str(&content);
                self.chunk_count += 1;
            }
            for call in choice.delta.tool_calls {
                if let Some(name) = call.function.name {
                    self.tool_name = Some(name);
                }
                if let Some(args) = call.function.arguments {
                    self.tool_args.push_str(&args);
                }
            }
        }
        true
    }

    fn into_response(self, model: String) -> Result<CompletionResponse, ProviderError> {
        let usage = self.usage.unwrap_or_default();
        let usage_stats = UsageStats {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        };

        if let Some(name) = self.tool_name {
            let args: Value =
                serde_json::from_str(&self.tool_args).unwrap_or(Value::Object(Default::default()));
            let text = serde_json::json!({"tool": name, "args": args}).to_string();
            return Ok(CompletionResponse {
                content: vec![ContentPart::Text { text }],
                stop_reason: StopReason::ToolUse,
                usage: usage_stats,
                model,
            });
        }

        if self.text.is_empty() {
            return Err(ProviderError::EmptyResponse { finish_reason: self.finish_reason });
        }

        Ok(CompletionResponse {
            content: vec![ContentPart::Text { text: self.text }],
            stop_reason: map_finish_reason(self.finish_reason.as_deref()),
            usage: usage_stats,
            model,
        })
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// OpenAI-chat-completions-family provider.
pub struct OpenAiChatProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    quirks: ProviderQuirks,
    streaming: bool,
}

impl OpenAiChatProvider {
    /// Construct a provider bound to one model, credential, and quirks table.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(
        base_url: String,
        model: String,
        api_key: String,
        quirks: ProviderQuirks,
        streaming: bool,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()?;
        Ok(Self { client, base_url, model, api_key, quirks, streaming })
    }

    fn effective_streaming(&self) -> bool {
        self.streaming && !self.quirks.streaming_opt_out.iter().any(|m| m == &self.model)
    }

    fn is_nvidia_cold_start(status: u16) -> bool {
        matches!(status, 502 | 503 | 504)
    }

    async fn send_once(
        &self,
        wire: &WireRequest,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json");
        if self.quirks.send_openrouter_headers {
            builder = builder
                .header("HTTP-Referer", "https://github.com/")
                .header("X-Title", "gateway");
        }
        Ok(builder.json(wire).send().await?)
    }
}

#[async_trait]
impl LlmProvider for OpenAiChatProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let streaming = self.effective_streaming();
        let wire = build_request(&self.model, &request, &self.quirks, streaming);

        if self.quirks.provider_id == "nvidia" {
            let mut attempts = 0;
            loop {
                let response = self.send_once(&wire).await?;
                let status = response.status().as_u16();
                if Self::is_nvidia_cold_start(status) && attempts < NVIDIA_COLD_START_RETRIES {
                    attempts += 1;
                    sleep(NVIDIA_COLD_START_SLEEP).await;
                    continue;
                }
                let body = check_http_response(response).await?;
                return if streaming {
                    self.parse_stream_body(&body)
                } else {
                    parse_response(&body)
                };
            }
        }

        let response = self.send_once(&wire).await?;
        let body = check_http_response(response).await?;
        if streaming {
            self.parse_stream_body(&body)
        } else {
            parse_response(&body)
        }
    }

    fn supports_tool_calling(&self) -> bool {
        true
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

impl OpenAiChatProvider {
    /// Assemble a complete SSE body (already buffered) into a response. The
    /// live HTTP path reads this incrementally via [`Self::stream_response`];
    /// this entry point is kept for callers that already have the full body
    /// (tests, replays).
    fn parse_stream_body(&self, body: &str) -> Result<CompletionResponse, ProviderError> {
        let mut assembler = StreamAssembler::default();
        for line in body.lines() {
            if !assembler.ingest_line(line) {
                break;
            }
        }
        assembler.into_response(self.model.clone())
    }

    /// Stream an HTTP response body chunk-by-chunk using `bytes_stream`,
    /// yielding to the scheduler every [`STREAM_BATCH_SIZE`] content tokens
    /// so a typing-ping callback has a chance to fire (§5 Suspension points).
    pub async fn stream_response(
        response: reqwest::Response,
        model: &str,
    ) -> Result<CompletionResponse, ProviderError> {
        let mut stream = response.bytes_stream();
        let mut assembler = StreamAssembler::default();
        let mut buf = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].trim_end_matches('\r').to_owned();
                buf.drain(..=pos);
                if !assembler.ingest_line(&line) {
                    return assembler.into_response(model.to_owned());
                }
                if assembler.chunk_count % STREAM_BATCH_SIZE == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }

        assembler.into_response(model.to_owned())
    }
}

//! Anthropic Messages API adapter (§4.2 Anthropic Messages family).
//!
//! Free functions [`build_request`]/[`parse_response`] are unit-testable
//! without an HTTP mock; [`AnthropicProvider`] wires them to `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    check_http_response, CompletionRequest, CompletionResponse, ContentPart, LlmProvider,
    MessageContent, ProviderError, Role, StopReason, UsageStats,
};

const DEFAULT_MAX_TOKENS: u32 = 4096;
const ANTHROPIC_VERSION: &str = "2023-06-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(600);

/// Credential resolved for an Anthropic call — selects the auth header.
#[derive(Debug, Clone)]
pub enum AnthropicAuth {
    /// OAuth bearer token (`sk-ant-oat…` prefix) — sent as `Authorization: Bearer`.
    OAuthToken(String),
    /// Plain API key — sent as `x-api-key`.
    ApiKey(String),
}

impl AnthropicAuth {
    /// Select the auth mode for a raw credential string by its prefix (§4.2).
    pub fn from_credential(raw: &str) -> Self {
        if raw.starts_with("sk-ant-oat") {
            Self::OAuthToken(raw.to_owned())
        } else {
            Self::ApiKey(raw.to_owned())
        }
    }
}

impl From<&crate::credentials::AnthropicAuth> for AnthropicAuth {
    fn from(auth: &crate::credentials::AnthropicAuth) -> Self {
        match auth {
            crate::credentials::AnthropicAuth::OAuth { access_token, .. } => {
                Self::OAuthToken(access_token.clone())
            }
            crate::credentials::AnthropicAuth::ApiKey(key) => Self::ApiKey(key.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct WireRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<WireMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: Vec<WireContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireContentBlock {
    Text { text: String },
    Image { source: WireImageSource },
    ToolResult { tool_use_id: String, content: String, is_error: bool },
}

#[derive(Debug, Serialize)]
pub struct WireImageSource {
    #[serde(rename = "type")]
    pub source_type: &'static str,
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct WireTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<WireResponseBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireResponseBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// ---------------------------------------------------------------------------
// build_request / parse_response
// ---------------------------------------------------------------------------

/// Build the wire request body for a completion call (§4.2).
///
/// Consecutive same-role messages are merged and a leading non-user message
/// gets a sentinel user turn inserted, since the Anthropic API requires the
/// conversation to start with `user`.
pub fn build_request(model: &str, request: &CompletionRequest) -> WireRequest {
    let mut messages: Vec<WireMessage> = Vec::with_capacity(request.messages.len());

    for message in &request.messages {
        let role = map_role(message.role);
        let blocks = content_blocks(&message.content);

        if let Some(last) = messages.last_mut() {
            if last.role == role {
                last.content.extend(blocks);
                continue;
            }
        }
        messages.push(WireMessage { role, content: blocks });
    }

    if messages.first().map(|m| m.role.as_str()) != Some("user") {
        messages.insert(
            0,
            WireMessage {
                role: "user".to_owned(),
                content: vec![WireContentBlock::Text { text: "(continuing)".to_owned() }],
            },
        );
    }

    WireRequest {
        model: model.to_owned(),
        system: request.system.clone(),
        messages,
        max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        stop_sequences: request.stop_sequences.clone(),
        tools: request
            .tools
            .iter()
            .map(|t| WireTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect(),
    }
}

fn map_role(role: Role) -> String {
    match role {
        Role::User | Role::Tool => "user".to_owned(),
        Role::Assistant => "assistant".to_owned(),
        Role::System => "user".to_owned(),
    }
}

fn content_blocks(content: &MessageContent) -> Vec<WireContentBlock> {
    match content {
        MessageContent::Text(text) => vec![WireContentBlock::Text { text: text.clone() }],
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => WireContentBlock::Text { text: text.clone() },
                ContentPart::Image { media_type, data } => WireContentBlock::Image {
                    source: WireImageSource {
                        source_type: "base64",
                        media_type: media_type.clone(),
                        data: data.clone(),
                    },
                },
                ContentPart::ToolResult { tool_use_id, content, is_error } => {
                    WireContentBlock::ToolResult {
                        tool_use_id: tool_use_id.clone(),
                        content: content.clone(),
                        is_error: *is_error,
                    }
                }
                ContentPart::ToolUse { name, input, .. } => WireContentBlock::Text {
                    text: serde_json::json!({"tool": name, "args": input}).to_string(),
                },
            })
            .collect(),
    }
}

/// Parse a raw JSON response body into a [`CompletionResponse`].
///
/// # Errors
///
/// Returns [`ProviderError::Parse`] if the body is not valid Anthropic JSON.
pub fn parse_response(body: &str) -> Result<CompletionResponse, ProviderError> {
    let wire: WireResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let content: Vec<ContentPart> = wire
        .content
        .into_iter()
        .filter_map(|block| match block {
            WireResponseBlock::Text { text } => Some(ContentPart::Text { text }),
            WireResponseBlock::ToolUse { id, name, input } => {
                Some(ContentPart::ToolUse { id, name, input })
            }
            WireResponseBlock::Unknown => None,
        })
        .collect();

    if content.is_empty() {
        return Err(ProviderError::EmptyResponse { finish_reason: wire.stop_reason });
    }

    let stop_reason = match wire.stop_reason.as_deref() {
        Some("end_turn") => StopReason::EndTurn,
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        Some(other) => StopReason::Other(other.to_owned()),
        None => StopReason::Other("unknown".to_owned()),
    };

    Ok(CompletionResponse {
        content,
        stop_reason,
        usage: UsageStats {
            input_tokens: wire.usage.input_tokens,
            output_tokens: wire.usage.output_tokens,
        },
        model: wire.model,
    })
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    auth: AnthropicAuth,
}

impl AnthropicProvider {
    /// Construct a provider bound to one model and credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: String, model: String, auth: AnthropicAuth) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()?;
        Ok(Self { client, base_url, model, auth })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let wire = build_request(&self.model, &request);

        let mut builder = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json");

        builder = match &self.auth {
            AnthropicAuth::OAuthToken(token) => builder
                .header("Authorization", format!("Bearer {token}"))
                .header("anthropic-beta", "oauth-2025-04-20"),
            AnthropicAuth::ApiKey(key) => builder.header("x-api-key", key),
        };

        let response = builder.json(&wire).send().await?;
        let body = check_http_response(response).await?;
        parse_response(&body)
    }

    fn supports_tool_calling(&self) -> bool {
        true
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

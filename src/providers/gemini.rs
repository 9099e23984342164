//! Google Gemini adapter (§4.2 Gemini family).
//!
//! Gemini's `generateContent` endpoint takes a single flattened prompt rather
//! than a role-tagged message list, so the whole conversation history is
//! collapsed into one `contents[0].parts[0].text` blob prefixed with a
//! `SYSTEM CONTEXT:` header.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    check_http_response, CompletionRequest, CompletionResponse, ContentPart, LlmProvider,
    ProviderError, StopReason, UsageStats,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Serialize)]
pub struct WireRequest {
    pub contents: Vec<WireContent>,
}

#[derive(Debug, Serialize)]
pub struct WireContent {
    pub parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
pub struct WirePart {
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    candidates: Vec<WireCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    content: Option<WireResponseContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponseContent {
    parts: Vec<WireResponsePart>,
}

#[derive(Debug, Deserialize)]
struct WireResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

/// Build the request body by collapsing system prompt and history into one
/// text blob (§4.2).
pub fn build_request(request: &CompletionRequest) -> WireRequest {
    let mut blob = String::new();
    if let Some(system) = &request.system {
        blob.push_str("SYSTEM CONTEXT: ");
        blob.push_str(system);
        blob.push_str("\n\n");
    }

    for message in &request.messages {
        let speaker = match message.role {
            super::Role::System => "System",
            super::Role::User => "User",
            super::Role::Assistant => "Assistant",
            super::Role::Tool => "Tool",
        };
        blob.push_str(speaker);
        blob.push_str(": ");
        blob.push_str(&message.content.text());
        blob.push('\n');
    }

    WireRequest {
        contents: vec![WireContent { parts: vec![WirePart { text: blob }] }],
    }
}

/// Parse the raw JSON response body.
///
/// # Errors
///
/// Returns [`ProviderError::Parse`] on malformed JSON, or
/// [`ProviderError::EmptyResponse`] when `content` is absent from the first
/// candidate (carrying `finishReason` for diagnostics, §4.2).
pub fn parse_response(body: &str) -> Result<CompletionResponse, ProviderError> {
    let wire: WireResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let candidate = wire
        .candidates
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyResponse { finish_reason: None })?;

    let text = candidate
        .content
        .as_ref()
        .and_then(|c| c.parts.first())
        .and_then(|p| p.text.clone());

    let Some(text) = text else {
        return Err(ProviderError::EmptyResponse { finish_reason: candidate.finish_reason });
    };

    let usage = wire.usage_metadata.unwrap_or(WireUsage { prompt_token_count: 0, candidates_token_count: 0 });

    Ok(CompletionResponse {
        content: vec![ContentPart::Text { text }],
        stop_reason: StopReason::EndTurn,
        usage: UsageStats {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        },
        model: String::new(),
    })
}

/// Google Gemini provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiProvider {
    /// Construct a provider bound to one model and API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: String, model: String, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()?;
        Ok(Self { client, base_url, model, api_key })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let wire = build_request(&request);
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let response = self.client.post(url).json(&wire).send().await?;
        let body = check_http_response(response).await?;
        let mut parsed = parse_response(&body)?;
        parsed.model = self.model.clone();
        Ok(parsed)
    }

    fn supports_tool_calling(&self) -> bool {
        false
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

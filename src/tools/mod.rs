//! Tool definitions, extraction, and dispatch (§4.5, §4.6).
//!
//! Individual tool implementations are intentionally minimal — this system's
//! job is the extractor/dispatcher/registry plumbing around them, not a
//! catalog of SaaS integrations. [`builtin`] carries a couple of illustrative
//! tools exercised by the dispatcher's tests.

pub mod builtin;
pub mod dispatch;
pub mod extractor;
pub mod registry;

use async_trait::async_trait;

use crate::providers::ToolDefinition;

/// Errors a tool implementation can return.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    /// The input JSON did not satisfy the tool's schema/preconditions.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The tool ran but failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    /// The tool did not complete within its timeout.
    #[error("tool timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// One observed piece of a tool's result — text or an inline image, so a
/// single call can hand back multimodal output (§3 Tool Observation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolObservationPart {
    /// Plain text output.
    Text(String),
    /// Base64-encoded image with its MIME type.
    Image {
        /// MIME type, e.g. `"image/png"`.
        media_type: String,
        /// Base64-encoded image bytes.
        data: String,
    },
}

/// A tool's result, possibly multimodal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolObservation {
    /// Ordered output parts.
    pub parts: Vec<ToolObservationPart>,
}

impl ToolObservation {
    /// Build a text-only observation.
    pub fn text(text: impl Into<String>) -> Self {
        Self { parts: vec![ToolObservationPart::Text(text.into())] }
    }

    /// Concatenate all text parts (used for logging/checkpointing).
    pub fn text_summary(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ToolObservationPart::Text(t) => Some(t.as_str()),
                ToolObservationPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A callable tool exposed to the LLM.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, matching the registry key and the extractor's `tool` field.
    fn name(&self) -> &str;

    /// Tool schema advertised to the LLM.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool against parsed JSON arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] on invalid input or execution failure.
    async fn call(&self, args: &serde_json::Value) -> Result<ToolObservation, ToolError>;
}

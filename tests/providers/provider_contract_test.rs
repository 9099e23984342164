//! Provider capability contract tests.

use std::collections::HashMap;

use wintermute::providers::anthropic::{AnthropicAuth, AnthropicProvider};
use wintermute::providers::openai_chat::{OpenAiChatProvider, ProviderQuirks};
use wintermute::providers::LlmProvider;

#[test]
fn anthropic_provider_reports_capabilities_and_model_id() {
    let provider = AnthropicProvider::new(
        "https://api.anthropic.com".to_owned(),
        "claude-sonnet-4-5-20250929".to_owned(),
        AnthropicAuth::ApiKey("test-api-key".to_owned()),
    )
    .expect("provider should build");
    assert!(provider.supports_tool_calling());
    assert!(provider.supports_streaming());
    assert_eq!(provider.model_id(), "claude-sonnet-4-5-20250929");
}

#[test]
fn openai_chat_provider_reports_capabilities_and_model_id() {
    let quirks = ProviderQuirks {
        provider_id: "ollama".to_owned(),
        model_extras: HashMap::new(),
        streaming_opt_out: vec![],
        send_openrouter_headers: false,
        context_window_trim: true,
        context_windows: HashMap::new(),
    };
    let provider = OpenAiChatProvider::new(
        "http://localhost:11434/v1".to_owned(),
        "qwen3:8b".to_owned(),
        String::new(),
        quirks,
        true,
    )
    .expect("provider should build");
    assert!(provider.supports_tool_calling());
    assert_eq!(provider.model_id(), "qwen3:8b");
}

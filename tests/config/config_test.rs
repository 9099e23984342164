//! Coverage for config parsing and path resolution.

use std::collections::HashMap;
use std::path::Path;

use wintermute::config::{all_model_specs, config_dir, runtime_paths, Config, ModelsConfig};

#[test]
fn config_dir_resolves_under_llm_gateway() {
    let dir = config_dir().expect("config dir should resolve");
    assert!(dir.ends_with(".llm-gateway"));
}

#[test]
fn runtime_paths_has_expected_children() {
    let paths = runtime_paths().expect("runtime paths should resolve");
    assert!(paths.config_toml.ends_with("config.toml"));
    assert!(paths.env_file.ends_with(".env"));
    assert!(paths.runs_dir.ends_with("runs"));
    assert!(paths.cost_log.ends_with(Path::new("cost_log.jsonl")));
    assert!(paths.chat_history.ends_with(Path::new("chat_history.jsonl")));
}

#[test]
fn parse_minimal_config() {
    let toml_str = r#"
[models]
default = "anthropic/claude-sonnet-4-5-20250929"
"#;
    let config: Config = toml::from_str(toml_str).expect("minimal config should parse");
    assert_eq!(config.models.default, "anthropic/claude-sonnet-4-5-20250929");
    assert!(config.models.roles.is_empty());
}

#[test]
fn parse_config_with_fallback_and_agent_overrides() {
    let toml_str = r#"
[models]
default = "ollama/qwen3:8b"

[fallback]
auto_fallback = false
error_threshold = 5

[agent]
max_turns = 10
smart_routing = true
"#;
    let config: Config = toml::from_str(toml_str).expect("config should parse");
    assert!(!config.fallback.auto_fallback);
    assert_eq!(config.fallback.error_threshold, 5);
    assert_eq!(config.agent.max_turns, 10);
    assert!(config.agent.smart_routing);
}

#[test]
fn parse_model_overrides_with_task_types() {
    let toml_str = r#"
[models]
default = "ollama/qwen3:8b"

[agent.model_overrides."anthropic/claude-sonnet-4-5"]
task_types = ["coding", "reasoning"]
max_tokens = 8192
"#;
    let config: Config = toml::from_str(toml_str).expect("config should parse");
    let over = config
        .agent
        .model_overrides
        .get("anthropic/claude-sonnet-4-5")
        .expect("override present");
    assert_eq!(over.task_types, vec!["coding".to_owned(), "reasoning".to_owned()]);
    assert_eq!(over.max_tokens, Some(8192));
}

#[test]
fn all_model_specs_deduplicates() {
    let models = ModelsConfig {
        default: "ollama/qwen3:8b".to_owned(),
        roles: HashMap::from([("observer".to_owned(), "ollama/qwen3:8b".to_owned())]),
        skills: HashMap::new(),
    };
    let specs = all_model_specs(&models);
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0], "ollama/qwen3:8b");
}

#[test]
fn all_model_specs_preserves_default_first() {
    let models = ModelsConfig {
        default: "ollama/qwen3:8b".to_owned(),
        roles: HashMap::from([("observer".to_owned(), "anthropic/claude-haiku".to_owned())]),
        skills: HashMap::from([("deploy".to_owned(), "anthropic/claude-sonnet".to_owned())]),
    };
    let specs = all_model_specs(&models);
    assert_eq!(specs[0], "ollama/qwen3:8b");
    assert!(specs.contains(&"anthropic/claude-haiku".to_owned()));
    assert!(specs.contains(&"anthropic/claude-sonnet".to_owned()));
}

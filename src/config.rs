//! Configuration loading and validation.
//!
//! A single human-owned `config.toml` drives the whole gateway: model
//! routing, per-provider overrides, fallback behavior, and agent loop
//! settings, following `wintermute::config`'s `#[serde(default = "...")]`
//! style throughout.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Model routing configuration.
    pub models: ModelsConfig,

    /// Per-provider credential/base-url/quirk overrides (`providers.<id>.*`).
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Fallback engine behavior.
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Agent orchestration loop settings.
    #[serde(default)]
    pub agent: AgentLoopConfig,

    /// Personality/identity text folded into the system prompt (§4.7 Setup).
    #[serde(default)]
    pub personality: PersonalityConfig,
}

/// Per-provider overrides keyed by provider id (`providers.<id>.*`, §6).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    /// Map of provider id to its override block.
    #[serde(flatten)]
    pub entries: HashMap<String, ProviderOverride>,
}

/// One provider's configuration override.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderOverride {
    /// Overrides the default base URL for this provider.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Disables the shared HTTP streaming path for this provider's models.
    #[serde(default)]
    pub streaming: Option<bool>,

    /// Per-model extra JSON fields merged into the wire request body.
    #[serde(default)]
    pub model_extras: HashMap<String, serde_json::Value>,

    /// Model ids for which streaming is opted out even if globally enabled.
    #[serde(default)]
    pub streaming_opt_out: Vec<String>,

    /// Per-model context window sizes in tokens, for context trimming.
    #[serde(default)]
    pub context_windows: HashMap<String, usize>,
}

/// Fallback engine configuration (§4.3, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct FallbackConfig {
    /// Whether automatic fallback is enabled at all.
    #[serde(default = "default_true")]
    pub auto_fallback: bool,

    /// Consecutive-failure threshold before a provider is considered down
    /// for reporting purposes (the health table itself always cools down
    /// on the first failure; this is a user-facing alerting threshold).
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Minimum seconds before retrying a provider after recovery actions.
    #[serde(default = "default_recovery_time_secs")]
    pub recovery_time_seconds: u64,

    /// Ranked chain of `<provider>/<model>` specs to walk on failure.
    #[serde(default)]
    pub fallback_chain: Vec<String>,

    /// Per-error-kind cooldown overrides, keyed by [`crate::error::ErrorKind::config_key`].
    #[serde(default)]
    pub fallback_cooldowns: HashMap<String, u64>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            auto_fallback: true,
            error_threshold: default_error_threshold(),
            recovery_time_seconds: default_recovery_time_secs(),
            fallback_chain: Vec::new(),
            fallback_cooldowns: HashMap::new(),
        }
    }
}

/// Agent orchestration loop settings (§4.7, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct AgentLoopConfig {
    /// Maximum ReAct loop turns before forced termination.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Seconds to wait for a single provider call before treating it as a
    /// timeout error.
    #[serde(default = "default_speak_timeout")]
    pub speak_timeout: u64,

    /// Wall-clock seconds allowed for an entire ReAct loop turn, across all
    /// of its internal LLM/tool iterations (§4.7 Loop).
    #[serde(default = "default_wall_clock_timeout")]
    pub wall_clock_timeout: u64,

    /// Whether streaming responses are requested from providers that support it.
    #[serde(default = "default_true")]
    pub streaming: bool,

    /// Enables per-turn task-type classification and routing (§4.4).
    #[serde(default)]
    pub smart_routing: bool,

    /// Enables dropping oldest messages to fit a provider's context window.
    #[serde(default)]
    pub context_window_trim: bool,

    /// Per-tool timeout overrides in seconds (`tool_timeouts.<tool>`).
    #[serde(default)]
    pub tool_timeouts: HashMap<String, u64>,

    /// Per-model routing-table overrides (`model_overrides.<model>.*`).
    #[serde(default)]
    pub model_overrides: HashMap<String, ModelOverride>,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            speak_timeout: default_speak_timeout(),
            wall_clock_timeout: default_wall_clock_timeout(),
            streaming: true,
            smart_routing: false,
            context_window_trim: false,
            tool_timeouts: HashMap::new(),
            model_overrides: HashMap::new(),
        }
    }
}

/// Per-model override entry for smart routing or capability tweaks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelOverride {
    /// Task types this model should be preferred for (coding, reasoning, …).
    #[serde(default)]
    pub task_types: Vec<String>,

    /// Explicit max_tokens override for this model.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Personality/identity text folded into the system prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonalityConfig {
    /// Human-readable agent name.
    #[serde(default = "default_personality_name")]
    pub name: String,

    /// Free-form system prompt extension.
    #[serde(default)]
    pub soul: String,
}

impl Default for PersonalityConfig {
    fn default() -> Self {
        Self { name: default_personality_name(), soul: String::new() }
    }
}

fn default_error_threshold() -> u32 {
    3
}
fn default_recovery_time_secs() -> u64 {
    300
}
fn default_max_turns() -> u32 {
    50
}
fn default_speak_timeout() -> u64 {
    120
}
fn default_wall_clock_timeout() -> u64 {
    600
}
fn default_personality_name() -> String {
    "Assistant".to_owned()
}
fn default_true() -> bool {
    true
}

/// Model routing: default model, per-role and per-skill overrides.
#[derive(Debug, Deserialize)]
pub struct ModelsConfig {
    /// Default model identifier (e.g. "anthropic/claude-sonnet-4-5-20250929").
    pub default: String,

    /// Per-role model overrides (observer, embedding, etc.).
    #[serde(default)]
    pub roles: HashMap<String, String>,

    /// Per-skill model overrides.
    #[serde(default)]
    pub skills: HashMap<String, String>,
}

/// Resolved runtime paths under the gateway's runtime directory (§6 Persistence layout).
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    /// Runtime root directory (`~/.llm-gateway`).
    pub root: PathBuf,
    /// Human-owned config file path.
    pub config_toml: PathBuf,
    /// Runtime `.env` credentials file path.
    pub env_file: PathBuf,
    /// Directory holding per-turn checkpoint subdirectories (`<runs>/<uuid>/checkpoint.json`).
    pub runs_dir: PathBuf,
    /// Cost log path (`cost_log.jsonl`).
    pub cost_log: PathBuf,
    /// Chat history log path (`chat_history.jsonl`).
    pub chat_history: PathBuf,
}

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    Ok(config)
}

/// Resolve the default runtime directory (`~/.llm-gateway/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".llm-gateway"))
}

/// Resolve runtime paths under the gateway's runtime directory.
///
/// # Errors
///
/// Returns an error when the base config directory cannot be determined.
pub fn runtime_paths() -> anyhow::Result<RuntimePaths> {
    let root = config_dir()?;
    let config_toml = root.join("config.toml");
    let env_file = root.join(".env");
    let runs_dir = root.join("runs");
    let cost_log = root.join("cost_log.jsonl");
    let chat_history = root.join("chat_history.jsonl");

    Ok(RuntimePaths { root, config_toml, env_file, runs_dir, cost_log, chat_history })
}

/// Load the default config from `~/.llm-gateway/config.toml`.
///
/// # Errors
///
/// Returns an error if paths cannot be resolved or config parsing fails.
pub fn load_default_config() -> anyhow::Result<Config> {
    let paths = runtime_paths()?;
    load_config(&paths.config_toml)
}

/// Return all provider model specs declared in config in deterministic order.
pub fn all_model_specs(models: &ModelsConfig) -> Vec<String> {
    let mut ordered = Vec::new();
    ordered.push(models.default.clone());

    let mut role_specs: Vec<_> = models.roles.iter().collect();
    role_specs.sort_by_key(|(k, _)| *k);
    for (_, spec) in role_specs {
        ordered.push(spec.clone());
    }

    let mut skill_specs: Vec<_> = models.skills.iter().collect();
    skill_specs.sort_by_key(|(k, _)| *k);
    for (_, spec) in skill_specs {
        ordered.push(spec.clone());
    }

    let mut seen = HashMap::new();
    ordered
        .into_iter()
        .filter(|spec| seen.insert(spec.clone(), true).is_none())
        .collect()
}

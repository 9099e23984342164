//! Model router resolving providers by skill, role, and default settings,
//! and instantiating the correct wire-family adapter for each provider id.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;

use crate::config::{all_model_specs, ModelsConfig, ProvidersConfig};
use crate::credentials::{resolve_anthropic_auth, Credentials};

use super::anthropic::AnthropicProvider;
use super::gemini::GeminiProvider;
use super::openai_chat::{OpenAiChatProvider, ProviderQuirks};
use super::{LlmProvider, WireFamily};

/// Provider routing errors.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Model spec is not in `<provider>/<model>` format.
    #[error("invalid model spec '{spec}', expected '<provider>/<model>'")]
    InvalidModelSpec {
        /// Invalid raw spec.
        spec: String,
    },
    /// The requested provider spec is not available.
    #[error("provider not available for model spec '{spec}'")]
    UnavailableProvider {
        /// Unavailable spec.
        spec: String,
    },
    /// Default provider spec could not be created.
    #[error("default provider '{spec}' is unavailable")]
    DefaultUnavailable {
        /// Missing default spec.
        spec: String,
    },
    /// Unsupported provider id in spec prefix.
    #[error("unsupported provider '{provider}'")]
    UnsupportedProvider {
        /// Unsupported provider prefix.
        provider: String,
    },
    /// Required API credential missing for selected provider.
    #[error("missing credential for provider '{provider}': {key}")]
    MissingCredential {
        /// Provider name.
        provider: String,
        /// Missing credential key.
        key: String,
    },
}

/// Static metadata for a known provider id — wire family, default base URL,
/// and the environment variable its API key is read from. Adding a new
/// OpenAI-chat-family provider only means adding a row here (§9: "adding a
/// model should not touch adapter code").
struct ProviderMeta {
    id: &'static str,
    family: WireFamily,
    default_base_url: &'static str,
    env_key: &'static str,
}

const PROVIDER_TABLE: &[ProviderMeta] = &[
    ProviderMeta { id: "anthropic", family: WireFamily::Anthropic, default_base_url: "https://api.anthropic.com", env_key: "ANTHROPIC_API_KEY" },
    ProviderMeta { id: "gemini", family: WireFamily::Gemini, default_base_url: "https://generativelanguage.googleapis.com", env_key: "GEMINI_API_KEY" },
    ProviderMeta { id: "openai", family: WireFamily::OpenaiChat, default_base_url: "https://api.openai.com/v1", env_key: "OPENAI_API_KEY" },
    ProviderMeta { id: "nvidia", family: WireFamily::OpenaiChat, default_base_url: "https://integrate.api.nvidia.com/v1", env_key: "NVIDIA_API_KEY" },
    ProviderMeta { id: "groq", family: WireFamily::OpenaiChat, default_base_url: "https://api.groq.com/openai/v1", env_key: "GROQ_API_KEY" },
    ProviderMeta { id: "mistral", family: WireFamily::OpenaiChat, default_base_url: "https://api.mistral.ai/v1", env_key: "MISTRAL_API_KEY" },
    ProviderMeta { id: "cerebras", family: WireFamily::OpenaiChat, default_base_url: "https://api.cerebras.ai/v1", env_key: "CEREBRAS_API_KEY" },
    ProviderMeta { id: "openrouter", family: WireFamily::OpenaiChat, default_base_url: "https://openrouter.ai/api/v1", env_key: "OPENROUTER_API_KEY" },
    ProviderMeta { id: "huggingface", family: WireFamily::OpenaiChat, default_base_url: "https://api-inference.huggingface.co/v1", env_key: "HUGGINGFACE_API_KEY" },
    ProviderMeta { id: "kimi", family: WireFamily::OpenaiChat, default_base_url: "https://api.moonshot.ai/v1", env_key: "KIMI_API_KEY" },
    ProviderMeta { id: "zai", family: WireFamily::OpenaiChat, default_base_url: "https://api.z.ai/v1", env_key: "ZAI_API_KEY" },
    ProviderMeta { id: "minimax", family: WireFamily::OpenaiChat, default_base_url: "https://api.minimax.chat/v1", env_key: "MINIMAX_API_KEY" },
    ProviderMeta { id: "xai", family: WireFamily::OpenaiChat, default_base_url: "https://api.x.ai/v1", env_key: "XAI_API_KEY" },
    ProviderMeta { id: "ollama", family: WireFamily::OpenaiChat, default_base_url: "http://localhost:11434/v1", env_key: "OLLAMA_API_KEY" },
];

fn provider_meta(id: &str) -> Option<&'static ProviderMeta> {
    PROVIDER_TABLE.iter().find(|p| p.id == id)
}

/// Model router resolving `skill -> role -> default`.
#[derive(Clone)]
pub struct ModelRouter {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default: String,
    role_overrides: HashMap<String, String>,
    skill_overrides: HashMap<String, String>,
}

impl ModelRouter {
    /// Build a router from model config and loaded credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the default provider cannot be instantiated.
    pub fn from_config(
        models: &ModelsConfig,
        providers_config: &ProvidersConfig,
        credentials: &Credentials,
    ) -> anyhow::Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let specs = all_model_specs(models);

        for spec in specs {
            let parsed = parse_model_spec(&spec)
                .with_context(|| format!("failed to parse model spec '{spec}'"))?;
            let instance = instantiate_provider(
                &spec,
                &parsed.provider,
                &parsed.model,
                providers_config,
                credentials,
            );
            if let Ok(provider) = instance {
                providers.insert(spec.clone(), provider);
            }
        }

        if !providers.contains_key(&models.default) {
            return Err(RouterError::DefaultUnavailable {
                spec: models.default.clone(),
            }
            .into());
        }

        Ok(Self {
            providers,
            default: models.default.clone(),
            role_overrides: models.roles.clone(),
            skill_overrides: models.skills.clone(),
        })
    }

    /// Create a router backed by a single provider for integration tests.
    #[doc(hidden)]
    pub fn for_testing(default_spec: String, provider: Arc<dyn LlmProvider>) -> Self {
        let mut providers = HashMap::new();
        providers.insert(default_spec.clone(), provider);
        Self {
            providers,
            default: default_spec,
            role_overrides: HashMap::new(),
            skill_overrides: HashMap::new(),
        }
    }

    /// Add another provider spec to a test router, builder-style.
    #[doc(hidden)]
    pub fn with_extra_for_testing(mut self, spec: String, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.insert(spec, provider);
        self
    }

    /// Resolve a provider by optional role and skill identifiers.
    ///
    /// Resolution order: `skill -> role -> default`.
    ///
    /// # Errors
    ///
    /// Returns an error if no provider can be resolved.
    pub fn resolve(
        &self,
        role: Option<&str>,
        skill: Option<&str>,
    ) -> anyhow::Result<Arc<dyn LlmProvider>> {
        let selected = self.resolve_spec(role, skill);
        self.resolve_by_spec(&selected)
    }

    /// Resolve a provider by its exact `<provider>/<model>` spec string.
    ///
    /// # Errors
    ///
    /// Returns an error if `spec` is not a known, loaded provider.
    pub fn resolve_by_spec(&self, spec: &str) -> anyhow::Result<Arc<dyn LlmProvider>> {
        self.providers
            .get(spec)
            .cloned()
            .ok_or_else(|| RouterError::UnavailableProvider { spec: spec.to_owned() }.into())
    }

    /// Resolve a model spec string by optional role and skill.
    pub fn resolve_spec(&self, role: Option<&str>, skill: Option<&str>) -> String {
        if let Some(spec) = skill
            .and_then(|s| self.skill_overrides.get(s))
            .filter(|spec| self.providers.contains_key(*spec))
        {
            return spec.clone();
        }
        if let Some(spec) = role
            .and_then(|r| self.role_overrides.get(r))
            .filter(|spec| self.providers.contains_key(*spec))
        {
            return spec.clone();
        }
        self.default.clone()
    }

    /// Returns true when a specific model spec is available.
    pub fn has_model(&self, spec: &str) -> bool {
        self.providers.contains_key(spec)
    }

    /// Returns the default provider.
    pub fn default_provider(&self) -> Arc<dyn LlmProvider> {
        // Safe: from_config guarantees the default is present.
        Arc::clone(&self.providers[&self.default])
    }

    /// Returns the number of loaded providers.
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Returns all available provider specs in sorted order.
    pub fn available_specs(&self) -> Vec<String> {
        let mut values: Vec<String> = self.providers.keys().cloned().collect();
        values.sort();
        values
    }

    /// The default model spec string.
    pub fn default_spec(&self) -> &str {
        &self.default
    }
}

/// Split a `<provider>/<model>` spec into its provider id, for health-table
/// lookups (the health tracker is keyed by provider id, not full spec).
pub fn provider_id_of(spec: &str) -> &str {
    spec.split_once('/').map_or(spec, |(provider, _)| provider)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedModelSpec {
    provider: String,
    model: String,
}

fn parse_model_spec(spec: &str) -> Result<ParsedModelSpec, RouterError> {
    let mut split = spec.splitn(2, '/');
    let provider = split.next().unwrap_or_default();
    let model = split.next().unwrap_or_default();
    if provider.is_empty() || model.is_empty() {
        return Err(RouterError::InvalidModelSpec {
            spec: spec.to_owned(),
        });
    }
    Ok(ParsedModelSpec {
        provider: provider.to_owned(),
        model: model.to_owned(),
    })
}

fn instantiate_provider(
    model_spec: &str,
    provider: &str,
    model: &str,
    providers_config: &ProvidersConfig,
    credentials: &Credentials,
) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let meta = provider_meta(provider).ok_or_else(|| RouterError::UnsupportedProvider {
        provider: provider.to_owned(),
    })?;

    let overrides = providers_config.entries.get(provider);
    let base_url = overrides
        .and_then(|o| o.base_url.clone())
        .unwrap_or_else(|| meta.default_base_url.to_owned());

    let provider_instance: Arc<dyn LlmProvider> = match meta.family {
        WireFamily::Anthropic => {
            let creds_auth = resolve_anthropic_auth(credentials).ok_or_else(|| {
                RouterError::MissingCredential {
                    provider: provider.to_owned(),
                    key: "ANTHROPIC_API_KEY or OAuth token".to_owned(),
                }
            })?;
            let auth = super::anthropic::AnthropicAuth::from(&creds_auth);
            Arc::new(AnthropicProvider::new(base_url, model.to_owned(), auth)?)
        }
        WireFamily::Gemini => {
            let api_key = credentials.get(meta.env_key).ok_or_else(|| {
                RouterError::MissingCredential {
                    provider: provider.to_owned(),
                    key: meta.env_key.to_owned(),
                }
            })?;
            Arc::new(GeminiProvider::new(base_url, model.to_owned(), api_key.to_owned())?)
        }
        WireFamily::OpenaiChat => {
            // Local models (Ollama) don't require a key.
            let api_key = credentials
                .get(meta.env_key)
                .map(str::to_owned)
                .unwrap_or_default();
            if api_key.is_empty() && provider != "ollama" {
                return Err(RouterError::MissingCredential {
                    provider: provider.to_owned(),
                    key: meta.env_key.to_owned(),
                }
                .into());
            }

            let quirks = ProviderQuirks {
                provider_id: provider.to_owned(),
                send_openrouter_headers: provider == "openrouter",
                context_window_trim: provider == "ollama",
                model_extras: overrides.map(|o| o.model_extras.clone()).unwrap_or_default(),
                streaming_opt_out: overrides.map(|o| o.streaming_opt_out.clone()).unwrap_or_default(),
                context_windows: overrides.map(|o| o.context_windows.clone()).unwrap_or_default(),
            };

            let streaming = overrides.and_then(|o| o.streaming).unwrap_or(true);
            Arc::new(OpenAiChatProvider::new(
                base_url,
                model.to_owned(),
                api_key,
                quirks,
                streaming,
            )?)
        }
    };

    let _ = model_spec; // kept for call-site logging/error context only.
    Ok(provider_instance)
}

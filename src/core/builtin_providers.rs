//! Built-in provider configuration
//!
//! This module loads the backend table embedded from `builtin_providers.toml`
//! at build time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a backend runs. Local daemons need no credential and get a longer
/// request deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Hosted,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderFeatures {
    #[serde(default)]
    pub tools: bool,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub vision: bool,
    #[serde(default)]
    pub reasoning: bool,
    /// Accepts `stream_options.include_usage` and sends a usage frame.
    #[serde(default)]
    pub stream_usage: bool,
}

/// Which request member carries the output-token cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaxTokensField {
    #[default]
    MaxTokens,
    MaxCompletionTokens,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostTier {
    pub model_pattern: String,
    pub input_per_1m: f64,
    pub output_per_1m: f64,
}

fn default_true() -> bool {
    true
}

fn default_context_limit() -> u32 {
    32768
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_true")]
    pub api_key_required: bool,
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default)]
    pub features: ProviderFeatures,
    pub default_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_model: Option<String>,
    #[serde(default = "default_context_limit")]
    pub context_limit: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_tokens_field: MaxTokensField,
    /// Model-name prefixes that must be driven through the channel codec.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channel_models: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cost_tiers: Vec<CostTier>,
}

impl ProviderConfig {
    pub fn is_local(&self) -> bool {
        self.kind == ProviderKind::Local
    }

    pub fn requires_credential(&self) -> bool {
        self.api_key_required && !self.is_local()
    }

    pub fn uses_channel_protocol(&self, model: &str) -> bool {
        self.channel_models
            .iter()
            .any(|prefix| model.starts_with(prefix.as_str()))
    }
}

#[derive(Debug, Deserialize)]
struct BuiltinProvidersConfig {
    providers: Vec<ProviderConfig>,
}

const CONFIG_CONTENT: &str = include_str!("../builtin_providers.toml");

/// Load built-in providers from the embedded configuration.
pub fn load_builtin_providers() -> Result<Vec<ProviderConfig>, toml::de::Error> {
    let config: BuiltinProvidersConfig = toml::from_str(CONFIG_CONTENT)?;
    Ok(config.providers)
}

/// Find a built-in provider by ID (case-insensitive)
pub fn find_builtin_provider(id: &str) -> Option<ProviderConfig> {
    load_builtin_providers()
        .ok()?
        .into_iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_builtin_providers() {
        let providers = load_builtin_providers().unwrap();
        let ids: Vec<&str> = providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["openai", "openrouter", "deepinfra", "cerebras", "groq", "deepseek", "ollama"]
        );
    }

    #[test]
    fn test_find_builtin_provider() {
        let provider = find_builtin_provider("OpenAI").unwrap();
        assert_eq!(provider.id, "openai");
        assert_eq!(provider.max_tokens_field, MaxTokensField::MaxCompletionTokens);

        assert!(find_builtin_provider("nonexistent").is_none());
    }

    #[test]
    fn ollama_is_a_local_daemon_without_credentials() {
        let ollama = find_builtin_provider("ollama").unwrap();
        assert!(ollama.is_local());
        assert!(!ollama.requires_credential());
        assert!(ollama.api_key_env.is_none());
        assert!(ollama.timeout_secs > find_builtin_provider("openai").unwrap().timeout_secs);
    }

    #[test]
    fn channel_models_match_by_prefix() {
        let deepinfra = find_builtin_provider("deepinfra").unwrap();
        assert!(deepinfra.uses_channel_protocol("openai/gpt-oss-120b"));
        assert!(!deepinfra.uses_channel_protocol("meta-llama/Llama-3.3-70B-Instruct"));
    }

    #[test]
    fn test_provider_properties() {
        for provider in load_builtin_providers().unwrap() {
            assert!(!provider.id.is_empty());
            assert!(!provider.display_name.is_empty());
            assert!(!provider.default_model.is_empty());
            assert!(!provider.cost_tiers.is_empty());
            if provider.is_local() {
                assert!(provider.base_url.starts_with("http://localhost"));
            } else {
                assert!(provider.base_url.starts_with("https://"));
                assert!(provider.api_key_env.is_some());
            }
        }
    }
}

use std::time::Duration;

use crate::api::ReasoningLevel;
use crate::core::builtin_providers::ProviderConfig;
use crate::core::config::data::Config;
use crate::core::dispatcher::DEFAULT_MAX_ATTEMPTS;
use crate::core::transport::TransportSettings;

pub const PROVIDER_ENV_VAR: &str = "CHATWIRE_PROVIDER";
pub const TIMEOUT_ENV_VAR: &str = "CHATWIRE_API_TIMEOUT";

pub const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;

/// Fallback order when the config does not override it.
pub const DEFAULT_PROVIDER_PRIORITY: &[&str] = &[
    "openai",
    "openrouter",
    "deepinfra",
    "cerebras",
    "groq",
    "deepseek",
    "ollama",
];

/// Parse `90`, `90s` or `2m` into a duration.
pub fn parse_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (number, scale) = if let Some(minutes) = value.strip_suffix('m') {
        (minutes, 60)
    } else if let Some(seconds) = value.strip_suffix('s') {
        (seconds, 1)
    } else {
        (value, 1)
    };
    number
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|n| *n > 0)
        .map(|n| Duration::from_secs(n * scale))
}

/// `CHATWIRE_PROVIDER`, if set and non-blank.
pub fn env_provider() -> Option<String> {
    std::env::var(PROVIDER_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_timeout() -> Option<Duration> {
    std::env::var(TIMEOUT_ENV_VAR)
        .ok()
        .and_then(|value| parse_timeout(&value))
}

impl Config {
    pub fn get_default_model(&self, provider: &str) -> Option<&String> {
        let normalized = provider.to_lowercase();
        self.default_models
            .get(&normalized)
            .or_else(|| self.default_models.get(provider))
    }

    pub fn set_default_model(&mut self, provider: String, model: String) {
        let normalized = provider.to_lowercase();
        self.default_models.insert(normalized.clone(), model);
        if normalized != provider {
            self.default_models.remove(&provider);
        }
    }

    pub fn unset_default_model(&mut self, provider: &str) {
        let normalized = provider.to_lowercase();
        self.default_models.remove(&normalized);
        if normalized != provider {
            self.default_models.remove(provider);
        }
    }

    /// Configured model for `provider`, else the provider's own default.
    pub fn model_for(&self, provider: &ProviderConfig) -> String {
        self.get_default_model(&provider.id)
            .cloned()
            .unwrap_or_else(|| provider.default_model.clone())
    }

    pub fn reasoning_level(&self) -> ReasoningLevel {
        self.reasoning.unwrap_or_default()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1)
    }

    pub fn provider_priority(&self) -> Vec<String> {
        if self.provider_priority.is_empty() {
            DEFAULT_PROVIDER_PRIORITY
                .iter()
                .map(|id| id.to_string())
                .collect()
        } else {
            self.provider_priority
                .iter()
                .map(|id| id.trim().to_lowercase())
                .collect()
        }
    }

    /// Per-attempt deadline for `provider`.
    ///
    /// Hosted backends honor `CHATWIRE_API_TIMEOUT`, then
    /// `request_timeout_secs`; local daemons use `local_request_timeout_secs`.
    /// Either falls back to the provider entry's own timeout.
    pub fn request_timeout(&self, provider: &ProviderConfig) -> Duration {
        let configured = if provider.is_local() {
            self.local_request_timeout_secs.map(Duration::from_secs)
        } else {
            env_timeout().or_else(|| self.request_timeout_secs.map(Duration::from_secs))
        };
        configured
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or_else(|| Duration::from_secs(provider.timeout_secs))
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(
            self.stream_idle_timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_STREAM_IDLE_TIMEOUT_SECS),
        )
    }

    pub fn transport_settings(&self, provider: &ProviderConfig) -> TransportSettings {
        TransportSettings {
            request_timeout: self.request_timeout(provider),
            stream_idle_timeout: self.stream_idle_timeout(),
            strict_stream: self.strict_stream.unwrap_or(false),
        }
    }
}

//! Credential lookup for backends.
//!
//! Only presence matters to the engine; where keys come from is up to the
//! [`CredentialSource`] implementation.

use std::collections::HashMap;

use crate::core::builtin_providers::ProviderConfig;

pub trait CredentialSource: Send + Sync {
    /// API key for `provider`, if one is configured.
    fn api_key(&self, provider: &ProviderConfig) -> Option<String>;

    /// Whether requests to `provider` can be authenticated.
    fn has_credential(&self, provider: &ProviderConfig) -> bool {
        !provider.requires_credential() || self.api_key(provider).is_some()
    }
}

/// Reads each provider's `api_key_env` variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn api_key(&self, provider: &ProviderConfig) -> Option<String> {
        let var = provider.api_key_env.as_deref()?;
        std::env::var(var)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// Fixed provider-id → key table, for embedding callers and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    keys: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, provider: &str, key: impl Into<String>) -> Self {
        self.keys.insert(provider.to_lowercase(), key.into());
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn api_key(&self, provider: &ProviderConfig) -> Option<String> {
        self.keys.get(&provider.id.to_lowercase()).cloned()
    }
}

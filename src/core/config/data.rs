use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::api::ReasoningLevel;
use crate::core::builtin_providers::ProviderConfig;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    pub default_provider: Option<String>,
    /// Written after every successful request from the CLI.
    pub last_used_provider: Option<String>,
    /// Provider id (lowercase) → model name.
    #[serde(default)]
    pub default_models: HashMap<String, String>,
    pub reasoning: Option<ReasoningLevel>,
    pub max_attempts: Option<u32>,
    /// Per-attempt deadline for hosted backends.
    pub request_timeout_secs: Option<u64>,
    /// Per-attempt deadline for local daemons.
    pub local_request_timeout_secs: Option<u64>,
    pub stream_idle_timeout_secs: Option<u64>,
    pub strict_stream: Option<bool>,
    /// Extra backends, same shape as the built-in table. An entry reusing a
    /// built-in id replaces it.
    #[serde(default)]
    pub custom_providers: Vec<ProviderConfig>,
    /// Replaces the built-in fallback order when non-empty.
    #[serde(default)]
    pub provider_priority: Vec<String>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn add_custom_provider(&mut self, provider: ProviderConfig) {
        self.remove_custom_provider(&provider.id);
        self.custom_providers.push(provider);
    }

    pub fn remove_custom_provider(&mut self, id: &str) {
        self.custom_providers
            .retain(|p| !p.id.eq_ignore_ascii_case(id));
    }

    pub fn get_custom_provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.custom_providers
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(id))
    }
}

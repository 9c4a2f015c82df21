//! Provider/model registry: endpoints, feature flags, context limits and
//! pricing for every known backend.

use crate::api::Usage;
use crate::core::builtin_providers::{load_builtin_providers, ProviderConfig};

/// Output-token cap bounds applied when the caller sets none.
pub const MIN_OUTPUT_TOKENS: u32 = 1000;
pub const MAX_OUTPUT_TOKENS: u32 = 16000;
const CONTEXT_SAFETY_MARGIN: i64 = 1000;
const TOKENS_PER_TOOL: usize = 200;

const FALLBACK_INPUT_PER_1K: f64 = 0.001;
const FALLBACK_OUTPUT_PER_1K: f64 = 0.002;

/// Explicitly constructed provider table, passed to whatever needs it.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        Self { providers }
    }

    /// The embedded built-in table.
    pub fn builtin() -> Result<Self, toml::de::Error> {
        Ok(Self::new(load_builtin_providers()?))
    }

    /// Add `custom` entries; an entry whose id matches an existing one
    /// replaces it in place.
    pub fn with_custom(mut self, custom: &[ProviderConfig]) -> Self {
        for provider in custom {
            match self
                .providers
                .iter_mut()
                .find(|existing| existing.id.eq_ignore_ascii_case(&provider.id))
            {
                Some(existing) => *existing = provider.clone(),
                None => self.providers.push(provider.clone()),
            }
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<&ProviderConfig> {
        let id = id.trim();
        self.providers
            .iter()
            .find(|provider| provider.id.eq_ignore_ascii_case(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id.as_str()).collect()
    }

    /// First local-daemon entry, if the table has one.
    pub fn local_daemon(&self) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.is_local())
    }
}

/// Estimated cost in dollars of one request.
///
/// The first tier whose pattern equals the model or is `*` wins, then the
/// first tier whose pattern is a substring of the model. Unknown models are
/// priced at a conservative fallback rate; local daemons are free.
pub fn estimate_cost(
    provider: &ProviderConfig,
    model: &str,
    input_tokens: u64,
    output_tokens: u64,
) -> f64 {
    if provider.is_local() {
        return 0.0;
    }

    let tier = provider
        .cost_tiers
        .iter()
        .find(|tier| tier.model_pattern == model || tier.model_pattern == "*")
        .or_else(|| {
            provider
                .cost_tiers
                .iter()
                .find(|tier| model.contains(tier.model_pattern.as_str()))
        });

    let input = input_tokens as f64;
    let output = output_tokens as f64;
    match tier {
        Some(tier) => {
            input * tier.input_per_1m / 1_000_000.0 + output * tier.output_per_1m / 1_000_000.0
        }
        None => input * FALLBACK_INPUT_PER_1K / 1000.0 + output * FALLBACK_OUTPUT_PER_1K / 1000.0,
    }
}

/// Fill `usage.estimated_cost`, preferring a backend-reported cost.
pub fn apply_cost(provider: &ProviderConfig, model: &str, usage: &mut Usage) {
    usage.estimated_cost = match usage.cost {
        Some(reported) => reported,
        None => estimate_cost(provider, model, usage.prompt_tokens, usage.completion_tokens),
    };
}

/// Rough input size: a quarter token per byte plus a flat amount per tool.
pub fn estimate_input_tokens<'a>(
    contents: impl IntoIterator<Item = &'a str>,
    tool_count: usize,
) -> u64 {
    let text: usize = contents.into_iter().map(|content| content.len() / 4).sum();
    (text + TOKENS_PER_TOOL * tool_count) as u64
}

/// Output cap that leaves room for the prompt inside the context window.
pub fn output_token_cap(context_limit: u32, estimated_input: u64) -> u32 {
    let available = i64::from(context_limit)
        .saturating_sub(i64::try_from(estimated_input).unwrap_or(i64::MAX))
        .saturating_sub(CONTEXT_SAFETY_MARGIN);
    let bounded = available.clamp(i64::from(MIN_OUTPUT_TOKENS), i64::from(MAX_OUTPUT_TOKENS));
    u32::try_from(bounded).unwrap_or(MAX_OUTPUT_TOKENS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builtin_providers::{CostTier, ProviderKind};

    fn registry() -> ProviderRegistry {
        ProviderRegistry::builtin().unwrap()
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = registry();
        assert_eq!(registry.get(" DeepInfra ").unwrap().id, "deepinfra");
        assert!(registry.get("nope").is_none());
        assert_eq!(registry.local_daemon().unwrap().id, "ollama");
    }

    #[test]
    fn custom_entries_override_and_extend() {
        let mut groq = registry().get("groq").unwrap().clone();
        groq.base_url = "https://proxy.internal/groq".to_string();
        let mut lab = groq.clone();
        lab.id = "lab".to_string();
        lab.display_name = "Lab".to_string();

        let registry = registry().with_custom(&[groq, lab]);
        assert_eq!(registry.get("groq").unwrap().base_url, "https://proxy.internal/groq");
        assert_eq!(registry.ids().last(), Some(&"lab"));
        assert_eq!(registry.ids().iter().filter(|id| **id == "groq").count(), 1);
    }

    #[test]
    fn cost_uses_exact_then_wildcard_tiers() {
        let registry = registry();
        let openai = registry.get("openai").unwrap();
        let cost = estimate_cost(openai, "gpt-4o", 1_000_000, 1_000_000);
        assert!((cost - 12.50).abs() < 1e-9);

        let deepinfra = registry.get("deepinfra").unwrap();
        let cost = estimate_cost(deepinfra, "anything", 2_000_000, 0);
        assert!((cost - 0.54).abs() < 1e-9);
    }

    #[test]
    fn cost_falls_back_to_substring_then_default_rate() {
        let registry = registry();
        let openai = registry.get("openai").unwrap();
        let cost = estimate_cost(openai, "gpt-4o-mini-2024-07-18", 1_000_000, 0);
        assert!((cost - 0.15).abs() < 1e-9);

        let cost = estimate_cost(openai, "unlisted-model", 1000, 1000);
        assert!((cost - 0.003).abs() < 1e-12);
    }

    #[test]
    fn local_daemon_is_free() {
        let registry = registry();
        let ollama = registry.get("ollama").unwrap();
        assert_eq!(estimate_cost(ollama, "llama3.2", 10_000, 10_000), 0.0);
    }

    #[test]
    fn reported_cost_takes_precedence() {
        let provider = ProviderConfig {
            cost_tiers: vec![CostTier {
                model_pattern: "*".to_string(),
                input_per_1m: 100.0,
                output_per_1m: 100.0,
            }],
            kind: ProviderKind::Hosted,
            ..registry().get("openrouter").unwrap().clone()
        };
        let mut usage = Usage {
            prompt_tokens: 10,
            completion_tokens: 10,
            cost: Some(0.0042),
            ..Usage::default()
        };
        apply_cost(&provider, "x", &mut usage);
        assert_eq!(usage.estimated_cost, 0.0042);

        usage.cost = None;
        apply_cost(&provider, "x", &mut usage);
        assert!((usage.estimated_cost - 0.002).abs() < 1e-12);
    }

    #[test]
    fn output_cap_is_clamped() {
        assert_eq!(output_token_cap(128_000, 1_000), MAX_OUTPUT_TOKENS);
        assert_eq!(output_token_cap(8_192, 1_000), 6_192);
        assert_eq!(output_token_cap(4_096, 10_000), MIN_OUTPUT_TOKENS);
    }

    #[test]
    fn input_estimate_counts_tools() {
        let estimate = estimate_input_tokens(["abcdefgh", "abcd"], 2);
        assert_eq!(estimate, 2 + 1 + 400);
    }
}

//! Handlers for each configurable key.

use crate::api::ReasoningLevel;
use crate::cli::settings::error::SettingError;
use crate::cli::settings::SettingHandler;
use crate::core::builtin_providers::find_builtin_provider;
use crate::core::config::data::Config;
use crate::core::config::defaults::parse_timeout;

/// Accepts: on/off, true/false, yes/no, 1/0 (case-insensitive).
pub fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Resolve a provider id against built-in and custom providers.
pub fn validate_provider(config: &Config, input: &str) -> Result<String, SettingError> {
    if let Some(provider) = config.get_custom_provider(input) {
        return Ok(provider.id.clone());
    }
    if let Some(provider) = find_builtin_provider(input) {
        return Ok(provider.id);
    }
    Err(SettingError::UnknownProvider {
        input: input.to_string(),
    })
}

pub struct DefaultProviderHandler;

impl SettingHandler for DefaultProviderHandler {
    fn key(&self) -> &'static str {
        "default-provider"
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        let input = args.first().ok_or(SettingError::MissingArgs {
            hint: "Specify the provider to use by default:",
            example: "chatwire set default-provider groq",
        })?;
        let provider = validate_provider(config, input)?;
        let message = format!("✅ Set default-provider to: {provider}");
        config.default_provider = Some(provider);
        Ok(message)
    }

    fn unset(&self, _arg: Option<&str>, config: &mut Config) -> Result<String, SettingError> {
        config.default_provider = None;
        Ok("✅ Unset default-provider".to_string())
    }

    fn format(&self, config: &Config) -> String {
        match &config.default_provider {
            Some(provider) => format!("  default-provider: {provider}"),
            None => "  default-provider: (unset)".to_string(),
        }
    }
}

pub struct DefaultModelHandler;

impl SettingHandler for DefaultModelHandler {
    fn key(&self) -> &'static str {
        "default-model"
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        if args.len() < 2 {
            return Err(SettingError::MissingArgs {
                hint: "To set a default model, specify the provider and model:",
                example: "chatwire set default-model deepinfra openai/gpt-oss-120b",
            });
        }
        let provider = validate_provider(config, &args[0])?;
        let model = args[1..].join(" ");
        let message = format!("✅ Set default-model for provider '{provider}' to: {model}");
        config.set_default_model(provider, model);
        Ok(message)
    }

    fn unset(&self, arg: Option<&str>, config: &mut Config) -> Result<String, SettingError> {
        let input = arg.ok_or(SettingError::MissingArgs {
            hint: "To unset a default model, specify the provider:",
            example: "chatwire unset default-model deepinfra",
        })?;
        let provider = validate_provider(config, input)?;
        config.unset_default_model(&provider);
        Ok(format!("✅ Unset default-model for provider: {provider}"))
    }

    fn format(&self, config: &Config) -> String {
        if config.default_models.is_empty() {
            return "  default-models: (none set)".to_string();
        }
        let mut entries: Vec<_> = config.default_models.iter().collect();
        entries.sort_by_key(|(provider, _)| *provider);
        let mut output = String::from("  default-models:");
        for (provider, model) in entries {
            output.push_str(&format!("\n    {provider}: {model}"));
        }
        output
    }
}

pub struct ReasoningHandler;

impl SettingHandler for ReasoningHandler {
    fn key(&self) -> &'static str {
        "reasoning"
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        let input = args.first().ok_or(SettingError::MissingArgs {
            hint: "Specify a reasoning level:",
            example: "chatwire set reasoning medium",
        })?;
        let level: ReasoningLevel = input.parse().map_err(|_| SettingError::InvalidValue {
            key: "reasoning",
            input: input.clone(),
            expected: "low, medium or high",
        })?;
        config.reasoning = Some(level);
        Ok(format!("✅ Set reasoning to: {level}"))
    }

    fn unset(&self, _arg: Option<&str>, config: &mut Config) -> Result<String, SettingError> {
        config.reasoning = None;
        Ok(format!(
            "✅ Unset reasoning (will use default: {})",
            ReasoningLevel::default()
        ))
    }

    fn format(&self, config: &Config) -> String {
        format!("  reasoning: {}", config.reasoning_level())
    }
}

/// Data-driven handler for on/off settings.
pub struct BooleanHandler {
    key: &'static str,
    example: &'static str,
    get: fn(&Config) -> Option<bool>,
    set_field: fn(&mut Config, Option<bool>),
}

impl SettingHandler for BooleanHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        let input = args.first().ok_or(SettingError::MissingArgs {
            hint: "Specify on or off:",
            example: self.example,
        })?;
        let value = parse_bool(input).ok_or_else(|| SettingError::InvalidBoolean(input.clone()))?;
        (self.set_field)(config, Some(value));
        Ok(format!("✅ Set {} to: {}", self.key, format_bool(value)))
    }

    fn unset(&self, _arg: Option<&str>, config: &mut Config) -> Result<String, SettingError> {
        (self.set_field)(config, None);
        Ok(format!("✅ Unset {} (will use default: off)", self.key))
    }

    fn format(&self, config: &Config) -> String {
        let value = (self.get)(config).unwrap_or(false);
        format!("  {}: {}", self.key, format_bool(value))
    }
}

pub fn strict_stream_handler() -> BooleanHandler {
    BooleanHandler {
        key: "strict-stream",
        example: "chatwire set strict-stream on",
        get: |config| config.strict_stream,
        set_field: |config, value| config.strict_stream = value,
    }
}

/// Data-driven handler for positive integer settings.
pub struct NumberHandler {
    key: &'static str,
    example: &'static str,
    expected: &'static str,
    unit: &'static str,
    default_display: &'static str,
    parse: fn(&str) -> Option<u64>,
    get: fn(&Config) -> Option<u64>,
    set_field: fn(&mut Config, Option<u64>),
}

impl SettingHandler for NumberHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        let input = args.first().ok_or(SettingError::MissingArgs {
            hint: "Specify a value:",
            example: self.example,
        })?;
        let value = (self.parse)(input).ok_or_else(|| SettingError::InvalidValue {
            key: self.key,
            input: input.clone(),
            expected: self.expected,
        })?;
        (self.set_field)(config, Some(value));
        Ok(format!("✅ Set {} to: {value}{}", self.key, self.unit))
    }

    fn unset(&self, _arg: Option<&str>, config: &mut Config) -> Result<String, SettingError> {
        (self.set_field)(config, None);
        Ok(format!(
            "✅ Unset {} (will use default: {})",
            self.key, self.default_display
        ))
    }

    fn format(&self, config: &Config) -> String {
        match (self.get)(config) {
            Some(value) => format!("  {}: {value}{}", self.key, self.unit),
            None => format!("  {}: ({})", self.key, self.default_display),
        }
    }
}

fn parse_timeout_secs(input: &str) -> Option<u64> {
    parse_timeout(input).map(|duration| duration.as_secs())
}

pub fn max_attempts_handler() -> NumberHandler {
    NumberHandler {
        key: "max-attempts",
        example: "chatwire set max-attempts 2",
        expected: "a whole number from 1 to 10",
        unit: "",
        default_display: "3",
        parse: |input| input.trim().parse::<u64>().ok().filter(|n| (1..=10).contains(n)),
        get: |config| config.max_attempts.map(u64::from),
        set_field: |config, value| {
            config.max_attempts = value.and_then(|n| u32::try_from(n).ok());
        },
    }
}

pub fn request_timeout_handler() -> NumberHandler {
    NumberHandler {
        key: "request-timeout",
        example: "chatwire set request-timeout 90s",
        expected: "seconds, optionally suffixed with s or m",
        unit: "s",
        default_display: "provider default",
        parse: parse_timeout_secs,
        get: |config| config.request_timeout_secs,
        set_field: |config, value| config.request_timeout_secs = value,
    }
}

pub fn local_request_timeout_handler() -> NumberHandler {
    NumberHandler {
        key: "local-request-timeout",
        example: "chatwire set local-request-timeout 10m",
        expected: "seconds, optionally suffixed with s or m",
        unit: "s",
        default_display: "provider default",
        parse: parse_timeout_secs,
        get: |config| config.local_request_timeout_secs,
        set_field: |config, value| config.local_request_timeout_secs = value,
    }
}

pub fn stream_idle_timeout_handler() -> NumberHandler {
    NumberHandler {
        key: "stream-idle-timeout",
        example: "chatwire set stream-idle-timeout 30",
        expected: "seconds, optionally suffixed with s or m",
        unit: "s",
        default_display: "60s",
        parse: parse_timeout_secs,
        get: |config| config.stream_idle_timeout_secs,
        set_field: |config, value| config.stream_idle_timeout_secs = value,
    }
}

pub struct ProviderPriorityHandler;

impl SettingHandler for ProviderPriorityHandler {
    fn key(&self) -> &'static str {
        "provider-priority"
    }

    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError> {
        let inputs: Vec<&str> = args
            .iter()
            .flat_map(|arg| arg.split(','))
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect();
        if inputs.is_empty() {
            return Err(SettingError::MissingArgs {
                hint: "List providers in the order they should be tried:",
                example: "chatwire set provider-priority groq,openai,ollama",
            });
        }
        let mut priority = Vec::with_capacity(inputs.len());
        for input in inputs {
            let provider = validate_provider(config, input)?;
            if !priority.contains(&provider) {
                priority.push(provider);
            }
        }
        let message = format!("✅ Set provider-priority to: {}", priority.join(", "));
        config.provider_priority = priority;
        Ok(message)
    }

    fn unset(&self, _arg: Option<&str>, config: &mut Config) -> Result<String, SettingError> {
        config.provider_priority.clear();
        Ok("✅ Unset provider-priority (will use built-in order)".to_string())
    }

    fn format(&self, config: &Config) -> String {
        format!("  provider-priority: {}", config.provider_priority().join(", "))
    }
}

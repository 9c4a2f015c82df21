//! Registry of setting handlers.

use std::collections::HashMap;

use super::error::SettingError;
use super::handlers::{
    local_request_timeout_handler, max_attempts_handler, request_timeout_handler,
    stream_idle_timeout_handler, strict_stream_handler, DefaultModelHandler,
    DefaultProviderHandler, ProviderPriorityHandler, ReasoningHandler,
};
use super::SettingHandler;
use crate::core::config::data::Config;

pub struct SettingRegistry {
    handlers: HashMap<&'static str, Box<dyn SettingHandler>>,
    /// Keys in display order for `chatwire set` output.
    display_order: Vec<&'static str>,
}

impl SettingRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
            display_order: Vec::new(),
        };

        registry.register(Box::new(DefaultProviderHandler));
        registry.register(Box::new(DefaultModelHandler));
        registry.register(Box::new(ReasoningHandler));
        registry.register(Box::new(max_attempts_handler()));
        registry.register(Box::new(request_timeout_handler()));
        registry.register(Box::new(local_request_timeout_handler()));
        registry.register(Box::new(stream_idle_timeout_handler()));
        registry.register(Box::new(strict_stream_handler()));
        registry.register(Box::new(ProviderPriorityHandler));

        registry
    }

    fn register(&mut self, handler: Box<dyn SettingHandler>) {
        let key = handler.key();
        self.display_order.push(key);
        self.handlers.insert(key, handler);
    }

    pub fn get(&self, key: &str) -> Result<&dyn SettingHandler, SettingError> {
        self.handlers
            .get(key)
            .map(|handler| handler.as_ref())
            .ok_or_else(|| SettingError::UnknownKey(key.to_string()))
    }

    /// Every key's current value, one block per key.
    pub fn render(&self, config: &Config) -> String {
        let mut output = String::from("Current configuration:");
        for key in &self.display_order {
            if let Some(handler) = self.handlers.get(key) {
                output.push('\n');
                output.push_str(&handler.format(config));
            }
        }
        output
    }
}

impl Default for SettingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

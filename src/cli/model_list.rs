//! Model listing functionality
//!
//! This module lists the models a provider advertises on its models endpoint.

use std::error::Error;

use chrono::{DateTime, Utc};

use crate::api::models::{sort_models, ModelInfo};
use crate::core::client::ChatClient;
use crate::core::config::Config;
use crate::core::credentials::EnvCredentials;
use crate::core::failover::{determine_provider, ProviderSelection};
use crate::core::providers::ProviderRegistry;

/// Creation date of a model entry, accepting seconds or milliseconds.
pub fn format_created(created: u64) -> Option<String> {
    if created == 0 {
        return None;
    }
    let secs = if created > 10_000_000_000 {
        created / 1000
    } else {
        created
    };
    let secs = i64::try_from(secs).ok()?;
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.format("%Y-%m-%d").to_string())
}

fn describe(model: &ModelInfo, default_model: &str) -> String {
    let mut line = format!("  • {}", model.id);
    if model.id == default_model {
        line.push_str(" (default)");
    }
    if let Some(created) = model.created.and_then(format_created) {
        line.push_str(&format!("  created {created}"));
    }
    if let Some(owner) = model
        .owned_by
        .as_deref()
        .filter(|o| !o.is_empty() && *o != "system")
    {
        line.push_str(&format!("  by {owner}"));
    }
    line
}

pub async fn list_models(provider: Option<String>) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let registry = ProviderRegistry::builtin()?.with_custom(&config.custom_providers);
    let selection = ProviderSelection::from_config(&config, provider.as_deref());
    let provider = determine_provider(&registry, &EnvCredentials, &selection)?;
    let client = ChatClient::connect(&registry, &provider.id, &EnvCredentials, &config)?;

    println!("Available models for {}", provider.display_name);
    println!();

    let mut models = client.list_models().await?.data;
    if models.is_empty() {
        println!("No models found for this provider.");
        return Ok(());
    }
    sort_models(&mut models);

    println!("Found {} models (sorted newest first):", models.len());
    for model in &models {
        println!("{}", describe(model, client.model()));
    }
    Ok(())
}

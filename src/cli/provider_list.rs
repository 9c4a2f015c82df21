use std::error::Error;

use crate::core::builtin_providers::ProviderConfig;
use crate::core::config::Config;
use crate::core::credentials::{CredentialSource, EnvCredentials};
use crate::core::providers::ProviderRegistry;

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRow {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    pub credential: String,
}

fn credential_status(provider: &ProviderConfig, credentials: &dyn CredentialSource) -> String {
    if !provider.requires_credential() {
        return "not needed".to_string();
    }
    let env_var = provider.api_key_env.as_deref().unwrap_or("?");
    if credentials.api_key(provider).is_some() {
        format!("✅ {env_var}")
    } else {
        format!("❌ {env_var}")
    }
}

pub fn provider_rows(
    registry: &ProviderRegistry,
    credentials: &dyn CredentialSource,
    default_provider: Option<&str>,
) -> Vec<ProviderRow> {
    registry
        .iter()
        .map(|provider| {
            let is_default =
                default_provider.is_some_and(|d| d.trim().eq_ignore_ascii_case(&provider.id));
            ProviderRow {
                id: if is_default {
                    format!("{}*", provider.id)
                } else {
                    provider.id.clone()
                },
                display_name: provider.display_name.clone(),
                base_url: provider.base_url.clone(),
                credential: credential_status(provider, credentials),
            }
        })
        .collect()
}

/// Left-aligned columns separated by two spaces.
pub fn render_table(rows: &[ProviderRow]) -> String {
    let header = ["Provider", "Display Name", "URL", "Credential"];
    let cells: Vec<[&str; 4]> = rows
        .iter()
        .map(|row| {
            [
                row.id.as_str(),
                row.display_name.as_str(),
                row.base_url.as_str(),
                row.credential.as_str(),
            ]
        })
        .collect();

    let mut widths = header.map(|h| h.chars().count());
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for row in std::iter::once(&header).chain(cells.iter()) {
        let line: Vec<String> = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }
    out
}

pub fn list_providers() -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let registry = ProviderRegistry::builtin()?.with_custom(&config.custom_providers);
    let rows = provider_rows(&registry, &EnvCredentials, config.default_provider.as_deref());

    if rows.is_empty() {
        println!("No providers configured.");
        return Ok(());
    }

    println!("Configured Providers:\n");
    print!("{}", render_table(&rows));
    if config.default_provider.is_some() {
        println!("\n* = default provider");
    }
    Ok(())
}

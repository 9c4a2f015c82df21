//! Authentication utilities for API requests
//!
//! This module adds the credential and any provider-specific headers to an
//! outbound HTTP request.

use crate::core::builtin_providers::ProviderConfig;

/// Add provider-specific authentication headers to an HTTP request
///
/// Every supported backend speaks OpenAI-style `Authorization: Bearer`.
/// Local daemons run without a key, in which case no credential header is
/// sent. Static `extra_headers` from the provider entry are always attached.
pub fn add_auth_headers(
    request: reqwest::RequestBuilder,
    provider: &ProviderConfig,
    api_key: Option<&str>,
) -> reqwest::RequestBuilder {
    let request = provider
        .extra_headers
        .iter()
        .fold(request, |request, (name, value)| {
            request.header(name.as_str(), value.as_str())
        });

    match api_key.filter(|key| !key.is_empty()) {
        Some(key) => request.header("Authorization", format!("Bearer {key}")),
        None => request,
    }
}

//! Endpoint URL construction for provider base URLs.

/// Strip trailing slashes so endpoints can be appended with a single `/`.
///
/// ```
/// use chatwire::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:11434/v1/"), "http://localhost:11434/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> &str {
    base_url.trim().trim_end_matches('/')
}

/// Join a provider base URL (the API root, e.g. `https://api.groq.com/openai/v1`)
/// and an endpoint path.
///
/// ```
/// use chatwire::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.deepseek.com/v1/", "/chat/completions"),
///     "https://api.deepseek.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        normalize_base_url(base_url),
        endpoint.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_slashes_and_whitespace() {
        assert_eq!(normalize_base_url("https://api.openai.com/v1"), "https://api.openai.com/v1");
        assert_eq!(normalize_base_url(" https://api.openai.com/v1/// "), "https://api.openai.com/v1");
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn endpoints_join_with_exactly_one_slash() {
        for base in ["http://127.0.0.1:8080/v1", "http://127.0.0.1:8080/v1/"] {
            for endpoint in ["models", "/models", "///models"] {
                assert_eq!(
                    construct_api_url(base, endpoint),
                    "http://127.0.0.1:8080/v1/models"
                );
            }
        }
        assert_eq!(
            construct_api_url("https://api.deepinfra.com/v1/openai", "chat/completions"),
            "https://api.deepinfra.com/v1/openai/chat/completions"
        );
    }
}

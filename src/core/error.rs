//! Error taxonomy shared by the transport, dispatcher and façade.

use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = ChatError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("{provider} API error (status {status}): {message}")]
    Http {
        status: u16,
        provider: String,
        message: String,
    },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("stream interrupted after output was delivered: {0}")]
    StreamInterrupted(Box<ChatError>),

    #[error("request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ChatError> },

    #[error("{provider} does not support {capability}")]
    Unsupported {
        provider: String,
        capability: &'static str,
    },

    #[error("{provider} requires the {env_var} environment variable")]
    MissingCredential { provider: String, env_var: String },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("no available providers{}", describe_attempts(.attempts))]
    NoBackendAvailable { attempts: Vec<(String, String)> },

    #[error("request cancelled")]
    Cancelled,

    #[error("failed to build request: {0}")]
    Request(String),
}

fn describe_attempts(attempts: &[(String, String)]) -> String {
    if attempts.is_empty() {
        return String::new();
    }
    let joined = attempts
        .iter()
        .map(|(provider, reason)| format!("{provider}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ");
    format!(" ({joined})")
}

impl ChatError {
    /// Timeout, rate limiting and transient network failures are retried by
    /// the dispatcher; everything else propagates on the first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChatError::Timeout(_) | ChatError::RateLimited { .. } | ChatError::TransientNetwork(_)
        )
    }

    /// Whether the failover chain may try another backend after this error.
    pub fn allows_failover(&self) -> bool {
        !matches!(self, ChatError::StreamInterrupted(_) | ChatError::Cancelled)
    }

    /// Classify a transport failure message by its known signatures.
    pub fn from_transport_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("deadline exceeded")
        {
            ChatError::Timeout(message)
        } else if lower.contains("connection reset")
            || lower.contains("broken pipe")
            || lower.contains("eof")
            || lower.contains("connection closed")
        {
            ChatError::TransientNetwork(message)
        } else {
            ChatError::Request(message)
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ChatError::Timeout(err.to_string());
        }
        if err.is_decode() {
            return ChatError::Parse(err.to_string());
        }
        if err.is_builder() {
            return ChatError::Request(err.to_string());
        }

        // reqwest wraps the hyper/io cause; the signatures live in the chain.
        let mut detail = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        match ChatError::from_transport_message(detail) {
            ChatError::Request(message) if err.is_body() => ChatError::TransientNetwork(message),
            classified => classified,
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Parse(err.to_string())
    }
}

/// Pull a one-line message out of a backend error body.
pub fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
}

/// The backend's own message when the body carries one, else the raw body.
pub fn api_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty response body>".to_string();
    }

    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|value| extract_error_summary(&value))
        .unwrap_or_else(|| trimmed.to_string())
}

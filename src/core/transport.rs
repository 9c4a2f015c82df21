//! One HTTP attempt against an OpenAI-compatible backend.
//!
//! Retries live in the dispatcher; this layer only performs a single call and
//! classifies whatever went wrong.

use std::ops::ControlFlow;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::time::Instant;
use tracing::debug;

use crate::api::models::ModelsResponse;
use crate::api::{ChatRequest, ChatResponse};
use crate::core::accumulator::StreamAccumulator;
use crate::core::builtin_providers::ProviderConfig;
use crate::core::dispatcher::parse_retry_after;
use crate::core::error::{api_error_message, extract_error_summary, ChatError, Result};
use crate::core::frame::{decode_frame, Frame};
use crate::core::sse::{read_sse_stream, SseReadOptions};
use crate::utils::auth::add_auth_headers;
use crate::utils::url::construct_api_url;

pub const CONNECTION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct TransportSettings {
    /// Deadline for a whole attempt.
    pub request_timeout: Duration,
    /// Longest silence tolerated mid-stream.
    pub stream_idle_timeout: Duration,
    /// Abort a stream on the first malformed frame instead of skipping it.
    pub strict_stream: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            stream_idle_timeout: Duration::from_secs(60),
            strict_stream: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    provider: ProviderConfig,
    api_key: Option<String>,
    settings: TransportSettings,
}

impl HttpTransport {
    pub fn new(
        client: reqwest::Client,
        provider: ProviderConfig,
        api_key: Option<String>,
        settings: TransportSettings,
    ) -> Self {
        Self {
            client,
            provider,
            api_key,
            settings,
        }
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn settings(&self) -> TransportSettings {
        self.settings
    }

    fn post_chat(&self, request: &ChatRequest) -> reqwest::RequestBuilder {
        let url = construct_api_url(&self.provider.base_url, "chat/completions");
        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        add_auth_headers(builder, &self.provider, self.api_key.as_deref()).json(request)
    }

    /// Send a non-streaming request and parse the complete body.
    pub async fn send_once(&self, request: &ChatRequest) -> Result<ChatResponse> {
        debug!(provider = %self.provider.id, model = %request.model, "one-shot request");
        let response = self
            .post_chat(request)
            .timeout(self.settings.request_timeout)
            .send()
            .await?;
        let response = check_status(response, &self.provider.id).await?;
        let body = response.text().await?;
        parse_chat_body(&body, &self.provider.id)
    }

    /// Send a streaming request, folding every frame into `accumulator`.
    ///
    /// `request_timeout` bounds the whole attempt, header wait included.
    pub async fn send_stream(
        &self,
        request: &ChatRequest,
        accumulator: &StreamAccumulator,
    ) -> Result<()> {
        debug!(provider = %self.provider.id, model = %request.model, "streaming request");
        let timeout = self.settings.request_timeout;
        let started = Instant::now();
        let response = tokio::time::timeout(timeout, self.post_chat(request).send())
            .await
            .map_err(|_| {
                ChatError::Timeout(format!("no response headers within {}s", timeout.as_secs()))
            })??;
        let response = check_status(response, &self.provider.id).await?;

        let options = stream_read_options(&self.settings, started.elapsed());
        let provider = self.provider.id.as_str();
        let strict = self.settings.strict_stream;
        let summary = read_sse_stream(response.bytes_stream(), options, |event| {
            match decode_frame(&event.data, provider, strict)? {
                Frame::Done => return Ok(ControlFlow::Break(())),
                Frame::Chunk(chunk) => accumulator.process_chunk(&chunk),
                Frame::Skip => {}
            }
            Ok(ControlFlow::Continue(()))
        })
        .await?;

        if summary.events == 0 && !summary.unparsed.is_empty() {
            return Err(non_stream_body_error(&summary.unparsed, provider));
        }
        Ok(())
    }

    /// `GET {base_url}/models` with a short deadline.
    pub async fn list_models(&self) -> Result<ModelsResponse> {
        let url = construct_api_url(&self.provider.base_url, "models");
        let builder = self
            .client
            .get(url)
            .header("Content-Type", "application/json")
            .timeout(CONNECTION_CHECK_TIMEOUT);
        let response = add_auth_headers(builder, &self.provider, self.api_key.as_deref())
            .send()
            .await?;
        let response = check_status(response, &self.provider.id).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn check_connection(&self) -> Result<()> {
        self.list_models().await.map(|_| ())
    }
}

/// Turn a non-success status into a classified error.
async fn check_status(response: reqwest::Response, provider: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after);
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    let message = api_error_message(&body);

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ChatError::RateLimited {
            retry_after,
            message,
        });
    }

    Err(ChatError::Http {
        status: status.as_u16(),
        provider: provider.to_string(),
        message,
    })
}

/// Deadlines for the body of a stream whose headers took `elapsed`.
fn stream_read_options(settings: &TransportSettings, elapsed: Duration) -> SseReadOptions {
    SseReadOptions {
        idle_timeout: Some(settings.stream_idle_timeout),
        total_timeout: Some(settings.request_timeout.saturating_sub(elapsed)),
    }
}

/// A streamed request answered with something other than an event stream.
/// Error envelopes keep the backend's message.
fn non_stream_body_error(body: &str, provider: &str) -> ChatError {
    match parse_chat_body(body, provider) {
        Err(err @ ChatError::Http { .. }) => err,
        _ => ChatError::ProtocolViolation(format!(
            "expected an event stream, got: {}",
            api_error_message(body)
        )),
    }
}

/// Parse a one-shot body. Error envelopes delivered with a 200 status and
/// responses with no choices are rejected.
pub fn parse_chat_body(body: &str, provider: &str) -> Result<ChatResponse> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|err| ChatError::Parse(format!("{err}: {}", api_error_message(body))))?;

    if value.get("error").is_some() && value.get("choices").is_none() {
        return Err(ChatError::Http {
            status: 200,
            provider: provider.to_string(),
            message: extract_error_summary(&value).unwrap_or_else(|| body.trim().to_string()),
        });
    }

    let response: ChatResponse = serde_json::from_value(value)?;
    if response.choices.is_empty() {
        return Err(ChatError::ProtocolViolation(
            "response contained no choices".to_string(),
        ));
    }
    Ok(response)
}

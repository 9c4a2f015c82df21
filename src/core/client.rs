//! Unified chat client.
//!
//! A [`ChatClient`] is bound to one backend and one model. It shapes the wire
//! request for that backend (channel-protocol encoding, output cap, tool
//! fields), runs it through the [`Dispatcher`], and post-processes the reply.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::{
    ChatRequest, ChatResponse, ChatToolDefinition, Message, ReasoningLevel, StreamOptions,
    ToolSchema,
};
use crate::core::accumulator::{StreamAccumulator, TokenCallback};
use crate::core::builtin_providers::{MaxTokensField, ProviderConfig};
use crate::core::channel::{strip_return_token, ChannelCodec};
use crate::core::config::Config;
use crate::core::credentials::CredentialSource;
use crate::core::dispatcher::{Dispatcher, RetryPolicy};
use crate::core::error::{ChatError, Result};
use crate::core::providers::{
    apply_cost, estimate_input_tokens, output_token_cap, ProviderRegistry,
};
use crate::core::throughput::ThroughputTracker;
use crate::core::transport::HttpTransport;

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Reasoning effort for this call; also sent on the wire to backends that
    /// accept a reasoning field.
    pub reasoning: Option<ReasoningLevel>,
    /// Explicit output cap. When unset the cap is derived from the context
    /// window.
    pub max_tokens: Option<u32>,
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn with_reasoning(mut self, level: ReasoningLevel) -> Self {
        self.reasoning = Some(level);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Capability surface shared by every backend the failover layer can drive.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn provider(&self) -> &ProviderConfig;

    fn model(&self) -> &str;

    async fn send_chat_request(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        options: RequestOptions,
    ) -> Result<ChatResponse>;

    async fn send_chat_request_stream(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        options: RequestOptions,
        on_token: TokenCallback,
    ) -> Result<ChatResponse>;

    async fn check_connection(&self) -> Result<()>;
}

struct PreparedRequest {
    request: ChatRequest,
    channel: bool,
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    transport: HttpTransport,
    model: String,
    policy: RetryPolicy,
    reasoning: ReasoningLevel,
    throughput: Option<Arc<ThroughputTracker>>,
}

impl ChatClient {
    /// Build a client for `provider` using `config` for model, deadlines and
    /// the retry budget.
    pub fn new(provider: ProviderConfig, api_key: Option<String>, config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Self::with_http_client(http, provider, api_key, config)
    }

    pub fn with_http_client(
        http: reqwest::Client,
        provider: ProviderConfig,
        api_key: Option<String>,
        config: &Config,
    ) -> Result<Self> {
        let api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        if provider.requires_credential() && api_key.is_none() {
            return Err(ChatError::MissingCredential {
                env_var: provider.api_key_env.clone().unwrap_or_default(),
                provider: provider.id.clone(),
            });
        }

        let model = config.model_for(&provider);
        let settings = config.transport_settings(&provider);
        Ok(Self {
            transport: HttpTransport::new(http, provider, api_key, settings),
            model,
            policy: RetryPolicy::new(config.max_attempts()),
            reasoning: config.reasoning_level(),
            throughput: None,
        })
    }

    /// Look `provider_id` up in `registry` and authenticate it from
    /// `credentials`.
    pub fn connect(
        registry: &ProviderRegistry,
        provider_id: &str,
        credentials: &dyn CredentialSource,
        config: &Config,
    ) -> Result<Self> {
        let provider = registry
            .get(provider_id)
            .ok_or_else(|| ChatError::UnknownProvider(provider_id.trim().to_string()))?;
        let api_key = credentials.api_key(provider);
        Self::new(provider.clone(), api_key, config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_throughput(mut self, tracker: Arc<ThroughputTracker>) -> Self {
        self.throughput = Some(tracker);
        self
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn provider(&self) -> &ProviderConfig {
        self.transport.provider()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn supports_tools(&self) -> bool {
        self.provider().features.tools
    }

    pub fn supports_streaming(&self) -> bool {
        self.provider().features.streaming
    }

    pub fn supports_vision(&self) -> bool {
        self.provider().features.vision && self.provider().vision_model.is_some()
    }

    pub fn supports_reasoning(&self) -> bool {
        self.provider().features.reasoning
    }

    pub fn context_limit(&self) -> u32 {
        self.provider().context_limit
    }

    pub fn vision_model(&self) -> Option<&str> {
        self.provider().vision_model.as_deref()
    }

    pub fn throughput(&self) -> Option<&Arc<ThroughputTracker>> {
        self.throughput.as_ref()
    }

    /// One-shot request with the client's model.
    pub async fn send_chat_request(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        options: RequestOptions,
    ) -> Result<ChatResponse> {
        self.send_with_model(&self.model, messages, tools, options)
            .await
    }

    /// One-shot request routed to the provider's vision model.
    pub async fn send_vision_request(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        options: RequestOptions,
    ) -> Result<ChatResponse> {
        let vision_model = match self.vision_model() {
            Some(model) if self.supports_vision() => model.to_string(),
            _ => return Err(self.unsupported("vision")),
        };
        self.send_with_model(&vision_model, messages, tools, options)
            .await
    }

    /// Streaming request. `on_token` sees each content fragment once, in
    /// arrival order. Failures are retried only while nothing has been
    /// delivered; afterwards they surface as [`ChatError::StreamInterrupted`].
    pub async fn send_chat_request_stream<F>(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        options: RequestOptions,
        on_token: F,
    ) -> Result<ChatResponse>
    where
        F: FnMut(&str) + Send + 'static,
    {
        if !self.supports_streaming() {
            return Err(self.unsupported("streaming"));
        }
        let prepared = self.prepare(&self.model, messages, tools, &options, true)?;
        let sink = Arc::new(Mutex::new(on_token));
        let delivered = Arc::new(AtomicBool::new(false));
        let transport = &self.transport;
        let request = &prepared.request;

        let started = Instant::now();
        let accumulator = self
            .dispatcher(&options)
            .run(|attempt| {
                let sink = Arc::clone(&sink);
                let flag = Arc::clone(&delivered);
                let delivered = Arc::clone(&delivered);
                let accumulator = StreamAccumulator::with_callback(Box::new(move |fragment: &str| {
                    flag.store(true, Ordering::SeqCst);
                    let mut callback = sink
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    (&mut *callback)(fragment);
                }));
                async move {
                    match transport.send_stream(request, &accumulator).await {
                        Ok(()) if accumulator.frame_count() == 0 => Err(
                            ChatError::ProtocolViolation("stream ended without any frames".into()),
                        ),
                        Ok(()) => Ok(accumulator),
                        Err(err) if delivered.load(Ordering::SeqCst) => {
                            debug!(attempt, error = %err, "stream failed after output was delivered");
                            Err(ChatError::StreamInterrupted(Box::new(err)))
                        }
                        Err(err) => Err(err),
                    }
                }
            })
            .await?;

        let generation = accumulator
            .token_generation_duration()
            .filter(|span| !span.is_zero())
            .unwrap_or_else(|| started.elapsed());
        let mut response = accumulator.response();
        self.finish(&prepared, &mut response, generation);
        Ok(response)
    }

    /// Cheap reachability probe against the models endpoint.
    pub async fn check_connection(&self) -> Result<()> {
        self.transport.check_connection().await
    }

    /// Model catalogue advertised by the backend.
    pub async fn list_models(&self) -> Result<crate::api::models::ModelsResponse> {
        self.transport.list_models().await
    }

    async fn send_with_model(
        &self,
        model: &str,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        options: RequestOptions,
    ) -> Result<ChatResponse> {
        let prepared = self.prepare(model, messages, tools, &options, false)?;
        let started = Instant::now();
        let mut response = self
            .dispatcher(&options)
            .run(|_| self.transport.send_once(&prepared.request))
            .await?;
        self.finish(&prepared, &mut response, started.elapsed());
        Ok(response)
    }

    fn dispatcher(&self, options: &RequestOptions) -> Dispatcher {
        Dispatcher::new(self.provider().id.clone(), self.policy)
            .with_cancellation(options.cancel.clone())
    }

    fn unsupported(&self, capability: &'static str) -> ChatError {
        ChatError::Unsupported {
            provider: self.provider().id.clone(),
            capability,
        }
    }

    fn prepare(
        &self,
        model: &str,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        options: &RequestOptions,
        stream: bool,
    ) -> Result<PreparedRequest> {
        let provider = self.provider();
        if !tools.is_empty() && !provider.features.tools {
            return Err(self.unsupported("tools"));
        }

        let channel = provider.uses_channel_protocol(model);
        let level = options.reasoning.unwrap_or(self.reasoning);
        let cap = options.max_tokens.unwrap_or_else(|| {
            let estimated =
                estimate_input_tokens(messages.iter().map(|m| m.content.as_str()), tools.len());
            output_token_cap(provider.context_limit, estimated)
        });

        let (messages, tool_defs, tool_choice) = if channel {
            // Tools travel inside the encoded prompt, never in the native field.
            let prompt = ChannelCodec::new(level).encode(&messages, tools);
            (vec![Message::user(prompt)], None, None)
        } else if tools.is_empty() {
            (messages, None, None)
        } else {
            let defs = tools.iter().map(ChatToolDefinition::from).collect();
            (messages, Some(defs), Some("auto".to_string()))
        };

        let (max_tokens, max_completion_tokens) = match provider.max_tokens_field {
            MaxTokensField::MaxTokens => (Some(cap), None),
            MaxTokensField::MaxCompletionTokens => (None, Some(cap)),
        };
        let reasoning = options
            .reasoning
            .filter(|_| provider.features.reasoning && !channel);

        info!(provider = %provider.id, model, channel, stream, "dispatching chat request");
        Ok(PreparedRequest {
            request: ChatRequest {
                model: model.to_string(),
                messages,
                tools: tool_defs,
                tool_choice,
                max_tokens,
                max_completion_tokens,
                reasoning,
                stream,
                stream_options: (stream && provider.features.stream_usage).then_some(
                    StreamOptions {
                        include_usage: true,
                    },
                ),
            },
            channel,
        })
    }

    fn finish(&self, prepared: &PreparedRequest, response: &mut ChatResponse, elapsed: Duration) {
        if prepared.channel {
            for choice in &mut response.choices {
                let stripped = strip_return_token(&choice.message.content);
                if stripped.len() != choice.message.content.len() {
                    choice.message.content = stripped.to_string();
                }
            }
        }

        apply_cost(
            self.provider(),
            &prepared.request.model,
            &mut response.usage,
        );

        if let Some(tracker) = &self.throughput {
            let tokens = match response.usage.completion_tokens {
                0 => (response.content().len() / 4) as u64,
                reported => reported,
            };
            if let Some(rate) = tracker.record(tokens, elapsed) {
                debug!(provider = %self.provider().id, tokens_per_sec = rate, "throughput sample");
            }
        }
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    fn provider(&self) -> &ProviderConfig {
        ChatClient::provider(self)
    }

    fn model(&self) -> &str {
        ChatClient::model(self)
    }

    async fn send_chat_request(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        options: RequestOptions,
    ) -> Result<ChatResponse> {
        ChatClient::send_chat_request(self, messages, tools, options).await
    }

    async fn send_chat_request_stream(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        options: RequestOptions,
        on_token: TokenCallback,
    ) -> Result<ChatResponse> {
        ChatClient::send_chat_request_stream(self, messages, tools, options, on_token).await
    }

    async fn check_connection(&self) -> Result<()> {
        ChatClient::check_connection(self).await
    }
}

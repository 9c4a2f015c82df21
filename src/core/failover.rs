//! Backend selection and cross-backend fallback.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::api::{ChatResponse, Message, ToolSchema};
use crate::core::accumulator::TokenCallback;
use crate::core::builtin_providers::ProviderConfig;
use crate::core::client::{ChatBackend, ChatClient, RequestOptions};
use crate::core::config::defaults::env_provider;
use crate::core::config::Config;
use crate::core::credentials::CredentialSource;
use crate::core::error::{ChatError, Result};
use crate::core::providers::ProviderRegistry;
use crate::core::throughput::ThroughputTracker;

/// Inputs to backend selection, in precedence order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderSelection {
    pub explicit: Option<String>,
    pub env: Option<String>,
    /// Configured `default_provider`; ranks below the environment override.
    pub default: Option<String>,
    pub last_used: Option<String>,
    pub priority: Vec<String>,
}

impl ProviderSelection {
    /// Selection inputs from `config`, `CHATWIRE_PROVIDER` and an optional
    /// caller choice.
    pub fn from_config(config: &Config, explicit: Option<&str>) -> Self {
        let non_blank = |id: &String| !id.trim().is_empty();
        Self {
            explicit: explicit.map(str::to_string).filter(non_blank),
            env: env_provider(),
            default: config.default_provider.clone().filter(non_blank),
            last_used: config.last_used_provider.clone(),
            priority: config.provider_priority(),
        }
    }
}

fn usable<'a>(
    registry: &'a ProviderRegistry,
    credentials: &dyn CredentialSource,
    id: &str,
) -> Option<&'a ProviderConfig> {
    registry
        .get(id)
        .filter(|provider| credentials.has_credential(provider))
}

/// Pick the backend to talk to first.
///
/// An explicit choice must exist and be authenticated. The environment
/// override, the configured default and the last-used backend are skipped
/// when unusable. Otherwise the
/// first credentialed backend in priority order wins, then the local daemon.
pub fn determine_provider<'a>(
    registry: &'a ProviderRegistry,
    credentials: &dyn CredentialSource,
    selection: &ProviderSelection,
) -> Result<&'a ProviderConfig> {
    if let Some(id) = selection.explicit.as_deref() {
        let provider = registry
            .get(id)
            .ok_or_else(|| ChatError::UnknownProvider(id.trim().to_string()))?;
        if !credentials.has_credential(provider) {
            return Err(ChatError::MissingCredential {
                provider: provider.id.clone(),
                env_var: provider.api_key_env.clone().unwrap_or_default(),
            });
        }
        info!(provider = %provider.id, "using explicitly selected provider");
        return Ok(provider);
    }

    if let Some(id) = selection.env.as_deref() {
        match usable(registry, credentials, id) {
            Some(provider) => {
                info!(provider = %provider.id, "using provider from environment");
                return Ok(provider);
            }
            None => warn!(provider = id, "environment provider is unknown or has no credential"),
        }
    }

    if let Some(id) = selection.default.as_deref() {
        match usable(registry, credentials, id) {
            Some(provider) => {
                info!(provider = %provider.id, "using configured default provider");
                return Ok(provider);
            }
            None => warn!(provider = id, "default provider is unknown or has no credential"),
        }
    }

    if let Some(provider) = selection
        .last_used
        .as_deref()
        .and_then(|id| usable(registry, credentials, id))
    {
        info!(provider = %provider.id, "using last used provider");
        return Ok(provider);
    }

    if let Some(provider) = selection
        .priority
        .iter()
        .filter_map(|id| usable(registry, credentials, id))
        .find(|provider| !provider.is_local())
    {
        info!(provider = %provider.id, "using first credentialed provider");
        return Ok(provider);
    }

    registry.local_daemon().ok_or_else(|| ChatError::NoBackendAvailable {
        attempts: Vec::new(),
    })
}

/// Backends to try in order, starting with `primary`.
///
/// A hosted primary is followed by the local daemon, then by every other
/// credentialed backend: priority order first, then any remaining registry
/// entries.
pub fn fallback_chain(
    registry: &ProviderRegistry,
    credentials: &dyn CredentialSource,
    primary: &ProviderConfig,
    priority: &[String],
) -> Vec<ProviderConfig> {
    let mut chain = vec![primary.clone()];
    let mut push = |provider: &ProviderConfig| {
        if !chain.iter().any(|p| p.id == provider.id) {
            chain.push(provider.clone());
        }
    };

    if !primary.is_local() {
        if let Some(local) = registry.local_daemon() {
            push(local);
        }
    }
    for provider in priority
        .iter()
        .filter_map(|id| usable(registry, credentials, id))
    {
        push(provider);
    }
    for provider in registry
        .iter()
        .filter(|provider| credentials.has_credential(provider))
    {
        push(provider);
    }
    chain
}

/// Builds a live backend for one chain entry.
pub trait BackendConnector: Send + Sync {
    fn connect(&self, provider: &ProviderConfig, model: Option<&str>)
        -> Result<Box<dyn ChatBackend>>;
}

/// Connects chain entries as HTTP [`ChatClient`]s sharing one connection pool.
pub struct HttpConnector {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialSource>,
    config: Config,
    throughput: Option<Arc<ThroughputTracker>>,
}

impl HttpConnector {
    pub fn new(credentials: Arc<dyn CredentialSource>, config: Config) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            credentials,
            config,
            throughput: None,
        })
    }

    pub fn with_throughput(mut self, tracker: Arc<ThroughputTracker>) -> Self {
        self.throughput = Some(tracker);
        self
    }
}

impl BackendConnector for HttpConnector {
    fn connect(
        &self,
        provider: &ProviderConfig,
        model: Option<&str>,
    ) -> Result<Box<dyn ChatBackend>> {
        let mut client = ChatClient::with_http_client(
            self.http.clone(),
            provider.clone(),
            self.credentials.api_key(provider),
            &self.config,
        )?;
        if let Some(model) = model {
            client.set_model(model);
        }
        if let Some(tracker) = &self.throughput {
            client = client.with_throughput(Arc::clone(tracker));
        }
        Ok(Box::new(client))
    }
}

/// A reply together with the backend that produced it.
#[derive(Debug, Clone)]
pub struct ServedResponse {
    pub provider: String,
    pub model: String,
    pub response: ChatResponse,
}

/// Runs each request against the chain until one backend answers.
pub struct FailoverClient {
    chain: Vec<ProviderConfig>,
    connector: Box<dyn BackendConnector>,
    model: Option<String>,
}

impl FailoverClient {
    pub fn new(chain: Vec<ProviderConfig>, connector: impl BackendConnector + 'static) -> Self {
        Self {
            chain,
            connector: Box::new(connector),
            model: None,
        }
    }

    /// Resolve the primary backend and its fallbacks from the usual inputs.
    pub fn from_selection(
        registry: &ProviderRegistry,
        credentials: &dyn CredentialSource,
        selection: &ProviderSelection,
        connector: impl BackendConnector + 'static,
    ) -> Result<Self> {
        let primary = determine_provider(registry, credentials, selection)?;
        let chain = fallback_chain(registry, credentials, primary, &selection.priority);
        Ok(Self::new(chain, connector))
    }

    /// Model override for the primary backend only; fallbacks use their own
    /// defaults.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn chain(&self) -> &[ProviderConfig] {
        &self.chain
    }

    pub fn primary(&self) -> Option<&ProviderConfig> {
        self.chain.first()
    }

    pub async fn send_chat_request(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        options: RequestOptions,
    ) -> Result<ServedResponse> {
        self.run(|backend| {
            let messages = messages.clone();
            let options = options.clone();
            async move { backend.send_chat_request(messages, tools, options).await }
        })
        .await
    }

    pub async fn send_chat_request_stream<F>(
        &self,
        messages: Vec<Message>,
        tools: &[ToolSchema],
        options: RequestOptions,
        on_token: F,
    ) -> Result<ServedResponse>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let sink = Arc::new(Mutex::new(on_token));
        self.run(|backend| {
            let messages = messages.clone();
            let options = options.clone();
            let sink = Arc::clone(&sink);
            let forward: TokenCallback = Box::new(move |fragment: &str| {
                let mut callback = sink
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                (&mut *callback)(fragment);
            });
            async move {
                backend
                    .send_chat_request_stream(messages, tools, options, forward)
                    .await
            }
        })
        .await
    }

    async fn run<G, Fut>(&self, mut call: G) -> Result<ServedResponse>
    where
        G: FnMut(Arc<dyn ChatBackend>) -> Fut,
        Fut: std::future::Future<Output = Result<ChatResponse>>,
    {
        let mut failures = Vec::new();

        for (position, provider) in self.chain.iter().enumerate() {
            let model = if position == 0 {
                self.model.as_deref()
            } else {
                None
            };
            let backend: Arc<dyn ChatBackend> = match self.connector.connect(provider, model) {
                Ok(backend) => Arc::from(backend),
                Err(err) => {
                    warn!(provider = %provider.id, error = %err, "cannot use provider; failing over");
                    failures.push((provider.id.clone(), err.to_string()));
                    continue;
                }
            };

            if position > 0 && provider.is_local() {
                if let Err(err) = backend.check_connection().await {
                    warn!(provider = %provider.id, error = %err, "local daemon unreachable");
                    failures.push((provider.id.clone(), err.to_string()));
                    continue;
                }
            }

            match call(Arc::clone(&backend)).await {
                Ok(response) => {
                    if position > 0 {
                        info!(provider = %provider.id, model = backend.model(), "served by fallback provider");
                    }
                    return Ok(ServedResponse {
                        provider: provider.id.clone(),
                        model: backend.model().to_string(),
                        response,
                    });
                }
                Err(err) if !err.allows_failover() => return Err(err),
                Err(err) => {
                    warn!(provider = %provider.id, error = %err, "provider failed; failing over");
                    failures.push((provider.id.clone(), err.to_string()));
                }
            }
        }

        Err(ChatError::NoBackendAvailable { attempts: failures })
    }
}

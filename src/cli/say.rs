//! One-shot "say" command

use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use tracing::warn;

use crate::api::{Message, ReasoningLevel};
use crate::core::client::RequestOptions;
use crate::core::config::Config;
use crate::core::credentials::{CredentialSource, EnvCredentials};
use crate::core::failover::{FailoverClient, HttpConnector, ProviderSelection, ServedResponse};
use crate::core::providers::ProviderRegistry;
use crate::core::throughput::ThroughputTracker;

#[derive(Debug, Clone, Default)]
pub struct SayArgs {
    pub prompt: Vec<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub stream: bool,
    pub reasoning: Option<ReasoningLevel>,
    pub system: Option<String>,
}

impl SayArgs {
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.system.as_deref().filter(|s| !s.trim().is_empty()) {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(self.prompt.join(" ")));
        messages
    }
}

pub async fn run_say(args: SayArgs) -> Result<(), Box<dyn Error>> {
    if args.prompt.join(" ").trim().is_empty() {
        eprintln!("Usage: chatwire say <prompt>");
        std::process::exit(1);
    }

    let mut config = Config::load()?;
    let registry = ProviderRegistry::builtin()?.with_custom(&config.custom_providers);
    let credentials: Arc<dyn CredentialSource> = Arc::new(EnvCredentials);
    let tracker = Arc::new(ThroughputTracker::new());

    let selection = ProviderSelection::from_config(&config, args.provider.as_deref());
    let connector = HttpConnector::new(Arc::clone(&credentials), config.clone())?
        .with_throughput(Arc::clone(&tracker));
    let client =
        FailoverClient::from_selection(&registry, credentials.as_ref(), &selection, connector)?
            .with_model(args.model.clone());

    let options = RequestOptions {
        reasoning: args.reasoning,
        ..Default::default()
    };
    let messages = args.messages();

    let served = if args.stream {
        let served = client
            .send_chat_request_stream(messages, &[], options, |token| {
                print!("{token}");
                let _ = io::stdout().flush();
            })
            .await?;
        println!();
        served
    } else {
        let served = client.send_chat_request(messages, &[], options).await?;
        println!("{}", served.response.content());
        served
    };

    eprintln!("{}", usage_line(&served, tracker.last()));

    config.last_used_provider = Some(served.provider.clone());
    if let Err(err) = config.save() {
        warn!(error = %err, "could not record last used provider");
    }
    Ok(())
}

/// `[provider model] N in / M out tokens, $cost, R tok/s`
pub fn usage_line(served: &ServedResponse, tokens_per_sec: Option<f64>) -> String {
    let usage = &served.response.usage;
    let mut line = format!(
        "[{} {}] {} in / {} out tokens, ${:.6}",
        served.provider, served.model, usage.prompt_tokens, usage.completion_tokens,
        usage.estimated_cost
    );
    if let Some(rate) = tokens_per_sec {
        line.push_str(&format!(", {rate:.1} tok/s"));
    }
    line
}

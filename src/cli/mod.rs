//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod model_list;
pub mod provider_list;
pub mod say;
pub mod settings;

use std::error::Error;

use clap::{Parser, Subcommand};

use crate::api::ReasoningLevel;
use crate::cli::model_list::list_models;
use crate::cli::provider_list::list_providers;
use crate::cli::say::{run_say, SayArgs};
use crate::cli::settings::SettingRegistry;
use crate::core::config::Config;
use crate::utils::logging;

#[derive(Parser, Debug)]
#[command(name = "chatwire", version)]
#[command(about = "One client for many OpenAI-compatible chat backends")]
#[command(
    long_about = "Chatwire sends chat requests to hosted OpenAI-compatible APIs or a local \
daemon, retrying transient failures and falling back to other configured providers.\n\n\
Environment Variables:\n\
  <PROVIDER>_API_KEY    Credential for each hosted provider (see 'chatwire providers')\n\
  CHATWIRE_PROVIDER     Provider to use when none is given with -p\n\
  CHATWIRE_API_TIMEOUT  Per-attempt deadline for hosted providers (e.g. 90, 90s, 2m)\n\
  CHATWIRE_LOG          Log filter for diagnostics on stderr (default: warn)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Log debug diagnostics to stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one prompt and print the reply
    Say {
        /// Provider to use
        #[arg(short = 'p', long)]
        provider: Option<String>,
        /// Model to use with the selected provider
        #[arg(short = 'm', long)]
        model: Option<String>,
        /// Print tokens as they arrive
        #[arg(short = 's', long)]
        stream: bool,
        /// Reasoning effort (low, medium, high)
        #[arg(short = 'r', long)]
        reasoning: Option<ReasoningLevel>,
        /// System prompt
        #[arg(long)]
        system: Option<String>,
        /// Prompt text
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// List known providers and their credential status
    Providers,
    /// List models offered by a provider
    Models {
        /// Provider to query
        #[arg(short = 'p', long)]
        provider: Option<String>,
    },
    /// Set configuration values, or show them all when no key is given
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value(s) for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
        /// Provider, for provider-keyed settings
        value: Option<String>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    logging::init(args.verbose);
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    match args.command {
        Commands::Say {
            provider,
            model,
            stream,
            reasoning,
            system,
            prompt,
        } => {
            run_say(SayArgs {
                prompt,
                provider,
                model,
                stream,
                reasoning,
                system,
            })
            .await
        }
        Commands::Providers => list_providers(),
        Commands::Models { provider } => list_models(provider).await,
        Commands::Set { key, value } => {
            let mut config = Config::load()?;
            let registry = SettingRegistry::new();
            match apply_set(&registry, key.as_deref(), &value, &mut config) {
                Some(outcome) => finish_setting(outcome, &config),
                None => {
                    println!("{}", registry.render(&config));
                    Ok(())
                }
            }
        }
        Commands::Unset { key, value } => {
            let mut config = Config::load()?;
            let registry = SettingRegistry::new();
            let outcome = registry
                .get(&key)
                .and_then(|handler| handler.unset(value.as_deref(), &mut config));
            finish_setting(outcome, &config)
        }
    }
}

/// `None` when no key was given and the configuration should be listed. A key
/// without a value reaches its handler, which reports what is missing.
fn apply_set(
    registry: &SettingRegistry,
    key: Option<&str>,
    value: &[String],
    config: &mut Config,
) -> Option<Result<String, settings::SettingError>> {
    let key = key?;
    Some(
        registry
            .get(key)
            .and_then(|handler| handler.set(value, config)),
    )
}

fn finish_setting(
    outcome: Result<String, settings::SettingError>,
    config: &Config,
) -> Result<(), Box<dyn Error>> {
    match outcome {
        Ok(message) => {
            config.save()?;
            println!("{message}");
            Ok(())
        }
        Err(err) => {
            err.print();
            std::process::exit(1);
        }
    }
}

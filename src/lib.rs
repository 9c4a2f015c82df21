//! Chatwire is a unified client for OpenAI-compatible chat-completion backends.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`api`] defines the chat, delta-frame and model-list payloads.
//! - [`core`] owns the protocol engine: the SSE reader and frame decoder, the
//!   response accumulator, the channel-protocol codec, the retrying
//!   dispatcher, and the [`core::client::ChatClient`] façade with provider
//!   failover on top.
//! - [`utils`] holds request, URL and logging helpers.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;

pub use crate::api::{ChatResponse, Message, Role, ToolSchema};
pub use crate::core::client::{ChatBackend, ChatClient, RequestOptions};
pub use crate::core::error::{ChatError, Result};
pub use crate::core::failover::{FailoverClient, ProviderSelection};

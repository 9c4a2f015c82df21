pub mod accumulator;
pub mod builtin_providers;
pub mod channel;
pub mod client;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod failover;
pub mod frame;
pub mod providers;
pub mod sse;
pub mod throughput;
pub mod transport;

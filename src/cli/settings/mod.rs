//! Settings management for CLI set/unset commands.
//!
//! Each configuration key has a [`SettingHandler`]; handlers edit a loaded
//! [`Config`] in memory and the caller persists it.

pub mod error;
pub mod handlers;
pub mod registry;

pub use error::SettingError;
pub use registry::SettingRegistry;

use crate::core::config::data::Config;

pub trait SettingHandler: Send + Sync {
    /// The configuration key this handler manages.
    fn key(&self) -> &'static str;

    /// Apply `args` (everything after the key). Returns the message to show.
    fn set(&self, args: &[String], config: &mut Config) -> Result<String, SettingError>;

    /// Clear the value, optionally scoped by one argument.
    fn unset(&self, arg: Option<&str>, config: &mut Config) -> Result<String, SettingError>;

    /// Current value for `chatwire set` output.
    fn format(&self, config: &Config) -> String;
}

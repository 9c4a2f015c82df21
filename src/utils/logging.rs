//! Diagnostic logging for the binary.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! binary's job.

use tracing_subscriber::EnvFilter;

/// Filter directives, e.g. `debug` or `chatwire=trace`.
pub const LOG_ENV_VAR: &str = "CHATWIRE_LOG";
const DEFAULT_FILTER: &str = "warn";

pub fn log_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr fmt subscriber so stdout carries only the reply.
pub fn init(verbose: bool) {
    // A subscriber may already be installed when embedded; keep that one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::TestEnvVarGuard;

    #[test]
    fn verbose_overrides_environment() {
        let mut env = TestEnvVarGuard::new();
        env.set_var(LOG_ENV_VAR, "error");
        assert_eq!(log_filter(true).to_string(), "debug");
        assert_eq!(log_filter(false).to_string(), "error");
    }

    #[test]
    fn defaults_to_warn() {
        let mut env = TestEnvVarGuard::new();
        env.remove_var(LOG_ENV_VAR);
        assert_eq!(log_filter(false).to_string(), "warn");
    }
}

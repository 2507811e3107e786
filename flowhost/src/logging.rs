// Tracing subscriber setup for the host

use crate::config::{ConfigError, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins when set and valid; otherwise the configured directives.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.filter).map_err(|e| {
        ConfigError::Invalid(format!("logging.filter '{}': {}", config.filter, e))
    })
}

/// Installs the global subscriber, writing to stderr so stdout stays free
/// for script results. A second call is a no-op.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = build_filter(config)?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr)
        .try_init();
    Ok(())
}

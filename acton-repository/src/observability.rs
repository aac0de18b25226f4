//! Structured logging setup

use tracing_subscriber::EnvFilter;

use crate::config::{Config, LogFormat};
use crate::error::{Error, Result};

/// Install a global `tracing` subscriber configured from `config.logging`
///
/// An unparsable level falls back to `info`. Fails with [`Error::Tracing`]
/// if a global subscriber is already installed.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match config.logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    installed.map_err(|e| Error::Tracing(e.to_string()))?;

    tracing::info!(
        level = %config.logging.level,
        format = ?config.logging.format,
        "Tracing initialized"
    );
    Ok(())
}

/// Log shutdown; the fmt subscriber writes synchronously, so nothing is buffered
pub fn shutdown_tracing() {
    tracing::info!("Tracing shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error() {
        let config = Config::default();
        // Whichever call comes first may win; the second must not panic
        let _ = init_tracing(&config);
        assert!(matches!(init_tracing(&config), Err(Error::Tracing(_))));
        shutdown_tracing();
    }
}

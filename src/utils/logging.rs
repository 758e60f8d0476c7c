//! Tracing subscriber setup driven by [`LoggingConfig`].
//!
//! `RUST_LOG` overrides the configured level when set.

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed or the log file cannot be
/// opened. File output takes precedence over the console when both are set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level).into())
        .from_env_lossy();

    let file = match (config.log_to_file, config.log_file_path.as_deref()) {
        (true, Some(path)) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| ProtocolError::ConfigError(format!("Failed to open log file: {e}")))?,
        ),
        (true, None) => {
            return Err(ProtocolError::ConfigError(
                "log_file_path must be specified when log_to_file is true".into(),
            ))
        }
        _ => None,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match (config.json_format, file) {
        (true, Some(file)) => builder
            .json()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init(),
        (true, None) => builder.json().try_init(),
        (false, Some(file)) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init(),
        (false, None) => builder.try_init(),
    };

    installed.map_err(|e| {
        ProtocolError::ConfigError(format!("Failed to install log subscriber: {e}"))
    })?;

    tracing::info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_file_logging_installs_once() {
        let missing_path = LoggingConfig {
            log_to_file: true,
            log_file_path: None,
            ..LoggingConfig::default()
        };
        assert!(init_logging(&missing_path).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secure-packet.log");
        let config = LoggingConfig {
            log_to_console: false,
            log_to_file: true,
            log_file_path: Some(path.to_string_lossy().into_owned()),
            ..LoggingConfig::default()
        };

        init_logging(&config).unwrap();
        assert!(path.exists());
        assert!(init_logging(&config).is_err());
    }
}

//! # Logging
//!
//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence; otherwise the filter is built from `LOG_LEVEL`
//! for this crate only. `LOG_FORMAT=text` switches from JSON lines to the
//! human-readable formatter.

use crate::config::{ControllerConfig, LogFormat};
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
#[must_use]
pub fn default_filter(config: &ControllerConfig) -> String {
    format!(
        "workflow_execution_controller={},audit=info",
        config.log_level.to_lowercase()
    )
}

/// Install the global tracing subscriber
///
/// # Errors
///
/// Fails when a global subscriber is already installed.
pub fn init_tracing(config: &ControllerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_uses_configured_level() {
        let config = ControllerConfig {
            log_level: "DEBUG".to_string(),
            ..ControllerConfig::default()
        };
        assert_eq!(
            default_filter(&config),
            "workflow_execution_controller=debug,audit=info"
        );
    }
}

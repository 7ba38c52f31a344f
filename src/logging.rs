//! Tracing initialization.
//!
//! The filter comes from `RUST_LOG` when set, otherwise from the configured
//! `application.log_level`.

use crate::config::ApplicationConfig;
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_from_config(config: &ApplicationConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| anyhow!("Invalid log filter '{}': {}", config.log_level, e))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.with_target(false).try_init()
    };
    result.map_err(|e| anyhow!("Failed to initialize tracing: {}", e))
}

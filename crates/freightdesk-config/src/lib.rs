//! freightdesk configuration.
//!
//! TOML-based configuration for the chat session manager and its adapters.
//! All sections use sensible defaults so partial configs work out of the box.

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    BackendConfig, FreightdeskConfig, LogLevel, LoggingConfig, RealtimeConfig, SessionConfig,
    CONFIG_SCHEMA_VERSION,
};

use std::path::Path;

use freightdesk_common::ConfigError;

/// Load and validate config from the platform default path, creating a
/// documented default file when none exists.
pub fn load_config() -> Result<FreightdeskConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load and validate config from an explicit path.
pub fn load_config_from(path: &Path) -> Result<FreightdeskConfig, ConfigError> {
    let config = toml_loader::load_from_path(path)?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &FreightdeskConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

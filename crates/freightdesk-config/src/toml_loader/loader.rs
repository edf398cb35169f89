//! Reading the TOML file into a [`FreightdeskConfig`].

use std::path::Path;

use freightdesk_common::ConfigError;
use tracing::{debug, info};

use super::paths::{create_default_config, default_config_path};
use crate::schema::FreightdeskConfig;

/// Parse a config document. Absent keys take their defaults.
pub fn parse_config(content: &str) -> Result<FreightdeskConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load config from an explicit file. Validation is left to the caller.
pub fn load_from_path(path: &Path) -> Result<FreightdeskConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(ConfigError::ParseError(format!(
                "cannot read {}: {e}",
                path.display()
            )))
        }
    };
    let config = parse_config(&content)?;
    debug!(path = %path.display(), "Config loaded");
    Ok(config)
}

/// Load config from `FREIGHTDESK_CONFIG` or the platform default path,
/// writing the documented template there on first use.
pub fn load_default() -> Result<FreightdeskConfig, ConfigError> {
    let path = default_config_path()?;
    match load_from_path(&path) {
        Err(ConfigError::FileNotFound(_)) => {
            create_default_config(&path)?;
            info!(path = %path.display(), "Wrote default config");
            Ok(FreightdeskConfig::default())
        }
        other => other,
    }
}

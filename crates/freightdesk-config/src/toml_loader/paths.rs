//! Where the config file lives.

use std::path::{Path, PathBuf};

use freightdesk_common::ConfigError;

use super::template::default_config_toml;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "FREIGHTDESK_CONFIG";

/// `$FREIGHTDESK_CONFIG` when set, else `<config dir>/freightdesk/config.toml`
/// (`~/.config/freightdesk/config.toml` on Linux).
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("freightdesk").join("config.toml"))
        .ok_or_else(|| ConfigError::ParseError("no platform config directory".into()))
}

/// Write the commented default template to `path`, creating parents.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, default_config_toml())
    };
    write().map_err(|e| {
        ConfigError::ParseError(format!("cannot write {}: {e}", path.display()))
    })
}

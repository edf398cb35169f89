//! Logging configuration types.

use serde::{Deserialize, Serialize};

/// Log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Extra `tracing` directives appended to the level filter
    /// (e.g. `"reqwest=warn"`).
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    /// Build an `EnvFilter`-compatible directive string scoped to our crates.
    pub fn filter_directive(&self) -> String {
        let level = self.level.as_str();
        let mut parts = vec![
            format!("freightdesk_chat={level}"),
            format!("freightdesk_cli={level}"),
            format!("freightdesk_config={level}"),
        ];
        parts.extend(self.directives.iter().cloned());
        parts.join(",")
    }
}

//! Configuration schema types for freightdesk.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod backend;
mod logging;
mod realtime;
mod session;

pub use backend::*;
pub use logging::*;
pub use realtime::*;
pub use session::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FreightdeskConfig {
    pub backend: BackendConfig,
    pub realtime: RealtimeConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_values() {
        let config = FreightdeskConfig::default();
        assert_eq!(config.session.refresh_buffer, 60);
        assert_eq!(config.session.history_page_size, 50);
        assert_eq!(config.session.join_timeout, 20);
        assert!(config.session.proactive_refresh);
    }

    #[test]
    fn default_realtime_values() {
        let config = FreightdeskConfig::default();
        assert_eq!(config.realtime.heartbeat_interval, 25);
        assert_eq!(config.realtime.reconnect_delay, 1);
        assert_eq!(config.realtime.max_reconnect_delay, 30);
        assert!(config.realtime.api_key.is_empty());
    }

    #[test]
    fn realtime_debug_redacts_api_key() {
        let mut config = RealtimeConfig::default();
        config.api_key = "sb_publishable_secret".into();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sb_publishable_secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: FreightdeskConfig = toml::from_str(
            r#"
[session]
refresh_buffer = 90
"#,
        )
        .unwrap();
        assert_eq!(config.session.refresh_buffer, 90);
        assert_eq!(config.session.history_page_size, 50);
        assert_eq!(config.backend.request_timeout, 15);
    }

    #[test]
    fn log_level_parses_lowercase() {
        let config: FreightdeskConfig = toml::from_str(
            r#"
[logging]
level = "debug"
directives = ["reqwest=warn"]
"#,
        )
        .unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        let filter = config.logging.filter_directive();
        assert!(filter.contains("freightdesk_chat=debug"));
        assert!(filter.ends_with("reqwest=warn"));
    }
}

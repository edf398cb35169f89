use serde::{Deserialize, Serialize};

/// Connection settings for the realtime messaging provider.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// WebSocket endpoint of the provider's socket.
    pub url: String,
    /// Publishable project key sent as the `apikey` query parameter.
    pub api_key: String,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval: u32,
    /// Base reconnect delay in seconds.
    pub reconnect_delay: u32,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay: u32,
    /// Seconds to wait for the socket to open before giving up.
    pub connect_timeout: u32,
    /// Seconds to wait for a reply to a pushed event.
    pub reply_timeout: u32,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .field("connect_timeout", &self.connect_timeout)
            .field("reply_timeout", &self.reply_timeout)
            .finish()
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "wss://realtime.freightdesk.app/socket/websocket".into(),
            api_key: String::new(),
            heartbeat_interval: 25,
            reconnect_delay: 1,
            max_reconnect_delay: 30,
            connect_timeout: 15,
            reply_timeout: 10,
        }
    }
}

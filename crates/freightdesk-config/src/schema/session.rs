use serde::{Deserialize, Serialize};

/// Chat session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// A cached credential is only reused while it has more than this many
    /// seconds left.
    pub refresh_buffer: u32,
    /// Number of messages fetched when hydrating a channel.
    pub history_page_size: u32,
    /// Deadline in seconds for join, history and send calls.
    pub join_timeout: u32,
    /// Refresh the credential in the background shortly before it expires.
    pub proactive_refresh: bool,
    /// Capacity of the UI event bus.
    pub event_capacity: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_buffer: 60,
            history_page_size: 50,
            join_timeout: 20,
            proactive_refresh: true,
            event_capacity: 256,
        }
    }
}

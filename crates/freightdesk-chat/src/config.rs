//! Runtime tuning for a [`ChatSession`](crate::ChatSession).

use std::time::Duration;

/// Session tuning knobs. The binary fills this from the TOML config.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// A cached credential is reused only while more than this much of its
    /// lifetime remains.
    pub refresh_buffer: Duration,
    /// Messages requested when hydrating a freshly joined channel.
    pub history_page_size: usize,
    /// Deadline for backend calls.
    pub request_timeout: Duration,
    /// Deadline for provider connect, join, history and send.
    pub join_timeout: Duration,
    /// Schedule a background refresh before each credential expires.
    pub proactive_refresh: bool,
    /// Capacity of the [`ChatEvent`](crate::ChatEvent) broadcast channel.
    pub event_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            refresh_buffer: Duration::from_secs(60),
            history_page_size: 50,
            request_timeout: Duration::from_secs(15),
            join_timeout: Duration::from_secs(20),
            proactive_refresh: true,
            event_capacity: 256,
        }
    }
}

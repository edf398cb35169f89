//! Configuration, protocol types, and event/command enums for the realtime client.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex, RwLock};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to the realtime socket.
#[derive(Clone)]
pub struct RealtimeConfig {
    /// Websocket endpoint, e.g. `wss://realtime.example.com/socket/websocket`.
    pub url: String,
    /// Project API key (publishable).
    pub api_key: String,
    /// Chat credential presented when joining channels.
    pub access_token: Option<String>,
    /// Heartbeat interval in seconds (default: 25).
    pub heartbeat_interval_secs: u64,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u64,
    /// Websocket handshake deadline in seconds.
    pub connect_timeout_secs: u64,
    /// How long to wait for a `phx_reply` in seconds.
    pub reply_timeout_secs: u64,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("reply_timeout_secs", &self.reply_timeout_secs)
            .finish()
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            access_token: None,
            heartbeat_interval_secs: 25,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            connect_timeout_secs: 15,
            reply_timeout_secs: 10,
        }
    }
}

impl RealtimeConfig {
    /// Build the websocket URL with the api key and protocol version.
    pub(crate) fn ws_url(&self) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{sep}apikey={}&vsn=1.0.0", self.url, self.api_key)
    }

    pub(crate) fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Phoenix Protocol Types
// ---------------------------------------------------------------------------

/// A Phoenix protocol message envelope (v1 JSON format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
}

/// `phx_join` payload for a private broadcast channel authorised by the
/// chat credential.
pub(crate) fn join_payload(access_token: &str) -> serde_json::Value {
    serde_json::json!({
        "config": {
            "broadcast": { "self": false, "ack": true },
            "private": true
        },
        "access_token": access_token
    })
}

// ---------------------------------------------------------------------------
// Shared connection state
// ---------------------------------------------------------------------------

pub(crate) type ReplySender = oneshot::Sender<Result<serde_json::Value, String>>;

/// A request waiting for its `phx_reply`.
pub(crate) struct PendingReply {
    pub(crate) topic: String,
    pub(crate) is_join: bool,
    pub(crate) reply: ReplySender,
}

/// State shared by the client handle, the connection loop and its tasks.
#[derive(Default)]
pub(crate) struct SharedState {
    pub(crate) access_token: RwLock<String>,
    /// Topics to rejoin after a reconnect.
    pub(crate) joined_topics: RwLock<HashSet<String>>,
    /// Outstanding requests keyed by message ref.
    pub(crate) pending: Mutex<HashMap<String, PendingReply>>,
}

impl SharedState {
    /// Fail every outstanding request, e.g. when the socket drops.
    pub(crate) async fn fail_pending(&self, reason: &str) {
        let drained: Vec<PendingReply> = self.pending.lock().await.drain().map(|(_, p)| p).collect();
        for pending in drained {
            let _ = pending.reply.send(Err(reason.to_string()));
        }
    }
}

// ---------------------------------------------------------------------------
// Events & Commands
// ---------------------------------------------------------------------------

/// Events emitted by the realtime client.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// WebSocket connection established.
    Connected,
    /// WebSocket connection lost.
    Disconnected,
    /// Channel closed or errored.
    ChannelError { topic: String, message: String },
    /// A broadcast event received on a channel.
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    /// Server notice about the channel, e.g. credential expiry.
    System {
        topic: String,
        payload: serde_json::Value,
    },
    /// Error.
    Error(String),
}

/// Commands sent to the connection task from the client handle.
#[derive(Debug)]
pub(crate) enum RealtimeCommand {
    Join {
        topic: String,
        reply: ReplySender,
    },
    Push {
        topic: String,
        event: String,
        payload: serde_json::Value,
        reply: Option<ReplySender>,
    },
    AccessToken {
        token: String,
    },
}

impl std::fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingReply")
            .field("topic", &self.topic)
            .field("is_join", &self.is_join)
            .finish_non_exhaustive()
    }
}

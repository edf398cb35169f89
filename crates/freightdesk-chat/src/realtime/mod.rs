//! Thin realtime client over the Phoenix Channels v1 protocol.
//!
//! Provides a websocket client using `tokio-tungstenite` that handles
//! heartbeats, channel join with reply correlation, broadcast, credential
//! rotation and auto-reconnect with backoff. [`RealtimeProvider`] exposes it
//! as a [`MessagingProvider`](crate::provider::MessagingProvider).

mod adapter;
mod client;
mod connection;
mod handler;
mod types;

pub use adapter::{RealtimeMessagingClient, RealtimeProvider};
pub use client::RealtimeClient;
pub use types::{PhoenixMessage, RealtimeConfig, RealtimeEvent};

//! Messaging provider capability.
//!
//! The session never talks to a transport directly. It connects once
//! through a [`MessagingProvider`] and drives the resulting
//! [`MessagingClient`]; [`RealtimeProvider`](crate::realtime::RealtimeProvider)
//! is the websocket implementation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::message_store::Message;

/// Errors returned by a messaging provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("already a member of {0}")]
    AlreadyMember(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ProviderError {
    /// Join responses meaning the caller is already in the channel.
    pub fn is_membership_conflict(&self) -> bool {
        match self {
            ProviderError::AlreadyMember(_) => true,
            ProviderError::Rejected(reason) => {
                let reason = reason.to_ascii_lowercase();
                (reason.contains("already")
                    && (reason.contains("member") || reason.contains("joined")))
                    || reason.contains("conflict")
            }
            _ => false,
        }
    }
}

/// Connection-level events reported by a live client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    TokenAboutToExpire,
    TokenExpired,
    ConnectionError(String),
}

/// A connected client plus its connection-event stream.
pub struct ProviderConnection {
    pub client: Arc<dyn MessagingClient>,
    pub events: mpsc::Receiver<ClientEvent>,
}

/// Creates connected clients. Connecting blocks until the provider has
/// accepted the token or failed.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn connect(&self, token: &str) -> Result<ProviderConnection, ProviderError>;
}

/// Operations on a connected client.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Swap the credential of the live connection in place.
    async fn update_token(&self, token: &str) -> Result<(), ProviderError>;

    async fn join(&self, channel_id: &str) -> Result<(), ProviderError>;

    /// Most recent `limit` messages of a channel.
    async fn history(&self, channel_id: &str, limit: usize) -> Result<Vec<Message>, ProviderError>;

    /// Live messages of a joined channel. The stream ends when the provider
    /// closes or fails the channel; a socket reconnect does not end it.
    async fn subscribe(&self, channel_id: &str) -> Result<mpsc::Receiver<Message>, ProviderError>;

    /// Send a message and return it as the provider recorded it.
    async fn send(&self, channel_id: &str, body: &str) -> Result<Message, ProviderError>;
}

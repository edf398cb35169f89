//! [`MessagingProvider`] over the realtime socket.
//!
//! Each thread's provider channel maps to one realtime topic. Messages are
//! `message` broadcasts; history is a `history` request answered in the
//! reply.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::client::RealtimeClient;
use super::types::{RealtimeConfig, RealtimeEvent};
use crate::message_store::Message;
use crate::provider::{
    ClientEvent, MessagingClient, MessagingProvider, ProviderConnection, ProviderError,
};

/// Broadcast event name carrying chat messages.
pub(crate) const MESSAGE_EVENT: &str = "message";

type Subscribers = Arc<RwLock<HashMap<String, mpsc::Sender<Message>>>>;

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Connects [`RealtimeMessagingClient`]s with a chat credential.
#[derive(Debug, Clone)]
pub struct RealtimeProvider {
    config: RealtimeConfig,
    author_id: String,
}

impl RealtimeProvider {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            author_id: String::new(),
        }
    }

    /// Author recorded on messages sent through this provider.
    pub fn with_author_id(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = author_id.into();
        self
    }
}

#[async_trait]
impl MessagingProvider for RealtimeProvider {
    async fn connect(&self, token: &str) -> Result<ProviderConnection, ProviderError> {
        let config = RealtimeConfig {
            access_token: Some(token.to_string()),
            ..self.config.clone()
        };
        let (client, rt_events) = RealtimeClient::connect(config).await?;

        let subscribers: Subscribers = Arc::new(RwLock::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::channel(64);
        let router = tokio::spawn(route_events(rt_events, Arc::clone(&subscribers), event_tx));

        Ok(ProviderConnection {
            client: Arc::new(RealtimeMessagingClient {
                inner: client,
                subscribers,
                author_id: self.author_id.clone(),
                router,
            }),
            events: event_rx,
        })
    }
}

// ---------------------------------------------------------------------------
// Event routing
// ---------------------------------------------------------------------------

/// Classify a `system` notice; only credential expiry is interesting.
pub(crate) fn classify_system_notice(payload: &serde_json::Value) -> Option<ClientEvent> {
    let message = payload
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !message.contains("token") || !message.contains("expir") {
        return None;
    }
    if message.contains("about to") || message.contains("soon") {
        Some(ClientEvent::TokenAboutToExpire)
    } else {
        Some(ClientEvent::TokenExpired)
    }
}

async fn route_events(
    mut rt_events: mpsc::Receiver<RealtimeEvent>,
    subscribers: Subscribers,
    event_tx: mpsc::Sender<ClientEvent>,
) {
    while let Some(event) = rt_events.recv().await {
        match event {
            RealtimeEvent::Broadcast {
                topic,
                event,
                payload,
            } if event == MESSAGE_EVENT => {
                let message = match serde_json::from_value::<Message>(payload) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Dropping malformed message broadcast");
                        continue;
                    }
                };
                let sender = subscribers.read().await.get(&topic).cloned();
                if let Some(sender) = sender {
                    if sender.send(message).await.is_err() {
                        subscribers.write().await.remove(&topic);
                    }
                }
            }
            RealtimeEvent::Broadcast { topic, event, .. } => {
                debug!(topic = %topic, event = %event, "Ignoring broadcast");
            }
            RealtimeEvent::System { topic, payload } => {
                if let Some(client_event) = classify_system_notice(&payload) {
                    debug!(topic = %topic, event = ?client_event, "Credential notice");
                    let _ = event_tx.send(client_event).await;
                }
            }
            RealtimeEvent::ChannelError { topic, message } => {
                // Dropping the sender ends the topic's live stream.
                if subscribers.write().await.remove(&topic).is_some() {
                    debug!(topic = %topic, "Closed live stream of failed channel");
                }
                let _ = event_tx
                    .send(ClientEvent::ConnectionError(format!("{topic}: {message}")))
                    .await;
            }
            RealtimeEvent::Disconnected => {
                let _ = event_tx
                    .send(ClientEvent::ConnectionError("disconnected".into()))
                    .await;
            }
            RealtimeEvent::Error(reason) => {
                let _ = event_tx.send(ClientEvent::ConnectionError(reason)).await;
            }
            RealtimeEvent::Connected => debug!("Realtime socket connected"),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A live realtime connection driven through [`MessagingClient`].
pub struct RealtimeMessagingClient {
    inner: RealtimeClient,
    subscribers: Subscribers,
    author_id: String,
    router: JoinHandle<()>,
}

impl Drop for RealtimeMessagingClient {
    fn drop(&mut self) {
        self.inner.shutdown();
        self.router.abort();
    }
}

#[async_trait]
impl MessagingClient for RealtimeMessagingClient {
    async fn update_token(&self, token: &str) -> Result<(), ProviderError> {
        self.inner.set_access_token(token).await
    }

    async fn join(&self, channel_id: &str) -> Result<(), ProviderError> {
        match self.inner.join_channel(channel_id).await {
            Ok(_) => Ok(()),
            Err(ProviderError::Rejected(reason)) if reason.to_ascii_lowercase().contains("already") => {
                Err(ProviderError::AlreadyMember(channel_id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn history(&self, channel_id: &str, limit: usize) -> Result<Vec<Message>, ProviderError> {
        let response = self
            .inner
            .request(channel_id, "history", serde_json::json!({ "limit": limit }))
            .await?;
        match response.get("messages") {
            Some(messages) => serde_json::from_value(messages.clone())
                .map_err(|e| ProviderError::Protocol(format!("bad history reply: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    async fn subscribe(&self, channel_id: &str) -> Result<mpsc::Receiver<Message>, ProviderError> {
        let (tx, rx) = mpsc::channel(128);
        self.subscribers
            .write()
            .await
            .insert(channel_id.to_string(), tx);
        Ok(rx)
    }

    async fn send(&self, channel_id: &str, body: &str) -> Result<Message, ProviderError> {
        let message = Message {
            id: freightdesk_common::new_id(),
            body: body.to_string(),
            author_id: self.author_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            sequence_index: None,
        };
        let payload = serde_json::to_value(&message)
            .map_err(|e| ProviderError::Protocol(e.to_string()))?;
        let reply = self
            .inner
            .broadcast(channel_id, MESSAGE_EVENT, payload)
            .await?;

        // The server may echo the stored message with its sequence index.
        let stored = reply
            .get("message")
            .and_then(|m| serde_json::from_value::<Message>(m.clone()).ok());
        Ok(stored.unwrap_or(message))
    }
}

//! Public handle for interacting with the realtime connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::connection::connection_loop;
use super::types::{RealtimeCommand, RealtimeConfig, RealtimeEvent, SharedState};
use crate::provider::ProviderError;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle for interacting with the realtime connection.
///
/// Requests are sent as commands to the background connection task; the
/// ones that expect a `phx_reply` wait for it up to the reply timeout.
pub struct RealtimeClient {
    command_tx: mpsc::Sender<RealtimeCommand>,
    reply_timeout: Duration,
    cancel: CancellationToken,
}

impl RealtimeClient {
    /// Open the connection and wait for the first handshake to finish.
    /// Returns `(client, event_receiver)`.
    pub async fn connect(
        config: RealtimeConfig,
    ) -> Result<(Self, mpsc::Receiver<RealtimeEvent>), ProviderError> {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let state = Arc::new(SharedState::default());
        *state.access_token.write().await = config.access_token.clone().unwrap_or_default();

        let client = Self {
            command_tx,
            reply_timeout: config.reply_timeout(),
            cancel: cancel.clone(),
        };

        tokio::spawn(connection_loop(
            config, state, event_tx, command_rx, ready_tx, cancel,
        ));

        match ready_rx.await {
            Ok(Ok(())) => Ok((client, event_rx)),
            Ok(Err(reason)) => Err(ProviderError::Connection(reason)),
            Err(_) => Err(ProviderError::Connection(
                "connection task ended before connecting".into(),
            )),
        }
    }

    async fn command(&self, cmd: RealtimeCommand) -> Result<(), ProviderError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| ProviderError::Connection("connection task stopped".into()))
    }

    async fn await_reply(
        &self,
        rx: oneshot::Receiver<Result<serde_json::Value, String>>,
    ) -> Result<serde_json::Value, ProviderError> {
        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(reason))) => Err(ProviderError::Rejected(reason)),
            Ok(Err(_)) => Err(ProviderError::Connection("reply channel dropped".into())),
            Err(_) => Err(ProviderError::Protocol(format!(
                "no reply within {}s",
                self.reply_timeout.as_secs()
            ))),
        }
    }

    /// Join a channel and wait for the server to accept it.
    pub async fn join_channel(&self, topic: &str) -> Result<serde_json::Value, ProviderError> {
        let (reply, rx) = oneshot::channel();
        self.command(RealtimeCommand::Join {
            topic: topic.to_string(),
            reply,
        })
        .await?;
        self.await_reply(rx).await
    }

    /// Push a custom event on a channel and wait for its reply.
    pub async fn request(
        &self,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let (reply, rx) = oneshot::channel();
        self.command(RealtimeCommand::Push {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reply: Some(reply),
        })
        .await?;
        self.await_reply(rx).await
    }

    /// Send an acknowledged broadcast event on a channel.
    pub async fn broadcast(
        &self,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        self.request(
            topic,
            "broadcast",
            serde_json::json!({
                "type": "broadcast",
                "event": event,
                "payload": payload
            }),
        )
        .await
    }

    /// Replace the credential used by joined channels and future rejoins.
    pub async fn set_access_token(&self, token: &str) -> Result<(), ProviderError> {
        self.command(RealtimeCommand::AccessToken {
            token: token.to_string(),
        })
        .await
    }

    /// Stop the connection task without the leave handshake.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

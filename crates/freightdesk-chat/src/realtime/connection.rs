//! Background WebSocket connection loop with auto-reconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handler::handle_phoenix_message;
use super::types::{
    join_payload, PendingReply, PhoenixMessage, RealtimeCommand, RealtimeConfig, RealtimeEvent,
    ReplySender, SharedState,
};

// ---------------------------------------------------------------------------
// Ref Counter
// ---------------------------------------------------------------------------

/// Monotonically increasing ref counter for Phoenix messages.
static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

fn phoenix_topic(topic: &str) -> String {
    format!("realtime:{topic}")
}

async fn send_frame<S>(ws_write: &Mutex<S>, msg: &PhoenixMessage) -> Result<(), String>
where
    S: Sink<WsMessage> + Unpin,
{
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    let mut writer = ws_write.lock().await;
    writer
        .send(WsMessage::Text(json.into()))
        .await
        .map_err(|_| "websocket write failed".to_string())
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the WebSocket connection with auto-reconnect.
///
/// `ready` is resolved after the first connection attempt. When that first
/// attempt fails the loop exits instead of retrying, so the caller sees the
/// failure.
pub(crate) async fn connection_loop(
    config: RealtimeConfig,
    state: Arc<SharedState>,
    event_tx: mpsc::Sender<RealtimeEvent>,
    command_rx: mpsc::Receiver<RealtimeCommand>,
    ready: oneshot::Sender<Result<(), String>>,
    cancel: CancellationToken,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let mut ready = Some(ready);
    let mut reconnect_delay = config.reconnect_delay_secs;
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

    loop {
        let url = config.ws_url();
        info!(url = %url.split('?').next().unwrap_or(""), "Connecting to realtime socket");

        let attempt = tokio::select! {
            _ = cancel.cancelled() => return,
            attempt = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(&url)) => attempt,
        };

        let failure = match attempt {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                let _ = event_tx.send(RealtimeEvent::Connected).await;
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(()));
                }

                let (ws_write, mut ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                // Rejoin previously-joined channels with the current token.
                {
                    let token = state.access_token.read().await.clone();
                    let topics = state.joined_topics.read().await;
                    for topic in topics.iter() {
                        debug!(topic = %topic, "Rejoining channel");
                        let msg = PhoenixMessage {
                            topic: phoenix_topic(topic),
                            event: "phx_join".to_string(),
                            payload: join_payload(&token),
                            msg_ref: Some(next_ref()),
                        };
                        let _ = send_frame(&ws_write, &msg).await;
                    }
                }

                let heartbeat_handle = tokio::spawn(heartbeat_task(
                    Arc::clone(&ws_write),
                    config.heartbeat_interval_secs,
                ));
                let cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    Arc::clone(&state),
                ));

                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => break,
                        next = ws_read.next() => next,
                    };
                    match next {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<PhoenixMessage>(&text) {
                                Ok(phoenix_msg) => {
                                    handle_phoenix_message(&phoenix_msg, &state, &event_tx).await
                                }
                                Err(_) => debug!(text = %text.as_str(), "Unrecognized realtime frame"),
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            info!("Realtime socket closed by server");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }

                heartbeat_handle.abort();
                cmd_handle.abort();
                state.fail_pending("connection lost").await;
                if cancel.is_cancelled() {
                    let mut writer = ws_write.lock().await;
                    let _ = writer.send(WsMessage::Close(None)).await;
                    return;
                }
                let _ = event_tx.send(RealtimeEvent::Disconnected).await;
                None
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to realtime socket");
                Some(format!("connection failed: {e}"))
            }
            Err(_elapsed) => {
                error!(
                    timeout_secs = config.connect_timeout_secs,
                    "WebSocket connection timed out"
                );
                Some(format!(
                    "connection timed out after {}s",
                    config.connect_timeout_secs
                ))
            }
        };

        if let Some(reason) = failure {
            if let Some(ready) = ready.take() {
                let _ = ready.send(Err(reason));
                return;
            }
            let _ = event_tx.send(RealtimeEvent::Error(reason)).await;
        }

        // Exponential backoff reconnect.
        info!(delay = reconnect_delay, "Reconnecting in {} seconds", reconnect_delay);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(reconnect_delay)) => {}
        }
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, interval_secs: u64)
where
    S: Sink<WsMessage> + Unpin,
{
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        interval.tick().await;
        let msg = PhoenixMessage {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: serde_json::json!({}),
            msg_ref: Some(next_ref()),
        };
        if send_frame(&ws_write, &msg).await.is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Command Forwarder
// ---------------------------------------------------------------------------

/// Register a reply slot, write the frame, and fail the slot if the write
/// does not go through.
async fn request<S>(
    ws_write: &Mutex<S>,
    state: &SharedState,
    msg: PhoenixMessage,
    topic: &str,
    is_join: bool,
    reply: ReplySender,
) where
    S: Sink<WsMessage> + Unpin,
{
    let msg_ref = msg.msg_ref.clone().unwrap_or_default();
    state.pending.lock().await.insert(
        msg_ref.clone(),
        PendingReply {
            topic: topic.to_string(),
            is_join,
            reply,
        },
    );
    if let Err(e) = send_frame(ws_write, &msg).await {
        if let Some(pending) = state.pending.lock().await.remove(&msg_ref) {
            let _ = pending.reply.send(Err(e));
        }
    }
}

async fn command_forwarder<S>(
    cmd_rx: Arc<Mutex<mpsc::Receiver<RealtimeCommand>>>,
    ws_write: Arc<Mutex<S>>,
    state: Arc<SharedState>,
) where
    S: Sink<WsMessage> + Unpin,
{
    let mut rx = cmd_rx.lock().await;
    while let Some(cmd) = rx.recv().await {
        match cmd {
            RealtimeCommand::Join { topic, reply } => {
                let token = state.access_token.read().await.clone();
                let msg = PhoenixMessage {
                    topic: phoenix_topic(&topic),
                    event: "phx_join".to_string(),
                    payload: join_payload(&token),
                    msg_ref: Some(next_ref()),
                };
                state.joined_topics.write().await.insert(topic.clone());
                request(&ws_write, &state, msg, &topic, true, reply).await;
            }
            RealtimeCommand::Push {
                topic,
                event,
                payload,
                reply,
            } => {
                let msg = PhoenixMessage {
                    topic: phoenix_topic(&topic),
                    event,
                    payload,
                    msg_ref: Some(next_ref()),
                };
                match reply {
                    Some(reply) => request(&ws_write, &state, msg, &topic, false, reply).await,
                    None => {
                        let _ = send_frame(&ws_write, &msg).await;
                    }
                }
            }
            RealtimeCommand::AccessToken { token } => {
                *state.access_token.write().await = token.clone();
                let topics: Vec<String> = state.joined_topics.read().await.iter().cloned().collect();
                for topic in topics {
                    let msg = PhoenixMessage {
                        topic: phoenix_topic(&topic),
                        event: "access_token".to_string(),
                        payload: serde_json::json!({ "access_token": token }),
                        msg_ref: Some(next_ref()),
                    };
                    let _ = send_frame(&ws_write, &msg).await;
                }
            }
        }
    }
}

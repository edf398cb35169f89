//! Incoming Phoenix message handler.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::types::{PhoenixMessage, RealtimeEvent, SharedState};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract the short topic name from a Phoenix topic (strip "realtime:" prefix).
fn strip_topic_prefix(topic: &str) -> &str {
    topic.strip_prefix("realtime:").unwrap_or(topic)
}

/// Failure reason of a `phx_reply`, wherever the server put it.
fn reply_reason(payload: &serde_json::Value) -> String {
    let response = payload.get("response");
    response
        .and_then(|r| r.get("reason").or_else(|| r.get("message")))
        .and_then(|r| r.as_str())
        .or_else(|| response.and_then(|r| r.as_str()))
        .unwrap_or("unknown error")
        .to_string()
}

// ---------------------------------------------------------------------------
// Message Handler
// ---------------------------------------------------------------------------

/// Handle a single incoming Phoenix message.
pub(crate) async fn handle_phoenix_message(
    msg: &PhoenixMessage,
    state: &SharedState,
    event_tx: &mpsc::Sender<RealtimeEvent>,
) {
    let topic = strip_topic_prefix(&msg.topic);

    match msg.event.as_str() {
        "phx_reply" => {
            let status = msg
                .payload
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("error");
            let pending = match &msg.msg_ref {
                Some(msg_ref) => state.pending.lock().await.remove(msg_ref),
                None => None,
            };

            let outcome = if status == "ok" {
                Ok(msg
                    .payload
                    .get("response")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null))
            } else {
                Err(reply_reason(&msg.payload))
            };

            match pending {
                Some(pending) => {
                    if pending.is_join && outcome.is_err() {
                        state.joined_topics.write().await.remove(&pending.topic);
                    }
                    debug!(topic = %topic, status = %status, "Routed channel reply");
                    let _ = pending.reply.send(outcome);
                }
                None => {
                    if let Err(message) = outcome {
                        // Rejoin after reconnect, or a request nobody waits for.
                        warn!(topic = %topic, status = %status, "Channel reply error");
                        let _ = event_tx
                            .send(RealtimeEvent::ChannelError {
                                topic: topic.to_string(),
                                message,
                            })
                            .await;
                    }
                }
            }
        }
        "phx_error" => {
            warn!(topic = %topic, "Channel error");
            let _ = event_tx
                .send(RealtimeEvent::ChannelError {
                    topic: topic.to_string(),
                    message: "Channel error".to_string(),
                })
                .await;
        }
        "phx_close" => {
            info!(topic = %topic, "Channel closed");
            let _ = event_tx
                .send(RealtimeEvent::ChannelError {
                    topic: topic.to_string(),
                    message: "Channel closed".to_string(),
                })
                .await;
        }
        "broadcast" => {
            let inner_event = msg
                .payload
                .get("event")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown")
                .to_string();
            let inner_payload = msg
                .payload
                .get("payload")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            debug!(topic = %topic, event = %inner_event, "Broadcast received");
            let _ = event_tx
                .send(RealtimeEvent::Broadcast {
                    topic: topic.to_string(),
                    event: inner_event,
                    payload: inner_payload,
                })
                .await;
        }
        "system" => {
            debug!(topic = %topic, "System notice received");
            let _ = event_tx
                .send(RealtimeEvent::System {
                    topic: topic.to_string(),
                    payload: msg.payload.clone(),
                })
                .await;
        }
        _ => {
            debug!(
                topic = %topic,
                event = %msg.event,
                "Unhandled Phoenix event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::types::PendingReply;
    use tokio::sync::oneshot;

    fn reply(msg_ref: &str, payload: serde_json::Value) -> PhoenixMessage {
        PhoenixMessage {
            topic: "realtime:C1".into(),
            event: "phx_reply".into(),
            payload,
            msg_ref: Some(msg_ref.into()),
        }
    }

    async fn register(state: &SharedState, msg_ref: &str, is_join: bool) -> oneshot::Receiver<Result<serde_json::Value, String>> {
        let (tx, rx) = oneshot::channel();
        state.pending.lock().await.insert(
            msg_ref.into(),
            PendingReply {
                topic: "C1".into(),
                is_join,
                reply: tx,
            },
        );
        rx
    }

    #[tokio::test]
    async fn ok_reply_resolves_pending_request() {
        let state = SharedState::default();
        let (event_tx, _event_rx) = mpsc::channel(8);
        let rx = register(&state, "7", false).await;

        let msg = reply(
            "7",
            serde_json::json!({"status": "ok", "response": {"messages": []}}),
        );
        handle_phoenix_message(&msg, &state, &event_tx).await;

        let outcome = rx.await.unwrap().unwrap();
        assert_eq!(outcome, serde_json::json!({"messages": []}));
        assert!(state.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn failed_join_reply_forgets_topic() {
        let state = SharedState::default();
        state.joined_topics.write().await.insert("C1".into());
        let (event_tx, _event_rx) = mpsc::channel(8);
        let rx = register(&state, "8", true).await;

        let msg = reply(
            "8",
            serde_json::json!({"status": "error", "response": {"reason": "unauthorized"}}),
        );
        handle_phoenix_message(&msg, &state, &event_tx).await;

        assert_eq!(rx.await.unwrap(), Err("unauthorized".to_string()));
        assert!(state.joined_topics.read().await.is_empty());
    }

    #[tokio::test]
    async fn unsolicited_error_reply_becomes_channel_error() {
        let state = SharedState::default();
        let (event_tx, mut event_rx) = mpsc::channel(8);

        let msg = reply(
            "99",
            serde_json::json!({"status": "error", "response": {"reason": "denied"}}),
        );
        handle_phoenix_message(&msg, &state, &event_tx).await;

        match event_rx.recv().await.unwrap() {
            RealtimeEvent::ChannelError { topic, message } => {
                assert_eq!(topic, "C1");
                assert_eq!(message, "denied");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_and_system_events_are_forwarded() {
        let state = SharedState::default();
        let (event_tx, mut event_rx) = mpsc::channel(8);

        let broadcast = PhoenixMessage {
            topic: "realtime:C1".into(),
            event: "broadcast".into(),
            payload: serde_json::json!({"type": "broadcast", "event": "message", "payload": {"id": "m1"}}),
            msg_ref: None,
        };
        handle_phoenix_message(&broadcast, &state, &event_tx).await;
        match event_rx.recv().await.unwrap() {
            RealtimeEvent::Broadcast { topic, event, payload } => {
                assert_eq!(topic, "C1");
                assert_eq!(event, "message");
                assert_eq!(payload["id"], "m1");
            }
            other => panic!("unexpected event {other:?}"),
        }

        let system = PhoenixMessage {
            topic: "realtime:C1".into(),
            event: "system".into(),
            payload: serde_json::json!({"status": "error", "message": "Token has expired"}),
            msg_ref: None,
        };
        handle_phoenix_message(&system, &state, &event_tx).await;
        assert!(matches!(
            event_rx.recv().await.unwrap(),
            RealtimeEvent::System { .. }
        ));
    }

    #[test]
    fn reply_reason_variants() {
        assert_eq!(
            reply_reason(&serde_json::json!({"response": {"reason": "r"}})),
            "r"
        );
        assert_eq!(
            reply_reason(&serde_json::json!({"response": {"message": "m"}})),
            "m"
        );
        assert_eq!(reply_reason(&serde_json::json!({"response": "plain"})), "plain");
        assert_eq!(reply_reason(&serde_json::json!({})), "unknown error");
    }
}

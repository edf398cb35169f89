//! Session events for UI consumers.

use tokio::sync::broadcast;

/// Something observable changed in a [`ChatSession`](crate::ChatSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The thread list was replaced by a list-refresh.
    ThreadsRefreshed { count: usize },
    /// A thread's message log changed.
    MessagesUpdated { thread_id: String, count: usize },
    /// A new credential became authoritative.
    CredentialInstalled { thread_id: String },
    /// A background refresh failed; the session keeps its previous state.
    BackgroundRefreshFailed { reason: String },
    /// The session was signed out and all state dropped.
    SessionReset,
}

/// Fan-out of [`ChatEvent`]s over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn publish(&self, event: ChatEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

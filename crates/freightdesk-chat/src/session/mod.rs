//! The messaging session object.
//!
//! [`ChatSession`] owns one provider connection and one current credential
//! for a signed-in user, and maps business conversations onto joined,
//! live-updating provider channels. It is cheap to clone; clones share the
//! same state.
//!
//! Lock order is refresh lock, then client, then credential, then state.
//! The state lock is never held across an await.

mod background;
mod bulk;
mod credentials;
mod resolve;
mod state;
mod sync;


use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use crate::auth::AuthSession;
use crate::backend::ChatBackend;
use crate::config::ChatConfig;
use crate::credential::Credential;
use crate::error::ChatError;
use crate::events::{ChatEvent, EventBus};
use crate::message_store::Message;
use crate::provider::{MessagingClient, MessagingProvider};
use crate::thread::Thread;

use background::RefreshTrigger;
use state::ChatState;

pub use bulk::{recipient_key, BroadcastOutcome, BulkOpenOutcome, Recipient};
pub use resolve::PeerThreadOptions;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub(crate) struct Inner {
    pub(crate) config: ChatConfig,
    pub(crate) backend: Arc<dyn ChatBackend>,
    pub(crate) provider: Arc<dyn MessagingProvider>,
    pub(crate) auth: RwLock<Option<AuthSession>>,
    /// Serialises credential refreshes.
    pub(crate) refresh_lock: Mutex<()>,
    pub(crate) credential: RwLock<Option<Credential>>,
    pub(crate) client: RwLock<Option<Arc<dyn MessagingClient>>>,
    pub(crate) state: RwLock<ChatState>,
    pub(crate) join_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    pub(crate) provisioning_disabled: AtomicBool,
    /// Bumped on sign-out; work started under an older epoch is discarded.
    pub(crate) epoch: AtomicU64,
    /// Bumped on every credential install; stale expiry watchdogs compare it.
    pub(crate) generation: AtomicU64,
    /// Expiry watchdog of the current credential.
    pub(crate) watchdog: Mutex<Option<JoinHandle<()>>>,
    pub(crate) events: EventBus,
    pub(crate) refresh_tx: mpsc::UnboundedSender<RefreshTrigger>,
}

impl Inner {
    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Fail with `AuthRequired` when the session was torn down since `epoch`.
    pub(crate) fn check_epoch(&self, epoch: u64) -> Result<(), ChatError> {
        if self.current_epoch() == epoch {
            Ok(())
        } else {
            Err(ChatError::AuthRequired)
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A signed-in user's messaging session.
#[derive(Clone)]
pub struct ChatSession {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("config", &self.inner.config)
            .field("epoch", &self.inner.current_epoch())
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Create a session. Must be called inside a Tokio runtime: the
    /// background refresher is spawned here.
    pub fn new(
        config: ChatConfig,
        backend: Arc<dyn ChatBackend>,
        provider: Arc<dyn MessagingProvider>,
    ) -> Self {
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let events = EventBus::new(config.event_capacity);
        let inner = Arc::new(Inner {
            config,
            backend,
            provider,
            auth: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            credential: RwLock::new(None),
            client: RwLock::new(None),
            state: RwLock::new(ChatState::default()),
            join_locks: Mutex::new(HashMap::new()),
            provisioning_disabled: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            watchdog: Mutex::new(None),
            events,
            refresh_tx,
        });
        tokio::spawn(background::run_refresher(Arc::downgrade(&inner), refresh_rx));
        Self { inner }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.inner.config
    }

    /// Receive [`ChatEvent`]s published by this session.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.events.subscribe()
    }

    // -- auth ---------------------------------------------------------------

    /// Start acting for `auth`. Signing in as a different user tears the
    /// previous user's state down first.
    pub async fn sign_in(&self, auth: AuthSession) {
        let previous_user = self
            .inner
            .auth
            .read()
            .await
            .as_ref()
            .map(|a| a.user_id.clone());
        if previous_user.is_some_and(|user| user != auth.user_id) {
            self.sign_out().await;
        }
        info!(user_id = %auth.user_id, "Chat session signed in");
        *self.inner.auth.write().await = Some(auth);
    }

    /// Drop the client, the credential, every channel session, thread and
    /// message. Channels are not left on the provider side.
    pub async fn sign_out(&self) {
        let inner = &self.inner;
        inner.epoch.fetch_add(1, Ordering::SeqCst);
        inner.generation.fetch_add(1, Ordering::SeqCst);
        *inner.auth.write().await = None;

        let client = inner.client.write().await.take();
        *inner.credential.write().await = None;
        inner.state.write().await.reset();
        if let Some(watchdog) = inner.watchdog.lock().await.take() {
            watchdog.abort();
        }
        inner.join_locks.lock().await.clear();
        inner.provisioning_disabled.store(false, Ordering::SeqCst);
        drop(client);

        info!("Chat session signed out");
        inner.events.publish(ChatEvent::SessionReset);
    }

    pub(crate) async fn require_auth(&self) -> Result<AuthSession, ChatError> {
        self.inner
            .auth
            .read()
            .await
            .clone()
            .ok_or(ChatError::AuthRequired)
    }

    pub(crate) async fn current_client(&self) -> Option<Arc<dyn MessagingClient>> {
        self.inner.client.read().await.clone()
    }

    // -- reads --------------------------------------------------------------

    /// Known threads, list order first, then provisional ones.
    pub async fn threads(&self) -> Vec<Thread> {
        self.inner.state.read().await.threads.clone()
    }

    pub async fn thread(&self, thread_id: &str) -> Option<Thread> {
        self.inner.state.read().await.thread(thread_id).cloned()
    }

    /// Messages of a thread, oldest first.
    pub async fn messages(&self, thread_id: &str) -> Vec<Message> {
        self.inner.state.read().await.store.messages(thread_id).to_vec()
    }

    pub async fn selected_thread(&self) -> Option<String> {
        self.inner.state.read().await.selected.clone()
    }

    pub async fn current_credential(&self) -> Option<Credential> {
        self.inner.credential.read().await.clone()
    }

    /// Whether a live listener is attached for the thread.
    pub async fn is_listening(&self, thread_id: &str) -> bool {
        self.inner
            .state
            .read()
            .await
            .sessions
            .get(thread_id)
            .is_some_and(|s| s.listening)
    }
}

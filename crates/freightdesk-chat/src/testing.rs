//! In-memory test doubles for the backend and the messaging provider.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::backend::{
    BackendError, ChatBackend, ProvisionRequest, ThreadRow, TokenRequest, TokenResponse,
};
use crate::message_store::Message;
use crate::provider::{
    ClientEvent, MessagingClient, MessagingProvider, ProviderConnection, ProviderError,
};

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

struct BackendState {
    /// Request key to issued (thread, channel).
    registry: HashMap<String, (String, String)>,
    next_thread: usize,
    requests: Vec<TokenRequest>,
    failing_shippers: HashSet<String>,
    membership_failures: usize,
    token_failures: usize,
    provision_missing: bool,
    without_channel: bool,
    list_issued: bool,
    ttl_secs: i64,
    rows: Vec<ThreadRow>,
}

/// Backend issuing `T<n>`/`C<n>` pairs per distinct scope.
pub(crate) struct MockBackend {
    token_calls: AtomicUsize,
    provision_calls: AtomicUsize,
    list_calls: AtomicUsize,
    state: Mutex<BackendState>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self {
            token_calls: AtomicUsize::new(0),
            provision_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            state: Mutex::new(BackendState {
                registry: HashMap::new(),
                next_thread: 0,
                requests: Vec::new(),
                failing_shippers: HashSet::new(),
                membership_failures: 0,
                token_failures: 0,
                provision_missing: false,
                without_channel: false,
                list_issued: false,
                ttl_secs: 3600,
                rows: Vec::new(),
            }),
        }
    }

    pub(crate) fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn provision_calls(&self) -> usize {
        self.provision_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_request(&self) -> Option<TokenRequest> {
        self.state.lock().unwrap().requests.last().cloned()
    }

    pub(crate) fn fail_shipper(&self, org_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_shippers
            .insert(org_id.to_string());
    }

    /// The next `n` token requests fail with "not a member".
    pub(crate) fn fail_membership(&self, n: usize) {
        self.state.lock().unwrap().membership_failures = n;
    }

    /// The next `n` token requests fail with a server error.
    pub(crate) fn fail_tokens(&self, n: usize) {
        self.state.lock().unwrap().token_failures = n;
    }

    pub(crate) fn provision_missing(&self) {
        self.state.lock().unwrap().provision_missing = true;
    }

    pub(crate) fn issue_without_channel(&self) {
        self.state.lock().unwrap().without_channel = true;
    }

    /// Include every issued thread in the thread list.
    pub(crate) fn list_issued(&self) {
        self.state.lock().unwrap().list_issued = true;
    }

    pub(crate) fn set_ttl(&self, secs: i64) {
        self.state.lock().unwrap().ttl_secs = secs;
    }

    pub(crate) fn set_rows(&self, rows: Vec<ThreadRow>) {
        self.state.lock().unwrap().rows = rows;
    }
}

fn request_key(request: &TokenRequest) -> String {
    let field = |v: &Option<String>| v.clone().unwrap_or_default();
    match (&request.thread_id, &request.peer_shipper_org_id) {
        (Some(thread_id), _) => format!("thread:{thread_id}"),
        (None, Some(peer)) => format!("peer:{peer}:{}", field(&request.quote_id)),
        (None, None) => format!(
            "quote:{}:{}:{}:{}",
            field(&request.quote_id),
            field(&request.shipment_id),
            field(&request.shipper_branch_org_id),
            field(&request.gallery_branch_org_id)
        ),
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn issue_token(
        &self,
        _bearer: &str,
        request: &TokenRequest,
    ) -> Result<TokenResponse, BackendError> {
        let call = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        if state.membership_failures > 0 {
            state.membership_failures -= 1;
            return Err(BackendError::Rejected {
                status: 403,
                message: "User is not a member of this conversation".into(),
            });
        }
        if state.token_failures > 0 {
            state.token_failures -= 1;
            return Err(BackendError::Rejected {
                status: 500,
                message: "token service unavailable".into(),
            });
        }
        if let Some(shipper) = &request.shipper_branch_org_id {
            if state.failing_shippers.contains(shipper) {
                return Err(BackendError::Rejected {
                    status: 422,
                    message: format!("shipper {shipper} cannot be messaged"),
                });
            }
        }

        let key = request_key(request);
        let (thread_id, channel_id) = match state.registry.get(&key) {
            Some(pair) => pair.clone(),
            None => {
                let existing = request.thread_id.as_ref().and_then(|t| {
                    state.registry.values().find(|(thread, _)| thread == t).cloned()
                });
                let pair = match (existing, &request.thread_id) {
                    (Some(pair), _) => pair,
                    (None, Some(t)) => (t.clone(), format!("C-{t}")),
                    (None, None) => {
                        state.next_thread += 1;
                        let n = state.next_thread;
                        (format!("T{n}"), format!("C{n}"))
                    }
                };
                state.registry.insert(key, pair.clone());
                pair
            }
        };

        let peer = request.peer_shipper_org_id.clone();
        Ok(TokenResponse {
            token: format!("tok-{call}"),
            expires_at: Utc::now() + chrono::Duration::seconds(state.ttl_secs),
            thread_id,
            conversation_sid: if state.without_channel {
                String::new()
            } else {
                channel_id
            },
            quote_id: request.quote_id.clone(),
            shipment_id: request.shipment_id.clone(),
            shipper_branch_org_id: request.shipper_branch_org_id.clone(),
            gallery_branch_org_id: request.gallery_branch_org_id.clone(),
            conversation_type: peer.as_ref().map(|_| "shipper_peer".to_string()),
            peer_shipper_org_ids: peer.into_iter().collect(),
            initiator_shipper_org_id: request.initiator_branch_org_id.clone(),
        })
    }

    async fn provision(
        &self,
        _bearer: &str,
        _request: &ProvisionRequest,
    ) -> Result<(), BackendError> {
        self.provision_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.lock().unwrap().provision_missing {
            return Err(BackendError::NotFound("chat/provision".into()));
        }
        Ok(())
    }

    async fn list_threads(&self, _bearer: &str) -> Result<Vec<ThreadRow>, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        let mut rows = state.rows.clone();
        if state.list_issued {
            let mut issued: Vec<&(String, String)> = state.registry.values().collect();
            issued.sort();
            issued.dedup();
            for (thread_id, channel_id) in issued {
                if rows.iter().any(|r| &r.id == thread_id) {
                    continue;
                }
                rows.push(ThreadRow {
                    id: thread_id.clone(),
                    conversation_sid: Some(channel_id.clone()),
                    ..ThreadRow::default()
                });
            }
        }
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ClientState {
    already_member: HashSet<String>,
    rejected_joins: HashSet<String>,
    failing_sends: HashSet<String>,
    history: HashMap<String, Vec<Message>>,
    /// Broadcast while the channel's next history request is served.
    racing: HashMap<String, Vec<Message>>,
    subscribers: HashMap<String, mpsc::Sender<Message>>,
    tokens: Vec<String>,
}

/// Client recording every call.
#[derive(Default)]
pub(crate) struct MockClient {
    joins: AtomicUsize,
    subscribes: AtomicUsize,
    history_calls: AtomicUsize,
    sends: AtomicUsize,
    state: Mutex<ClientState>,
}

impl MockClient {
    pub(crate) fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub(crate) fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub(crate) fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    /// Tokens handed over through `update_token`.
    pub(crate) fn token_updates(&self) -> Vec<String> {
        self.state.lock().unwrap().tokens.clone()
    }

    pub(crate) fn already_member_of(&self, channel_id: &str) {
        self.state
            .lock()
            .unwrap()
            .already_member
            .insert(channel_id.to_string());
    }

    pub(crate) fn reject_join(&self, channel_id: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_joins
            .insert(channel_id.to_string());
    }

    pub(crate) fn fail_sends_on(&self, channel_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_sends
            .insert(channel_id.to_string());
    }

    pub(crate) fn set_history(&self, channel_id: &str, messages: Vec<Message>) {
        self.state
            .lock()
            .unwrap()
            .history
            .insert(channel_id.to_string(), messages);
    }

    /// Broadcast `message` on the channel while its next history request is
    /// in flight. Without a subscriber at that moment it is lost, as on the
    /// realtime socket.
    pub(crate) fn broadcast_during_history(&self, channel_id: &str, message: Message) {
        self.state
            .lock()
            .unwrap()
            .racing
            .entry(channel_id.to_string())
            .or_default()
            .push(message);
    }

    /// Deliver a live message to the channel's subscriber.
    pub(crate) async fn push_live(&self, channel_id: &str, message: Message) {
        let sender = self.state.lock().unwrap().subscribers.get(channel_id).cloned();
        sender
            .expect("channel has no subscriber")
            .send(message)
            .await
            .expect("listener dropped");
    }

    /// End the channel's live stream.
    pub(crate) fn close_subscription(&self, channel_id: &str) {
        self.state.lock().unwrap().subscribers.remove(channel_id);
    }
}

#[async_trait]
impl MessagingClient for MockClient {
    async fn update_token(&self, token: &str) -> Result<(), ProviderError> {
        self.state.lock().unwrap().tokens.push(token.to_string());
        Ok(())
    }

    async fn join(&self, channel_id: &str) -> Result<(), ProviderError> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.rejected_joins.contains(channel_id) {
            return Err(ProviderError::Rejected("forbidden".into()));
        }
        if state.already_member.contains(channel_id) {
            return Err(ProviderError::AlreadyMember(channel_id.to_string()));
        }
        Ok(())
    }

    async fn history(&self, channel_id: &str, limit: usize) -> Result<Vec<Message>, ProviderError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let racing = state.racing.remove(channel_id).unwrap_or_default();
        if let Some(sender) = state.subscribers.get(channel_id) {
            for message in racing {
                let _ = sender.try_send(message);
            }
        }
        let all = state.history.get(channel_id).cloned().unwrap_or_default();
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn subscribe(&self, channel_id: &str) -> Result<mpsc::Receiver<Message>, ProviderError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(32);
        self.state
            .lock()
            .unwrap()
            .subscribers
            .insert(channel_id.to_string(), tx);
        Ok(rx)
    }

    async fn send(&self, channel_id: &str, body: &str) -> Result<Message, ProviderError> {
        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        if self.state.lock().unwrap().failing_sends.contains(channel_id) {
            return Err(ProviderError::Rejected(format!("channel {channel_id} is read-only")));
        }
        Ok(Message {
            id: format!("sent-{n}"),
            body: body.to_string(),
            author_id: "user-1".into(),
            timestamp: Utc::now().to_rfc3339(),
            sequence_index: None,
        })
    }
}

/// Provider handing out one shared [`MockClient`].
pub(crate) struct MockProvider {
    pub(crate) client: Arc<MockClient>,
    connects: AtomicUsize,
    fail_connect: AtomicBool,
    events: Mutex<Option<mpsc::Sender<ClientEvent>>>,
}

impl MockProvider {
    pub(crate) fn new() -> Self {
        Self {
            client: Arc::new(MockClient::default()),
            connects: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            events: Mutex::new(None),
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    /// Report a connection event on the latest connection.
    pub(crate) async fn emit(&self, event: ClientEvent) {
        let sender = self.events.lock().unwrap().clone();
        sender
            .expect("not connected")
            .send(event)
            .await
            .expect("event pump dropped");
    }
}

#[async_trait]
impl MessagingProvider for MockProvider {
    async fn connect(&self, _token: &str) -> Result<ProviderConnection, ProviderError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ProviderError::Connection("provider offline".into()));
        }
        let (tx, rx) = mpsc::channel(16);
        *self.events.lock().unwrap() = Some(tx);
        Ok(ProviderConnection {
            client: Arc::clone(&self.client) as Arc<dyn MessagingClient>,
            events: rx,
        })
    }
}

/// A message with an optional sequence index.
pub(crate) fn message(id: &str, timestamp: &str, sequence_index: Option<u64>) -> Message {
    Message {
        id: id.to_string(),
        body: format!("body of {id}"),
        author_id: "user-2".into(),
        timestamp: timestamp.to_string(),
        sequence_index,
    }
}

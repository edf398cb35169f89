//! Thread list refresh, channel join and message sync.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::state::ChannelSession;
use super::ChatSession;
use crate::backend::ThreadRow;
use crate::credential::RefreshOptions;
use crate::error::{with_deadline, ChatError};
use crate::events::ChatEvent;
use crate::message_store::Message;
use crate::provider::MessagingClient;
use crate::thread::Thread;

impl ChatSession {
    /// Replace the thread list with the record store's view.
    pub async fn refresh_threads(&self) -> Result<Vec<Thread>, ChatError> {
        let auth = self.require_auth().await?;
        let epoch = self.inner.current_epoch();
        let rows = with_deadline(
            "thread list",
            self.inner.config.request_timeout,
            self.inner.backend.list_threads(&auth.access_token),
        )
        .await??;
        let listed: Vec<Thread> = rows.into_iter().map(ThreadRow::into_thread).collect();

        let threads = {
            let mut state = self.inner.state.write().await;
            self.inner.check_epoch(epoch)?;
            state.apply_thread_list(listed);
            state.threads.clone()
        };
        debug!(count = threads.len(), "Thread list refreshed");
        self.inner.events.publish(ChatEvent::ThreadsRefreshed {
            count: threads.len(),
        });
        Ok(threads)
    }

    async fn join_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.join_locks.lock().await;
        Arc::clone(locks.entry(thread_id.to_string()).or_default())
    }

    /// Find the thread locally, after a list-refresh, or from the current
    /// credential as a provisional record.
    async fn locate_thread(&self, thread_id: &str) -> Result<Thread, ChatError> {
        if let Some(thread) = self.thread(thread_id).await {
            return Ok(thread);
        }
        if let Err(e) = self.refresh_threads().await {
            warn!(thread_id = %thread_id, error = %e, "List refresh failed while locating thread");
        }
        if let Some(thread) = self.thread(thread_id).await {
            return Ok(thread);
        }

        let credential = self.current_credential().await;
        match credential {
            Some(c) if c.thread_id == thread_id => {
                let thread = Thread::provisional(c.thread_id, c.channel_id, c.scope);
                debug!(thread_id = %thread.id, "Synthesised provisional thread from credential");
                self.inner
                    .state
                    .write()
                    .await
                    .upsert_provisional(thread.clone());
                Ok(thread)
            }
            _ => Err(ChatError::ChannelUnavailable {
                thread_id: thread_id.to_string(),
            }),
        }
    }

    /// Provider channel of a thread: the record's own, else the one named by
    /// a credential for the thread.
    async fn channel_for(&self, thread: &Thread) -> Result<String, ChatError> {
        if let Some(channel_id) = &thread.channel_id {
            return Ok(channel_id.clone());
        }
        let credential = self
            .refresh_credential(RefreshOptions::for_thread(&thread.id))
            .await?;
        if credential.thread_id != thread.id {
            return Err(ChatError::ChannelUnavailable {
                thread_id: thread.id.clone(),
            });
        }
        Ok(credential.channel_id)
    }

    /// Join a thread's channel once, subscribe to it, hydrate its history
    /// and attach one live listener. Safe to call repeatedly and
    /// concurrently.
    pub async fn ensure_joined(&self, thread_id: &str) -> Result<(), ChatError> {
        self.require_auth().await?;
        let lock = self.join_lock(thread_id).await;
        let _joining = lock.lock().await;
        let epoch = self.inner.current_epoch();

        let thread = self.locate_thread(thread_id).await?;
        if self.current_client().await.is_none() {
            self.refresh_credential(RefreshOptions::for_thread(thread_id).forced())
                .await?;
        }
        let client = self
            .current_client()
            .await
            .ok_or(ChatError::AuthRequired)?;

        let existing = {
            let state = self.inner.state.read().await;
            state.sessions.get(thread_id).map(|s| {
                (
                    s.channel_id.clone(),
                    s.listening,
                    state.store.has_entries(thread_id),
                )
            })
        };

        if let Some((channel_id, listening, hydrated)) = existing {
            let rx = if listening {
                None
            } else {
                debug!(thread_id = %thread_id, "Reattaching live listener");
                Some(self.subscribe_channel(&client, &channel_id).await?)
            };
            if !hydrated {
                self.hydrate(&client, thread_id, &channel_id).await?;
            }
            if let Some(rx) = rx {
                self.attach_session(thread_id, channel_id, rx, epoch).await?;
            }
            return Ok(());
        }

        let channel_id = self.channel_for(&thread).await?;
        match with_deadline(
            "channel join",
            self.inner.config.join_timeout,
            client.join(&channel_id),
        )
        .await?
        {
            Ok(()) => {}
            Err(e) if e.is_membership_conflict() => {
                debug!(thread_id = %thread_id, "Already a channel member");
            }
            Err(e) => return Err(e.into()),
        }

        // Subscribe before the history fetch so broadcasts racing it are
        // buffered in `rx`; the id-keyed merge drops the overlap.
        let rx = self.subscribe_channel(&client, &channel_id).await?;
        self.hydrate(&client, thread_id, &channel_id).await?;
        self.attach_session(thread_id, channel_id, rx, epoch).await?;
        info!(thread_id = %thread_id, "Channel joined");
        Ok(())
    }

    async fn subscribe_channel(
        &self,
        client: &Arc<dyn MessagingClient>,
        channel_id: &str,
    ) -> Result<mpsc::Receiver<Message>, ChatError> {
        Ok(with_deadline(
            "channel subscribe",
            self.inner.config.join_timeout,
            client.subscribe(channel_id),
        )
        .await??)
    }

    /// Fetch a page of history and merge it into the store.
    async fn hydrate(
        &self,
        client: &Arc<dyn MessagingClient>,
        thread_id: &str,
        channel_id: &str,
    ) -> Result<(), ChatError> {
        let page = with_deadline(
            "history fetch",
            self.inner.config.join_timeout,
            client.history(channel_id, self.inner.config.history_page_size),
        )
        .await??;
        let fetched = page.len();
        let count = self.inner.state.write().await.store.merge_into(thread_id, page);
        debug!(thread_id = %thread_id, fetched, count, "History hydrated");
        self.inner.events.publish(ChatEvent::MessagesUpdated {
            thread_id: thread_id.to_string(),
            count,
        });
        Ok(())
    }

    /// Record the channel session and start its listener.
    async fn attach_session(
        &self,
        thread_id: &str,
        channel_id: String,
        rx: mpsc::Receiver<Message>,
        epoch: u64,
    ) -> Result<(), ChatError> {
        let mut state = self.inner.state.write().await;
        self.inner.check_epoch(epoch)?;
        let listener = self.spawn_listener(thread_id.to_string(), rx);
        let previous = state.sessions.insert(
            thread_id.to_string(),
            ChannelSession {
                channel_id,
                listening: true,
                listener: Some(listener),
            },
        );
        if let Some(mut previous) = previous {
            previous.detach();
        }
        Ok(())
    }

    fn spawn_listener(
        &self,
        thread_id: String,
        mut rx: mpsc::Receiver<Message>,
    ) -> tokio::task::JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                let count = inner
                    .state
                    .write()
                    .await
                    .store
                    .merge_into(&thread_id, [message]);
                inner.events.publish(ChatEvent::MessagesUpdated {
                    thread_id: thread_id.clone(),
                    count,
                });
            }
            if let Some(inner) = inner.upgrade() {
                if let Some(session) = inner.state.write().await.sessions.get_mut(&thread_id) {
                    session.listening = false;
                }
                debug!(thread_id = %thread_id, "Live listener ended");
            }
        })
    }

    /// Send a message on a thread, joining it first if needed.
    pub async fn send_message(&self, thread_id: &str, body: &str) -> Result<Message, ChatError> {
        if body.trim().is_empty() {
            return Err(ChatError::SendFailed("message body is empty".into()));
        }
        self.ensure_joined(thread_id).await?;

        let channel_id = self
            .inner
            .state
            .read()
            .await
            .sessions
            .get(thread_id)
            .map(|s| s.channel_id.clone())
            .ok_or_else(|| ChatError::ChannelUnavailable {
                thread_id: thread_id.to_string(),
            })?;
        let client = self
            .current_client()
            .await
            .ok_or(ChatError::AuthRequired)?;

        let message = with_deadline(
            "send",
            self.inner.config.join_timeout,
            client.send(&channel_id, body),
        )
        .await?
        .map_err(|e| ChatError::SendFailed(e.to_string()))?;

        let count = self
            .inner
            .state
            .write()
            .await
            .store
            .merge_into(thread_id, [message.clone()]);
        self.inner.events.publish(ChatEvent::MessagesUpdated {
            thread_id: thread_id.to_string(),
            count,
        });
        Ok(message)
    }
}

//! Mutable per-session data guarded by the session's state lock.

use std::collections::HashMap;

use tokio::task::JoinHandle;

use crate::message_store::MessageStore;
use crate::thread::{Scope, Thread, ThreadOrigin};

/// Runtime state of one joined thread.
#[derive(Debug)]
pub(crate) struct ChannelSession {
    pub(crate) channel_id: String,
    /// The live listener is attached and its stream still open.
    pub(crate) listening: bool,
    pub(crate) listener: Option<JoinHandle<()>>,
}

impl ChannelSession {
    pub(crate) fn detach(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.listening = false;
    }
}

#[derive(Debug, Default)]
pub(crate) struct ChatState {
    pub(crate) threads: Vec<Thread>,
    /// Scope learned per thread from credentials and resolutions.
    pub(crate) scopes: HashMap<String, Scope>,
    pub(crate) sessions: HashMap<String, ChannelSession>,
    pub(crate) store: MessageStore,
    pub(crate) selected: Option<String>,
}

impl ChatState {
    pub(crate) fn thread(&self, thread_id: &str) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == thread_id)
    }

    pub(crate) fn knows(&self, thread_id: &str) -> bool {
        self.thread(thread_id).is_some()
    }

    /// Record a provisional thread unless one with the same id is known.
    /// Returns whether it was inserted.
    pub(crate) fn upsert_provisional(&mut self, thread: Thread) -> bool {
        if self.knows(&thread.id) {
            return false;
        }
        self.threads.push(thread);
        true
    }

    /// Merge `scope` into the cached scope of a thread.
    pub(crate) fn record_scope(&mut self, thread_id: &str, scope: &Scope) {
        self.scopes
            .entry(thread_id.to_string())
            .or_insert_with(|| scope.clone())
            .absorb(scope);
    }

    /// Replace the thread list with a fresh list-refresh result.
    ///
    /// Listed threads become confirmed (promoting provisional records) and
    /// keep a channel id learned earlier when the row lacks one. Provisional
    /// threads the list does not mention yet are kept after the listed ones.
    pub(crate) fn apply_thread_list(&mut self, listed: Vec<Thread>) {
        let mut previous: HashMap<String, Thread> = self
            .threads
            .drain(..)
            .map(|t| (t.id.clone(), t))
            .collect();

        for mut thread in listed {
            if let Some(old) = previous.remove(&thread.id) {
                if thread.channel_id.is_none() {
                    thread.channel_id = old.channel_id;
                }
            }
            thread.origin = ThreadOrigin::Confirmed;
            self.threads.push(thread);
        }

        let mut leftovers: Vec<Thread> = previous
            .into_values()
            .filter(|t| t.origin == ThreadOrigin::Provisional)
            .collect();
        leftovers.sort_by(|a, b| a.id.cmp(&b.id));
        self.threads.extend(leftovers);
    }

    /// Drop everything, aborting live listeners.
    pub(crate) fn reset(&mut self) {
        for session in self.sessions.values_mut() {
            session.detach();
        }
        *self = ChatState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed(id: &str, channel: Option<&str>) -> Thread {
        Thread {
            id: id.into(),
            channel_id: channel.map(Into::into),
            scope: Scope::default(),
            participant_role: None,
            last_activity_at: None,
            origin: ThreadOrigin::Confirmed,
        }
    }

    #[test]
    fn list_refresh_promotes_and_keeps_pending_provisionals() {
        let mut state = ChatState::default();
        state.upsert_provisional(Thread::provisional("T1", "C1", Scope::default()));
        state.upsert_provisional(Thread::provisional("T2", "C2", Scope::default()));
        state.threads.push(confirmed("OLD", Some("C0")));

        state.apply_thread_list(vec![confirmed("T1", None), confirmed("T3", Some("C3"))]);

        let ids: Vec<&str> = state.threads.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["T1", "T3", "T2"]);

        let t1 = state.thread("T1").unwrap();
        assert_eq!(t1.origin, ThreadOrigin::Confirmed);
        assert_eq!(t1.channel_id.as_deref(), Some("C1"));
        assert!(state.thread("T2").unwrap().is_provisional());
        assert!(!state.knows("OLD"));
    }

    #[test]
    fn upsert_provisional_never_overwrites() {
        let mut state = ChatState::default();
        state.threads.push(confirmed("T1", Some("C1")));
        assert!(!state.upsert_provisional(Thread::provisional("T1", "CX", Scope::default())));
        assert_eq!(state.thread("T1").unwrap().channel_id.as_deref(), Some("C1"));
    }

    #[test]
    fn record_scope_accumulates_fields() {
        let mut state = ChatState::default();
        state.record_scope(
            "T1",
            &Scope {
                quote_id: Some("Q1".into()),
                ..Scope::default()
            },
        );
        state.record_scope(
            "T1",
            &Scope {
                shipment_id: Some("S1".into()),
                ..Scope::default()
            },
        );
        let scope = &state.scopes["T1"];
        assert_eq!(scope.quote_id.as_deref(), Some("Q1"));
        assert_eq!(scope.shipment_id.as_deref(), Some("S1"));
    }
}

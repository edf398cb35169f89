//! Background credential maintenance.
//!
//! Connection events and the expiry watchdog never refresh by themselves;
//! they queue a [`RefreshTrigger`] for the single refresher task, which owns
//! the only call path from background work into `refresh_credential`.

use std::sync::atomic::Ordering;
use std::sync::Weak;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{ChatSession, Inner};
use crate::credential::{Credential, RefreshOptions};
use crate::events::ChatEvent;
use crate::provider::ClientEvent;

/// Shortest delay before a proactive refresh.
const MIN_WATCHDOG_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RefreshTrigger {
    /// The watchdog of credential `generation` fired.
    Expiring { generation: u64 },
    /// The client reported a credential or connection problem.
    Client(ClientEvent),
}

/// When the watchdog should fire: `refresh_buffer` before expiry, but never
/// sooner than [`MIN_WATCHDOG_DELAY`].
pub(crate) fn watchdog_delay(
    credential: &Credential,
    now: DateTime<Utc>,
    refresh_buffer: Duration,
) -> Duration {
    credential
        .remaining(now)
        .saturating_sub(refresh_buffer)
        .max(MIN_WATCHDOG_DELAY)
}

pub(crate) async fn expiry_watchdog(inner: Weak<Inner>, generation: u64, delay: Duration) {
    tokio::time::sleep(delay).await;
    let Some(inner) = inner.upgrade() else {
        return;
    };
    if inner.generation.load(Ordering::SeqCst) != generation {
        return;
    }
    debug!(generation, "Credential nearing expiry");
    let _ = inner.refresh_tx.send(RefreshTrigger::Expiring { generation });
}

/// Forward client events of the connection opened under `epoch`.
pub(crate) async fn pump_client_events(
    inner: Weak<Inner>,
    mut events: mpsc::Receiver<ClientEvent>,
    epoch: u64,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.current_epoch() != epoch {
            return;
        }
        debug!(event = ?event, "Client event");
        let _ = inner.refresh_tx.send(RefreshTrigger::Client(event));
    }
}

pub(crate) async fn run_refresher(
    inner: Weak<Inner>,
    mut triggers: mpsc::UnboundedReceiver<RefreshTrigger>,
) {
    while let Some(mut trigger) = triggers.recv().await {
        // Collapse a burst of triggers into one refresh; client events win.
        while let Ok(next) = triggers.try_recv() {
            if !matches!(trigger, RefreshTrigger::Client(_)) {
                trigger = next;
            }
        }
        let Some(inner) = inner.upgrade() else {
            return;
        };
        ChatSession { inner }.background_refresh(trigger).await;
    }
}

impl ChatSession {
    async fn background_refresh(&self, trigger: RefreshTrigger) {
        let inner = &self.inner;
        if let RefreshTrigger::Expiring { generation } = trigger {
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
        }
        if inner.auth.read().await.is_none() {
            return;
        }
        let Some(current) = inner.credential.read().await.clone() else {
            return;
        };

        info!(thread_id = %current.thread_id, trigger = ?trigger, "Background credential refresh");
        let options = RefreshOptions::for_thread(current.thread_id).forced();
        if let Err(e) = self.refresh_credential(options).await {
            warn!(error = %e, "Background credential refresh failed");
            inner.events.publish(ChatEvent::BackgroundRefreshFailed {
                reason: e.to_string(),
            });
        }
    }
}

//! Per-recipient fan-out: open many threads, broadcast one message.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ChatSession;
use crate::error::ChatError;
use crate::scope::QuoteContext;

/// One counterparty of a bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Caller-chosen key for the result maps.
    pub key: Option<String>,
    pub shipment_id: Option<String>,
    pub shipper_branch_org_id: Option<String>,
    pub gallery_branch_org_id: Option<String>,
}

impl Recipient {
    pub fn shipper(org_id: impl Into<String>) -> Self {
        Self {
            shipper_branch_org_id: Some(org_id.into()),
            ..Self::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_shipment(mut self, shipment_id: impl Into<String>) -> Self {
        self.shipment_id = Some(shipment_id.into());
        self
    }

    fn context(&self, quote_id: &str) -> QuoteContext {
        QuoteContext {
            quote_id: quote_id.to_string(),
            shipment_id: self.shipment_id.clone(),
            shipper_branch_org_id: self.shipper_branch_org_id.clone(),
            gallery_branch_org_id: self.gallery_branch_org_id.clone(),
        }
    }
}

/// Result-map key of the recipient at `index`: its explicit key, else the
/// shipper branch, gallery branch or shipment id, else `recipient-<n>`
/// counting from 1.
pub fn recipient_key(recipient: &Recipient, index: usize) -> String {
    recipient
        .key
        .as_ref()
        .or(recipient.shipper_branch_org_id.as_ref())
        .or(recipient.gallery_branch_org_id.as_ref())
        .or(recipient.shipment_id.as_ref())
        .cloned()
        .unwrap_or_else(|| format!("recipient-{}", index + 1))
}

/// Outcome of [`ChatSession::open_threads_for_recipients`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkOpenOutcome {
    /// Recipient key to thread id.
    pub threads: BTreeMap<String, String>,
    /// Recipient key to error message.
    pub errors: BTreeMap<String, String>,
}

/// Outcome of [`ChatSession::broadcast`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastOutcome {
    /// Recipient key to the id of the sent message.
    pub sent: BTreeMap<String, String>,
    /// Recipient key to error message.
    pub errors: BTreeMap<String, String>,
}

impl ChatSession {
    /// Open one thread per recipient of a quote.
    ///
    /// Recipients are handled one after another since they share the
    /// session's single credential. A failing recipient is recorded and the
    /// batch goes on. When any thread was created the list is refreshed once
    /// at the end.
    pub async fn open_threads_for_recipients(
        &self,
        quote_id: &str,
        recipients: &[Recipient],
    ) -> BulkOpenOutcome {
        let mut outcome = BulkOpenOutcome::default();
        let mut created_any = false;

        for (index, recipient) in recipients.iter().enumerate() {
            let key = recipient_key(recipient, index);
            match self.open_scoped(&recipient.context(quote_id), None, false).await {
                Ok(resolution) => {
                    created_any |= resolution.created;
                    outcome.threads.insert(key, resolution.thread_id);
                }
                Err(e) => {
                    warn!(recipient = %key, error = %e, "Opening recipient thread failed");
                    outcome.errors.insert(key, e.to_string());
                }
            }
        }

        if created_any {
            if let Err(e) = self.refresh_threads().await {
                warn!(error = %e, "List refresh after bulk open failed");
            }
        }
        info!(
            quote_id = %quote_id,
            opened = outcome.threads.len(),
            failed = outcome.errors.len(),
            "Bulk open finished"
        );
        outcome
    }

    /// Send `body` to every thread of a recipient-key map.
    pub async fn broadcast(&self, threads: &BTreeMap<String, String>, body: &str) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        for (key, thread_id) in threads {
            match self.send_message(thread_id, body).await {
                Ok(message) => {
                    outcome.sent.insert(key.clone(), message.id);
                }
                Err(e) => {
                    let e = match e {
                        ChatError::SendFailed(_) => e,
                        other => ChatError::SendFailed(other.to_string()),
                    };
                    warn!(recipient = %key, thread_id = %thread_id, error = %e, "Broadcast send failed");
                    outcome.errors.insert(key.clone(), e.to_string());
                }
            }
        }
        outcome
    }

    /// Open every recipient's thread, then broadcast to those that opened.
    /// Errors of both stages share one map.
    pub async fn broadcast_to_recipients(
        &self,
        quote_id: &str,
        recipients: &[Recipient],
        body: &str,
    ) -> BroadcastOutcome {
        let opened = self.open_threads_for_recipients(quote_id, recipients).await;
        let mut outcome = self.broadcast(&opened.threads, body).await;
        outcome.errors.extend(opened.errors);
        outcome
    }
}

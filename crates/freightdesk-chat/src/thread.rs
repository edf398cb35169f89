//! Business conversation records and their addressing scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of conversation a thread carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// Requester branch talking to a responding counterparty about a quote.
    #[default]
    Counterparty,
    /// Shipper-to-shipper conversation.
    Peer,
}

impl ConversationKind {
    /// Interpret the backend's free-form `conversationType` value.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.to_ascii_lowercase().contains("peer") => ConversationKind::Peer,
            _ => ConversationKind::Counterparty,
        }
    }
}

/// Addressing context of a thread.
///
/// Party A is the shipper branch organisation, party B the gallery branch
/// organisation. Peer conversations list the peer shippers and the branch
/// that started the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub quote_id: Option<String>,
    pub shipment_id: Option<String>,
    pub shipper_branch_org_id: Option<String>,
    pub gallery_branch_org_id: Option<String>,
    pub kind: ConversationKind,
    #[serde(default)]
    pub peer_shipper_org_ids: Vec<String>,
    pub initiator_branch_org_id: Option<String>,
}

impl Scope {
    /// Overlay every field set in `other` onto `self`.
    pub fn absorb(&mut self, other: &Scope) {
        fn take(slot: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        take(&mut self.quote_id, &other.quote_id);
        take(&mut self.shipment_id, &other.shipment_id);
        take(&mut self.shipper_branch_org_id, &other.shipper_branch_org_id);
        take(&mut self.gallery_branch_org_id, &other.gallery_branch_org_id);
        take(
            &mut self.initiator_branch_org_id,
            &other.initiator_branch_org_id,
        );
        if !other.peer_shipper_org_ids.is_empty() {
            self.peer_shipper_org_ids.clone_from(&other.peer_shipper_org_ids);
        }
        if other.kind == ConversationKind::Peer {
            self.kind = ConversationKind::Peer;
        }
    }
}

/// Where a local thread record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadOrigin {
    /// Materialised from the record store's thread list.
    Confirmed,
    /// Synthesised from a credential before the thread list caught up.
    Provisional,
}

/// A business-level conversation known to this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    /// Provider channel backing the thread, when known.
    pub channel_id: Option<String>,
    pub scope: Scope,
    /// The signed-in user's role in the conversation, as reported by the
    /// record store.
    pub participant_role: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub origin: ThreadOrigin,
}

impl Thread {
    /// Build a provisional record from what a credential tells us.
    pub fn provisional(id: impl Into<String>, channel_id: impl Into<String>, scope: Scope) -> Self {
        Self {
            id: id.into(),
            channel_id: Some(channel_id.into()),
            scope,
            participant_role: None,
            last_activity_at: None,
            origin: ThreadOrigin::Provisional,
        }
    }

    pub fn quote_id(&self) -> Option<&str> {
        self.scope.quote_id.as_deref()
    }

    pub fn is_provisional(&self) -> bool {
        self.origin == ThreadOrigin::Provisional
    }
}

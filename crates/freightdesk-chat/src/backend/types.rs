//! Request and response bodies for the chat backend endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::thread::{ConversationKind, Scope, Thread, ThreadOrigin};

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// Body of `POST /chat/token`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipper_branch_org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gallery_branch_org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_shipper_org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator_branch_org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_gallery: Option<bool>,
}

/// Successful `POST /chat/token` response.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub thread_id: String,
    #[serde(default)]
    pub conversation_sid: String,
    #[serde(default)]
    pub quote_id: Option<String>,
    #[serde(default)]
    pub shipment_id: Option<String>,
    #[serde(default)]
    pub shipper_branch_org_id: Option<String>,
    #[serde(default)]
    pub gallery_branch_org_id: Option<String>,
    #[serde(default)]
    pub conversation_type: Option<String>,
    #[serde(default)]
    pub peer_shipper_org_ids: Vec<String>,
    #[serde(default)]
    pub initiator_shipper_org_id: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("thread_id", &self.thread_id)
            .field("conversation_sid", &self.conversation_sid)
            .field("quote_id", &self.quote_id)
            .field("conversation_type", &self.conversation_type)
            .finish_non_exhaustive()
    }
}

impl TokenResponse {
    /// Scope as reported by the backend. Returns `None` when the response
    /// carries no scope fields at all.
    pub fn reported_scope(&self) -> Option<Scope> {
        let scope = Scope {
            quote_id: self.quote_id.clone(),
            shipment_id: self.shipment_id.clone(),
            shipper_branch_org_id: self.shipper_branch_org_id.clone(),
            gallery_branch_org_id: self.gallery_branch_org_id.clone(),
            kind: ConversationKind::from_wire(self.conversation_type.as_deref()),
            peer_shipper_org_ids: self.peer_shipper_org_ids.clone(),
            initiator_branch_org_id: self.initiator_shipper_org_id.clone(),
        };
        (scope != Scope::default()).then_some(scope)
    }
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

/// Body of `POST /chat/provision`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_ids: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Thread list
// ---------------------------------------------------------------------------

/// One row of `GET /chat/threads`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRow {
    pub id: String,
    #[serde(default)]
    pub conversation_sid: Option<String>,
    #[serde(default)]
    pub quote_id: Option<String>,
    #[serde(default)]
    pub shipment_id: Option<String>,
    #[serde(default)]
    pub shipper_branch_org_id: Option<String>,
    #[serde(default)]
    pub gallery_branch_org_id: Option<String>,
    #[serde(default)]
    pub conversation_type: Option<String>,
    #[serde(default)]
    pub peer_shipper_org_ids: Vec<String>,
    #[serde(default)]
    pub initiator_shipper_org_id: Option<String>,
    #[serde(default)]
    pub participant_role: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ThreadRow {
    pub fn into_thread(self) -> Thread {
        Thread {
            scope: Scope {
                quote_id: self.quote_id,
                shipment_id: self.shipment_id,
                shipper_branch_org_id: self.shipper_branch_org_id,
                gallery_branch_org_id: self.gallery_branch_org_id,
                kind: ConversationKind::from_wire(self.conversation_type.as_deref()),
                peer_shipper_org_ids: self.peer_shipper_org_ids,
                initiator_branch_org_id: self.initiator_shipper_org_id,
            },
            id: self.id,
            channel_id: self.conversation_sid.filter(|sid| !sid.is_empty()),
            participant_role: self.participant_role,
            last_activity_at: self.last_message_at,
            origin: ThreadOrigin::Confirmed,
        }
    }
}

/// `GET /chat/threads` envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ThreadList {
    #[serde(default)]
    pub threads: Vec<ThreadRow>,
}

/// `{ "error": "..." }` body returned on failure.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}

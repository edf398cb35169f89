//! Chat credentials and the policy deciding when one can be reused.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::auth::AuthSession;
use crate::backend::{TokenRequest, TokenResponse};
use crate::error::ChatError;
use crate::thread::{ConversationKind, Scope};

/// A short-lived provider credential bound to one thread.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub thread_id: String,
    pub channel_id: String,
    pub scope: Scope,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("thread_id", &self.thread_id)
            .field("channel_id", &self.channel_id)
            .field("scope", &self.scope)
            .finish()
    }
}

impl Credential {
    /// Lifetime left at `now`; zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// What a credential refresh should target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOptions {
    pub thread_id: Option<String>,
    pub quote_id: Option<String>,
    pub shipment_id: Option<String>,
    pub shipper_branch_org_id: Option<String>,
    pub gallery_branch_org_id: Option<String>,
    pub peer_shipper_org_id: Option<String>,
    pub initiator_branch_org_id: Option<String>,
    pub include_gallery: Option<bool>,
    /// Skip the cache and always ask the backend.
    pub force: bool,
}

impl RefreshOptions {
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    /// Target a quote conversation, carrying every field of `scope`.
    pub fn for_quote(scope: &Scope) -> Self {
        Self {
            quote_id: scope.quote_id.clone(),
            shipment_id: scope.shipment_id.clone(),
            shipper_branch_org_id: scope.shipper_branch_org_id.clone(),
            gallery_branch_org_id: scope.gallery_branch_org_id.clone(),
            ..Self::default()
        }
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Whether `cached` satisfies `options` without a network round trip.
///
/// Peer requests always go to the backend: the cached scope cannot tell
/// which peer pair a credential was issued for.
pub fn can_reuse(
    cached: &Credential,
    options: &RefreshOptions,
    now: DateTime<Utc>,
    buffer: Duration,
) -> bool {
    if options.force || options.peer_shipper_org_id.is_some() {
        return false;
    }
    if cached.remaining(now) <= buffer {
        return false;
    }
    if let Some(thread_id) = &options.thread_id {
        if *thread_id != cached.thread_id {
            return false;
        }
    }
    let scope = &cached.scope;
    agrees(&options.quote_id, &scope.quote_id)
        && agrees(&options.shipment_id, &scope.shipment_id)
        && agrees(&options.shipper_branch_org_id, &scope.shipper_branch_org_id)
        && agrees(&options.gallery_branch_org_id, &scope.gallery_branch_org_id)
}

fn agrees(wanted: &Option<String>, cached: &Option<String>) -> bool {
    wanted.is_none() || wanted == cached
}

fn pick(explicit: &Option<String>, cached: Option<&String>) -> Option<String> {
    explicit.clone().or_else(|| cached.cloned())
}

/// Assemble the token request.
///
/// Each field takes the explicit option first, then the cached scope of the
/// requested thread. The initiating branch of a peer conversation finally
/// falls back to the caller's own organisation.
pub fn build_token_request(
    options: &RefreshOptions,
    cached_scope: Option<&Scope>,
    auth: &AuthSession,
) -> Result<TokenRequest, ChatError> {
    let peer_shipper_org_id = options.peer_shipper_org_id.clone();
    let mut initiator_branch_org_id = pick(
        &options.initiator_branch_org_id,
        cached_scope.and_then(|s| s.initiator_branch_org_id.as_ref()),
    );
    if peer_shipper_org_id.is_some() && initiator_branch_org_id.is_none() {
        initiator_branch_org_id = auth.organization_id.clone();
    }

    let request = TokenRequest {
        thread_id: options.thread_id.clone(),
        quote_id: pick(
            &options.quote_id,
            cached_scope.and_then(|s| s.quote_id.as_ref()),
        ),
        organization_id: auth.organization_id.clone(),
        shipper_branch_org_id: pick(
            &options.shipper_branch_org_id,
            cached_scope.and_then(|s| s.shipper_branch_org_id.as_ref()),
        ),
        gallery_branch_org_id: pick(
            &options.gallery_branch_org_id,
            cached_scope.and_then(|s| s.gallery_branch_org_id.as_ref()),
        ),
        shipment_id: pick(
            &options.shipment_id,
            cached_scope.and_then(|s| s.shipment_id.as_ref()),
        ),
        peer_shipper_org_id,
        initiator_branch_org_id,
        include_gallery: options.include_gallery,
    };

    if request.thread_id.is_none()
        && request.quote_id.is_none()
        && request.peer_shipper_org_id.is_none()
    {
        return Err(ChatError::ScopeIncomplete(
            "need a thread, a quote or a peer shipper".into(),
        ));
    }
    Ok(request)
}

/// Turn a token response into a credential. The scope is what the backend
/// reported, completed with what was requested.
pub fn credential_from_response(
    response: TokenResponse,
    request: &TokenRequest,
) -> Result<Credential, ChatError> {
    if response.conversation_sid.trim().is_empty() {
        return Err(ChatError::ChannelUnavailable {
            thread_id: response.thread_id,
        });
    }

    let mut scope = Scope {
        quote_id: request.quote_id.clone(),
        shipment_id: request.shipment_id.clone(),
        shipper_branch_org_id: request.shipper_branch_org_id.clone(),
        gallery_branch_org_id: request.gallery_branch_org_id.clone(),
        kind: if request.peer_shipper_org_id.is_some() {
            ConversationKind::Peer
        } else {
            ConversationKind::Counterparty
        },
        peer_shipper_org_ids: request.peer_shipper_org_id.iter().cloned().collect(),
        initiator_branch_org_id: request.initiator_branch_org_id.clone(),
    };
    if let Some(reported) = response.reported_scope() {
        scope.absorb(&reported);
    }

    Ok(Credential {
        token: response.token,
        expires_at: response.expires_at,
        thread_id: response.thread_id,
        channel_id: response.conversation_sid,
        scope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached(thread: &str, expires_in: i64, now: DateTime<Utc>) -> Credential {
        Credential {
            token: "tok".into(),
            expires_at: now + chrono::Duration::seconds(expires_in),
            thread_id: thread.into(),
            channel_id: "C1".into(),
            scope: Scope {
                quote_id: Some("Q1".into()),
                shipper_branch_org_id: Some("S1".into()),
                ..Scope::default()
            },
        }
    }

    fn auth() -> AuthSession {
        AuthSession::new("jwt", "user-1").with_organization("ORG")
    }

    #[test]
    fn reuse_with_five_minutes_left() {
        let now = Utc::now();
        let cred = cached("T1", 300, now);
        let opts = RefreshOptions::for_thread("T1");
        assert!(can_reuse(&cred, &opts, now, Duration::from_secs(60)));
    }

    #[test]
    fn no_reuse_inside_buffer() {
        let now = Utc::now();
        let cred = cached("T1", 30, now);
        let opts = RefreshOptions::for_thread("T1");
        assert!(!can_reuse(&cred, &opts, now, Duration::from_secs(60)));
    }

    #[test]
    fn no_reuse_when_forced_or_thread_differs() {
        let now = Utc::now();
        let cred = cached("T1", 300, now);
        let buffer = Duration::from_secs(60);
        assert!(!can_reuse(&cred, &RefreshOptions::for_thread("T1").forced(), now, buffer));
        assert!(!can_reuse(&cred, &RefreshOptions::for_thread("T2"), now, buffer));
    }

    #[test]
    fn no_reuse_on_scope_mismatch() {
        let now = Utc::now();
        let cred = cached("T1", 300, now);
        let buffer = Duration::from_secs(60);

        let mut matching = RefreshOptions::for_thread("T1");
        matching.shipper_branch_org_id = Some("S1".into());
        assert!(can_reuse(&cred, &matching, now, buffer));

        let mut mismatched = RefreshOptions::for_thread("T1");
        mismatched.shipper_branch_org_id = Some("S2".into());
        assert!(!can_reuse(&cred, &mismatched, now, buffer));

        let mut unknown_field = RefreshOptions::for_thread("T1");
        unknown_field.shipment_id = Some("SH1".into());
        assert!(!can_reuse(&cred, &unknown_field, now, buffer));
    }

    #[test]
    fn peer_requests_never_reuse() {
        let now = Utc::now();
        let cred = cached("T1", 3600, now);
        let opts = RefreshOptions {
            peer_shipper_org_id: Some("P1".into()),
            ..RefreshOptions::default()
        };
        assert!(!can_reuse(&cred, &opts, now, Duration::from_secs(60)));
    }

    #[test]
    fn request_prefers_explicit_then_cached_fields() {
        let cached_scope = Scope {
            quote_id: Some("Q1".into()),
            shipment_id: Some("SH-cached".into()),
            shipper_branch_org_id: Some("S-cached".into()),
            ..Scope::default()
        };
        let mut opts = RefreshOptions::for_thread("T1");
        opts.shipper_branch_org_id = Some("S-explicit".into());

        let req = build_token_request(&opts, Some(&cached_scope), &auth()).unwrap();
        assert_eq!(req.thread_id.as_deref(), Some("T1"));
        assert_eq!(req.quote_id.as_deref(), Some("Q1"));
        assert_eq!(req.shipment_id.as_deref(), Some("SH-cached"));
        assert_eq!(req.shipper_branch_org_id.as_deref(), Some("S-explicit"));
        assert_eq!(req.organization_id.as_deref(), Some("ORG"));
        assert_eq!(req.initiator_branch_org_id, None);
    }

    #[test]
    fn peer_request_falls_back_to_own_org_as_initiator() {
        let opts = RefreshOptions {
            peer_shipper_org_id: Some("P1".into()),
            ..RefreshOptions::default()
        };
        let req = build_token_request(&opts, None, &auth()).unwrap();
        assert_eq!(req.initiator_branch_org_id.as_deref(), Some("ORG"));
    }

    #[test]
    fn request_without_target_is_incomplete() {
        let err = build_token_request(&RefreshOptions::default(), None, &auth()).unwrap_err();
        assert!(matches!(err, ChatError::ScopeIncomplete(_)));
    }

    #[test]
    fn response_without_channel_is_unavailable() {
        let response = TokenResponse {
            token: "tok".into(),
            expires_at: Utc::now(),
            thread_id: "T1".into(),
            conversation_sid: String::new(),
            quote_id: None,
            shipment_id: None,
            shipper_branch_org_id: None,
            gallery_branch_org_id: None,
            conversation_type: None,
            peer_shipper_org_ids: Vec::new(),
            initiator_shipper_org_id: None,
        };
        let err = credential_from_response(response, &TokenRequest::default()).unwrap_err();
        assert!(matches!(err, ChatError::ChannelUnavailable { thread_id } if thread_id == "T1"));
    }

    #[test]
    fn response_scope_completed_from_request() {
        let response = TokenResponse {
            token: "secret-tok".into(),
            expires_at: Utc::now(),
            thread_id: "T1".into(),
            conversation_sid: "C1".into(),
            quote_id: Some("Q1".into()),
            shipment_id: None,
            shipper_branch_org_id: None,
            gallery_branch_org_id: Some("G1".into()),
            conversation_type: None,
            peer_shipper_org_ids: Vec::new(),
            initiator_shipper_org_id: None,
        };
        let request = TokenRequest {
            quote_id: Some("Q1".into()),
            shipper_branch_org_id: Some("S1".into()),
            ..TokenRequest::default()
        };
        let cred = credential_from_response(response, &request).unwrap();
        assert_eq!(cred.channel_id, "C1");
        assert_eq!(cred.scope.shipper_branch_org_id.as_deref(), Some("S1"));
        assert_eq!(cred.scope.gallery_branch_org_id.as_deref(), Some("G1"));
        assert!(!format!("{cred:?}").contains("secret-tok"));
    }
}

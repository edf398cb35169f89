//! Scope resolution and the single-thread open/select operations.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ChatSession;
use crate::credential::{Credential, RefreshOptions};
use crate::error::ChatError;
use crate::scope::{match_by_wildcard_scope, QuoteContext, Resolution, ResolveOptions};
use crate::thread::{Scope, Thread};

/// Addressing of a shipper-to-shipper conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerThreadOptions {
    pub peer_shipper_org_id: String,
    pub quote_id: Option<String>,
    pub shipment_id: Option<String>,
    /// Defaults to the signed-in user's organisation.
    pub initiator_branch_org_id: Option<String>,
    pub include_gallery: Option<bool>,
}

impl PeerThreadOptions {
    pub fn new(peer_shipper_org_id: impl Into<String>) -> Self {
        Self {
            peer_shipper_org_id: peer_shipper_org_id.into(),
            ..Self::default()
        }
    }
}

impl ChatSession {
    /// Find the thread serving `context`, asking the backend for one when no
    /// known thread matches or `options.force` is set.
    pub async fn resolve(
        &self,
        context: &QuoteContext,
        options: ResolveOptions,
    ) -> Result<Resolution, ChatError> {
        self.require_auth().await?;
        let scope = context.to_scope();

        let candidate = {
            let state = self.inner.state.read().await;
            match_by_wildcard_scope(
                &state.threads,
                &state.scopes,
                context,
                options.existing_thread_id.as_deref(),
            )
            .map(|t| t.id.clone())
        };

        if let (Some(thread_id), false) = (&candidate, options.force) {
            debug!(thread_id = %thread_id, quote_id = %context.quote_id, "Resolved to known thread");
            self.inner
                .state
                .write()
                .await
                .record_scope(thread_id, &scope);
            return Ok(Resolution {
                thread_id: thread_id.clone(),
                created: false,
            });
        }

        let credential = self
            .refresh_credential(RefreshOptions::for_quote(&scope).forced())
            .await?;
        let known = self.adopt_credential_thread(&credential, &scope).await;
        let created = !known && candidate.as_deref() != Some(credential.thread_id.as_str());
        info!(
            thread_id = %credential.thread_id,
            quote_id = %context.quote_id,
            created,
            "Resolved thread through backend"
        );
        Ok(Resolution {
            thread_id: credential.thread_id,
            created,
        })
    }

    /// Make sure the credential's thread is known locally and remember the
    /// scope it was requested for. Returns whether it was already known.
    async fn adopt_credential_thread(&self, credential: &Credential, scope: &Scope) -> bool {
        let mut state = self.inner.state.write().await;
        let inserted = state.upsert_provisional(Thread::provisional(
            credential.thread_id.clone(),
            credential.channel_id.clone(),
            credential.scope.clone(),
        ));
        state.record_scope(&credential.thread_id, scope);
        !inserted
    }

    /// Resolve, obtain a credential for the thread and join it.
    pub(crate) async fn open_scoped(
        &self,
        context: &QuoteContext,
        existing_thread_id: Option<String>,
        refresh_list_on_create: bool,
    ) -> Result<Resolution, ChatError> {
        let resolution = self
            .resolve(
                context,
                ResolveOptions {
                    existing_thread_id,
                    force: false,
                },
            )
            .await?;
        self.refresh_credential(
            RefreshOptions::for_quote(&context.to_scope()).with_thread(&resolution.thread_id),
        )
        .await?;
        if resolution.created && refresh_list_on_create {
            if let Err(e) = self.refresh_threads().await {
                warn!(error = %e, "List refresh after thread creation failed");
            }
        }
        self.ensure_joined(&resolution.thread_id).await?;
        Ok(resolution)
    }

    /// Open the conversation for a quote context and select it.
    pub async fn open_thread_for_quote(&self, context: &QuoteContext) -> Result<Thread, ChatError> {
        let resolution = self.open_scoped(context, None, true).await?;
        self.finish_open(&resolution.thread_id).await
    }

    /// Open a shipper-to-shipper conversation and select it.
    pub async fn open_peer_thread(&self, options: &PeerThreadOptions) -> Result<Thread, ChatError> {
        self.require_auth().await?;
        let refresh = RefreshOptions {
            quote_id: options.quote_id.clone(),
            shipment_id: options.shipment_id.clone(),
            peer_shipper_org_id: Some(options.peer_shipper_org_id.clone()),
            initiator_branch_org_id: options.initiator_branch_org_id.clone(),
            include_gallery: options.include_gallery,
            force: true,
            ..RefreshOptions::default()
        };
        let credential = self.refresh_credential(refresh).await?;
        let scope = credential.scope.clone();
        self.adopt_credential_thread(&credential, &scope).await;
        self.ensure_joined(&credential.thread_id).await?;
        self.finish_open(&credential.thread_id).await
    }

    /// Make a thread current: credential for it, joined, then selected.
    /// Selection is unchanged when any step fails.
    pub async fn select_thread(&self, thread_id: &str) -> Result<(), ChatError> {
        self.refresh_credential(RefreshOptions::for_thread(thread_id))
            .await?;
        self.ensure_joined(thread_id).await?;
        self.inner.state.write().await.selected = Some(thread_id.to_string());
        Ok(())
    }

    async fn finish_open(&self, thread_id: &str) -> Result<Thread, ChatError> {
        let mut state = self.inner.state.write().await;
        let thread = state
            .thread(thread_id)
            .cloned()
            .ok_or_else(|| ChatError::ChannelUnavailable {
                thread_id: thread_id.to_string(),
            })?;
        state.selected = Some(thread_id.to_string());
        Ok(thread)
    }
}

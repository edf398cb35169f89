//! Credential lifecycle: reuse, issue, provision, install.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::background;
use super::ChatSession;
use crate::auth::AuthSession;
use crate::backend::{ProvisionRequest, TokenRequest, TokenResponse};
use crate::credential::{
    build_token_request, can_reuse, credential_from_response, Credential, RefreshOptions,
};
use crate::error::{with_deadline, ChatError};
use crate::events::ChatEvent;

impl ChatSession {
    /// Return a credential satisfying `options`, reusing the current one
    /// when it still fits and otherwise asking the backend.
    ///
    /// The first credential of a session connects the shared client; later
    /// ones update its token in place. A new credential becomes current only
    /// after the client accepted it.
    pub async fn refresh_credential(&self, options: RefreshOptions) -> Result<Credential, ChatError> {
        let inner = &self.inner;
        let auth = self.require_auth().await?;
        let epoch = inner.current_epoch();
        let _refresh = inner.refresh_lock.lock().await;

        if let Some(cached) = inner.credential.read().await.as_ref() {
            if can_reuse(cached, &options, Utc::now(), inner.config.refresh_buffer) {
                debug!(thread_id = %cached.thread_id, "Reusing chat credential");
                return Ok(cached.clone());
            }
        }

        let cached_scope = match &options.thread_id {
            Some(thread_id) => inner.state.read().await.scopes.get(thread_id).cloned(),
            None => None,
        };
        let request = build_token_request(&options, cached_scope.as_ref(), &auth)?;
        let response = self.issue_token(&auth, &request).await?;
        let credential = credential_from_response(response, &request)?;
        inner.check_epoch(epoch)?;

        self.attach_client(&credential, epoch).await?;
        self.install(&credential, epoch).await?;
        Ok(credential)
    }

    /// Issue a token, provisioning and retrying once on a membership error.
    async fn issue_token(
        &self,
        auth: &AuthSession,
        request: &TokenRequest,
    ) -> Result<TokenResponse, ChatError> {
        let timeout = self.inner.config.request_timeout;
        let backend = &self.inner.backend;

        let first = with_deadline(
            "token request",
            timeout,
            backend.issue_token(&auth.access_token, request),
        )
        .await?;
        let err = match first {
            Ok(response) => return Ok(response),
            Err(err) if err.is_membership_error() => err,
            Err(err) => return Err(err.into()),
        };

        warn!(error = %err, "Chat token refused for membership, provisioning");
        if !self.provision(auth).await {
            return Err(err.into());
        }
        with_deadline(
            "token request",
            timeout,
            backend.issue_token(&auth.access_token, request),
        )
        .await?
        .map_err(ChatError::from)
    }

    /// Run provisioning. Returns false when provisioning is unavailable for
    /// this session, in which case a retry is pointless.
    async fn provision(&self, auth: &AuthSession) -> bool {
        let inner = &self.inner;
        if inner.provisioning_disabled.load(Ordering::SeqCst) {
            debug!("Provisioning disabled for this session");
            return false;
        }
        let request = ProvisionRequest {
            organization_ids: auth.organization_id.clone().map(|org| vec![org]),
        };
        let outcome = with_deadline(
            "provisioning",
            inner.config.request_timeout,
            inner.backend.provision(&auth.access_token, &request),
        )
        .await;
        match outcome {
            Ok(Ok(())) => true,
            Ok(Err(e)) if e.is_not_found() => {
                warn!("Provisioning endpoint missing, disabling it for this session");
                inner.provisioning_disabled.store(true, Ordering::SeqCst);
                false
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Provisioning failed, retrying token anyway");
                true
            }
            Err(e) => {
                warn!(error = %e, "Provisioning timed out, retrying token anyway");
                true
            }
        }
    }

    /// Connect the shared client with the first credential, or hand a new
    /// token to the live one.
    async fn attach_client(&self, credential: &Credential, epoch: u64) -> Result<(), ChatError> {
        let inner = &self.inner;
        let timeout = inner.config.join_timeout;

        if let Some(client) = self.current_client().await {
            with_deadline("token update", timeout, client.update_token(&credential.token)).await??;
            debug!(thread_id = %credential.thread_id, "Updated client token in place");
            return Ok(());
        }

        let connection = with_deadline(
            "provider connect",
            timeout,
            inner.provider.connect(&credential.token),
        )
        .await??;

        // Refreshes are serialised, so nothing else can have connected here.
        let mut slot = inner.client.write().await;
        inner.check_epoch(epoch)?;
        *slot = Some(connection.client);
        drop(slot);

        tokio::spawn(background::pump_client_events(
            Arc::downgrade(&self.inner),
            connection.events,
            epoch,
        ));
        info!(thread_id = %credential.thread_id, "Chat client connected");
        Ok(())
    }

    /// Make `credential` current and schedule its expiry watchdog.
    async fn install(&self, credential: &Credential, epoch: u64) -> Result<(), ChatError> {
        let inner = &self.inner;
        {
            let mut current = inner.credential.write().await;
            inner.check_epoch(epoch)?;
            *current = Some(credential.clone());
        }
        inner
            .state
            .write()
            .await
            .record_scope(&credential.thread_id, &credential.scope);

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let watchdog = inner.config.proactive_refresh.then(|| {
            let delay = background::watchdog_delay(credential, Utc::now(), inner.config.refresh_buffer);
            tokio::spawn(background::expiry_watchdog(
                Arc::downgrade(&self.inner),
                generation,
                delay,
            ))
        });
        let superseded = std::mem::replace(&mut *inner.watchdog.lock().await, watchdog);
        if let Some(superseded) = superseded {
            superseded.abort();
        }

        info!(
            thread_id = %credential.thread_id,
            channel_id = %credential.channel_id,
            expires_at = %credential.expires_at,
            "Chat credential installed"
        );
        inner.events.publish(ChatEvent::CredentialInstalled {
            thread_id: credential.thread_id.clone(),
        });
        Ok(())
    }
}

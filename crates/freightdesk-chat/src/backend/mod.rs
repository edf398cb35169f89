//! Chat backend: credential issuing, provisioning and the thread list.
//!
//! [`ChatBackend`] is the seam the session talks through; [`HttpChatBackend`]
//! is the production implementation over the backend's HTTP functions.

mod http;
mod types;

use async_trait::async_trait;

pub use http::HttpChatBackend;
pub use types::{ProvisionRequest, ThreadRow, TokenRequest, TokenResponse};

/// Errors returned by a [`ChatBackend`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("endpoint not found: {0}")]
    NotFound(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl BackendError {
    /// The caller is not yet a participant of the requested conversation.
    pub fn is_membership_error(&self) -> bool {
        match self {
            BackendError::Rejected { message, .. } => {
                message.to_ascii_lowercase().contains("not a member")
            }
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BackendError::NotFound(_) | BackendError::Rejected { status: 404, .. }
        )
    }
}

/// Server-side collaborator of the session.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Issue a chat credential bound to a conversation.
    async fn issue_token(
        &self,
        bearer: &str,
        request: &TokenRequest,
    ) -> Result<TokenResponse, BackendError>;

    /// Make sure the caller's organisations have provider identities.
    async fn provision(&self, bearer: &str, request: &ProvisionRequest)
        -> Result<(), BackendError>;

    /// Threads visible to the caller.
    async fn list_threads(&self, bearer: &str) -> Result<Vec<ThreadRow>, BackendError>;
}

use std::future::Future;
use std::time::Duration;

use crate::backend::BackendError;
use crate::provider::ProviderError;

/// Errors surfaced by [`ChatSession`](crate::ChatSession) operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChatError {
    #[error("authentication required")]
    AuthRequired,

    #[error("scope incomplete: {0}")]
    ScopeIncomplete(String),

    #[error("provider rejected request: {0}")]
    ProviderRejected(String),

    #[error("no channel available for thread {thread_id}")]
    ChannelUnavailable { thread_id: String },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl From<BackendError> for ChatError {
    fn from(err: BackendError) -> Self {
        ChatError::ProviderRejected(err.to_string())
    }
}

impl From<ProviderError> for ChatError {
    fn from(err: ProviderError) -> Self {
        ChatError::ProviderRejected(err.to_string())
    }
}

/// Run `fut` under a deadline. The inner result is handed back untouched so
/// callers can still inspect adapter-specific errors.
pub(crate) async fn with_deadline<F, T>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, ChatError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| ChatError::Timeout { operation, after })
}

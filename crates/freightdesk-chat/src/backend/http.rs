//! reqwest implementation of [`ChatBackend`].

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{ErrorBody, ThreadList};
use super::{BackendError, ChatBackend, ProvisionRequest, ThreadRow, TokenRequest, TokenResponse};

/// HTTP client for the chat backend functions.
pub struct HttpChatBackend {
    base_url: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for HttpChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChatBackend")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpChatBackend {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn read_json<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let response = Self::check_status(path, response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }

    async fn check_status(
        path: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        // A bare 404 means the function is not deployed; one carrying an
        // `error` body is the function answering.
        if status == reqwest::StatusCode::NOT_FOUND
            && serde_json::from_str::<ErrorBody>(&text).is_err()
        {
            return Err(BackendError::NotFound(path.to_string()));
        }
        Err(BackendError::Rejected {
            status: status.as_u16(),
            message: error_message(&text),
        })
    }
}

/// Pull the `error` field out of a failure body, or fall back to a
/// truncated copy of the raw text.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => body.chars().take(200).collect(),
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn issue_token(
        &self,
        bearer: &str,
        request: &TokenRequest,
    ) -> Result<TokenResponse, BackendError> {
        let path = "chat/token";
        debug!(
            thread_id = ?request.thread_id,
            quote_id = ?request.quote_id,
            "Requesting chat token"
        );
        let response = self
            .http
            .post(self.endpoint(path))
            .bearer_auth(bearer)
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Self::read_json(path, response).await
    }

    async fn provision(
        &self,
        bearer: &str,
        request: &ProvisionRequest,
    ) -> Result<(), BackendError> {
        let path = "chat/provision";
        debug!("Provisioning chat identities");
        let response = self
            .http
            .post(self.endpoint(path))
            .bearer_auth(bearer)
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Self::check_status(path, response).await.map(|_| ())
    }

    async fn list_threads(&self, bearer: &str) -> Result<Vec<ThreadRow>, BackendError> {
        let path = "chat/threads";
        let response = self
            .http
            .get(self.endpoint(path))
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let list: ThreadList = Self::read_json(path, response).await?;
        debug!(count = list.threads.len(), "Fetched thread list");
        Ok(list.threads)
    }
}

use serde::{Deserialize, Serialize};

/// HTTP backend hosting the chat token, provisioning and thread endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL the `/chat/*` paths are appended to.
    pub base_url: String,
    /// Whole-request timeout in seconds.
    pub request_timeout: u32,
    /// TCP/TLS connect timeout in seconds.
    pub connect_timeout: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321/functions/v1".into(),
            request_timeout: 15,
            connect_timeout: 10,
        }
    }
}

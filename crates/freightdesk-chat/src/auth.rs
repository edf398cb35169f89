//! The signed-in user the session acts for.

/// Bearer credentials and identity of the signed-in user.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    pub user_id: String,
    /// The user's own organisation; used when provisioning and as the
    /// initiating branch of peer conversations.
    pub organization_id: Option<String>,
}

impl AuthSession {
    pub fn new(access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            user_id: user_id.into(),
            organization_id: None,
        }
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

//! Session credentials handed to the sync engine by the host application.

/// The session a [`SyncCoordinator`](crate::sync::SyncCoordinator) runs for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user_id: Option<String>,
    pub token: Option<String>,
}

/// Credentials of an authenticated session, passed to the push transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub user_id: Option<String>,
    pub token: String,
}

impl Session {
    pub fn authenticated(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            token: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }

    /// Credentials for an authenticated session, `None` otherwise.
    pub fn credentials(&self) -> Option<SessionCredentials> {
        if !self.is_authenticated() {
            return None;
        }
        self.token.as_ref().map(|token| SessionCredentials {
            user_id: self.user_id.clone(),
            token: token.clone(),
        })
    }
}

//! Caller session.
//!
//! The session is passed explicitly into every operation; nothing reads
//! the caller identity from ambient state.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Identity of an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Caller context: an access token and the identity it belongs to.
#[derive(Debug, Clone, Default)]
pub struct Session {
    access_token: Option<String>,
    user: Option<AuthUser>,
}

impl Session {
    /// A session with no caller. Reads run under the anonymous key.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A session for an authenticated caller.
    pub fn authenticated(access_token: impl Into<String>, user: AuthUser) -> Self {
        Self {
            access_token: Some(access_token.into()),
            user: Some(user),
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// The caller identity, or an authentication error when there is none.
    pub fn require_user(&self) -> Result<&AuthUser, AppError> {
        self.user
            .as_ref()
            .ok_or_else(|| AppError::authentication("Not authenticated"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_session_requires_user() {
        let session = Session::anonymous();
        assert!(!session.is_authenticated());
        assert!(session.access_token().is_none());
        assert!(session.require_user().unwrap_err().is_authentication());
    }

    #[test]
    fn test_authenticated_session() {
        let session = Session::authenticated(
            "token",
            AuthUser {
                id: "u1".to_string(),
                email: None,
            },
        );
        assert_eq!(session.require_user().unwrap().id, "u1");
        assert_eq!(session.access_token(), Some("token"));
    }
}

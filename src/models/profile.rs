//! Profile model.
//!
//! Profiles are owned outside this system. They are read only to
//! denormalize ticket creators and comment authors.

use serde::{Deserialize, Serialize};

/// Role of a user. Unrecognized values decode as `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "admin" => Self::Admin,
            _ => Self::User,
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

/// A profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
}

/// The display fragment a profile resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub display_name: String,
    pub role: Role,
}

impl From<Profile> for ProfileSummary {
    fn from(profile: Profile) -> Self {
        Self {
            display_name: profile.display_name,
            role: profile.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from("admin"), Role::Admin);
        assert_eq!(Role::from("ADMIN"), Role::Admin);
        assert_eq!(Role::from("user"), Role::User);
        assert_eq!(Role::from("something"), Role::User);
    }

    #[test]
    fn test_role_round_trips_through_json() {
        let profile: Profile = serde_json::from_str(
            r#"{"user_id":"u1","display_name":"Grace","role":"admin"}"#,
        )
        .unwrap();
        assert_eq!(profile.role, Role::Admin);
        assert_eq!(ProfileSummary::from(profile).display_name, "Grace");
    }

    #[test]
    fn test_unexpected_role_decodes_as_user() {
        let profiles: Vec<Profile> = serde_json::from_str(
            r#"[
                {"user_id":"u1","display_name":"Ada","role":"Admin"},
                {"user_id":"u2","display_name":"Grace","role":"moderator"}
            ]"#,
        )
        .unwrap();

        assert_eq!(profiles[0].role, Role::Admin);
        assert_eq!(profiles[1].role, Role::User);
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), r#""admin""#);
    }
}

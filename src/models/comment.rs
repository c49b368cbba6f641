//! Comment model for ticket threads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a comment, as displayed. Carries no role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub display_name: String,
}

impl CommentAuthor {
    /// Stand-in for an author whose profile could not be resolved.
    pub fn unknown() -> Self {
        Self {
            display_name: super::UNKNOWN_DISPLAY_NAME.to_string(),
        }
    }
}

/// A denormalized comment on a ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,

    /// Parent ticket ID.
    pub ticket_id: String,

    /// Resolved author. Kept under `author_id` on the wire, where the
    /// front end expects the resolved fragment.
    #[serde(rename = "author_id")]
    pub author: CommentAuthor,

    /// Comment content.
    pub body: String,

    pub created_at: DateTime<Utc>,
}

/// A comment row as stored: author as an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: String,
    pub ticket_id: String,
    pub author_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_serialized_under_author_id() {
        let comment = Comment {
            id: "c1".to_string(),
            ticket_id: "t1".to_string(),
            author: CommentAuthor {
                display_name: "Ada".to_string(),
            },
            body: "Looking into it".to_string(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&comment).unwrap();
        assert_eq!(json["author_id"]["display_name"], "Ada");
        assert!(json["author_id"].get("role").is_none());
    }

    #[test]
    fn test_unknown_author() {
        assert_eq!(CommentAuthor::unknown().display_name, "Unknown");
    }
}

//! The remote data surface the aggregation layer reads from and writes to.
//!
//! Row types here mirror what the backend returns for the ticket query with
//! its nested relations. They keep foreign keys as identifiers; resolving
//! them into display fragments happens in the ticket service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::{
    CommentRecord, Label, Profile, Session, TicketFilter, TicketLabelLink, TicketRecord,
    TicketStatus,
};

/// A comment nested under a ticket row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommentRow {
    pub id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author_id: Option<String>,
}

/// One `tickets_labels` association with its joined label.
///
/// The join can come back null when the label row is not visible to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TicketLabelRow {
    #[serde(default)]
    pub label: Option<Label>,
}

/// A ticket row with nested comments and label associations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TicketRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub comments: Vec<CommentRow>,
    #[serde(default)]
    pub tickets_labels: Vec<TicketLabelRow>,
}

/// Values for a new ticket row.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TicketInsert {
    pub title: String,
    pub description: String,
    pub created_by: String,
}

/// Values for a new comment row.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CommentInsert {
    pub ticket_id: String,
    pub author_id: String,
    pub body: String,
}

/// Table-level operations offered by the backend.
///
/// Every call carries the caller session; the backend evaluates its row
/// security policies against it. Implementations report failures verbatim
/// and never retry.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Tickets newest first, each with nested comments (oldest first) and labels.
    async fn fetch_tickets(
        &self,
        session: &Session,
        filter: &TicketFilter,
    ) -> Result<Vec<TicketRow>, AppError>;

    /// Exactly one ticket by id. Zero or several matches is `NotFound`.
    async fn fetch_ticket(&self, session: &Session, id: &str) -> Result<TicketRow, AppError>;

    /// Profiles for the given user ids in a single lookup.
    async fn fetch_profiles(
        &self,
        session: &Session,
        user_ids: &[String],
    ) -> Result<Vec<Profile>, AppError>;

    async fn insert_ticket(
        &self,
        session: &Session,
        ticket: &TicketInsert,
    ) -> Result<TicketRecord, AppError>;

    /// Insert association rows in one write.
    async fn insert_ticket_labels(
        &self,
        session: &Session,
        links: &[TicketLabelLink],
    ) -> Result<(), AppError>;

    async fn update_ticket_status(
        &self,
        session: &Session,
        id: &str,
        status: TicketStatus,
    ) -> Result<TicketRecord, AppError>;

    async fn insert_comment(
        &self,
        session: &Session,
        comment: &CommentInsert,
    ) -> Result<CommentRecord, AppError>;

    /// All labels ordered by name.
    async fn fetch_labels(&self, session: &Session) -> Result<Vec<Label>, AppError>;

    async fn insert_label(&self, session: &Session, name: &str) -> Result<Label, AppError>;

    async fn update_label(
        &self,
        session: &Session,
        id: &str,
        name: &str,
    ) -> Result<Label, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_row_from_nested_select() {
        let json = r#"{
            "id": "t1",
            "title": "Login broken",
            "description": "500 on submit",
            "status": "open",
            "created_by": "u1",
            "created_at": "2025-03-01T10:00:00+00:00",
            "updated_at": "2025-03-01T10:00:00+00:00",
            "comments": [
                {"id": "c1", "body": "Same here", "created_at": "2025-03-01T11:00:00Z", "author_id": "u2"}
            ],
            "tickets_labels": [
                {"label": {"id": "l1", "name": "bug"}},
                {"label": null}
            ]
        }"#;

        let row: TicketRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.status, TicketStatus::Open);
        assert_eq!(row.created_by.as_deref(), Some("u1"));
        assert_eq!(row.comments.len(), 1);
        assert_eq!(row.comments[0].author_id.as_deref(), Some("u2"));
        assert_eq!(row.tickets_labels.len(), 2);
        assert!(row.tickets_labels[1].label.is_none());
    }

    #[test]
    fn test_ticket_row_without_relations() {
        let json = r#"{
            "id": "t2",
            "title": "Dark mode",
            "description": "",
            "status": "closed",
            "created_by": null,
            "created_at": "2025-03-01T10:00:00Z",
            "updated_at": "2025-03-02T10:00:00Z"
        }"#;

        let row: TicketRow = serde_json::from_str(json).unwrap();
        assert!(row.created_by.is_none());
        assert!(row.comments.is_empty());
        assert!(row.tickets_labels.is_empty());
    }
}

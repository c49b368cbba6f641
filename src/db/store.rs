//! `DataSource` backed by the embedded SQLite database.
//!
//! Serves the same table surface as the hosted backend, for local
//! development and tests. The row security the application relies on is
//! emulated here and reported with the same error codes:
//! - writes require an authenticated session,
//! - tickets and comments can only be written as the caller,
//! - label and label-association writes are admin-only under the default policy.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite};

use super::pool::DbPool;
use crate::error::AppError;
use crate::models::{
    AuthUser, CommentRecord, Label, Profile, Role, Session, TicketFilter, TicketLabelLink,
    TicketRecord, TicketStatus,
};
use crate::services::data_source::{
    CommentInsert, CommentRow, DataSource, TicketInsert, TicketLabelRow, TicketRow,
};

/// Row security rules enforced by the embedded store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePolicy {
    /// Only admins may write labels and ticket/label associations.
    pub admin_only_labels: bool,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            admin_only_labels: true,
        }
    }
}

/// Embedded store over a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
    policy: StorePolicy,
}

#[derive(Debug, FromRow)]
struct TicketDbRow {
    id: String,
    title: String,
    description: String,
    status: String,
    created_by: String,
    created_at: String,
    updated_at: String,
}

impl TicketDbRow {
    fn into_record(self) -> Result<TicketRecord, AppError> {
        Ok(TicketRecord {
            status: self.status.parse()?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: self.id,
            title: self.title,
            description: self.description,
            created_by: self.created_by,
        })
    }
}

#[derive(Debug, FromRow)]
struct CommentDbRow {
    id: String,
    ticket_id: String,
    author_id: String,
    body: String,
    created_at: String,
}

impl CommentDbRow {
    fn into_record(self) -> Result<CommentRecord, AppError> {
        Ok(CommentRecord {
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            ticket_id: self.ticket_id,
            author_id: self.author_id,
            body: self.body,
        })
    }
}

#[derive(Debug, FromRow)]
struct TicketLabelDbRow {
    ticket_id: String,
    label_id: Option<String>,
    label_name: Option<String>,
}

#[derive(Debug, FromRow)]
struct ProfileDbRow {
    user_id: String,
    display_name: String,
    role: String,
}

const TICKET_COLUMNS: &str =
    "id, title, description, status, created_by, created_at, updated_at";

/// Format a timestamp the way it is stored.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            AppError::database_with_op(format!("Invalid timestamp '{}': {}", raw, e), "decode row")
        })
}

/// Case-insensitive substring match on title or description. `needle` is lowercase.
fn matches_search(record: &TicketRecord, needle: &str) -> bool {
    record.title.to_lowercase().contains(needle)
        || record.description.to_lowercase().contains(needle)
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self::with_policy(pool, StorePolicy::default())
    }

    pub fn with_policy(pool: DbPool, policy: StorePolicy) -> Self {
        Self { pool, policy }
    }

    /// Open (and migrate) the database at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self, AppError> {
        let pool = super::initialize(db_path).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Insert or replace a profile. Profiles are owned by the identity
    /// system; this is how they are seeded locally.
    pub async fn upsert_profile(&self, profile: &Profile) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, display_name, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET display_name = $2, role = $3
            "#,
        )
        .bind(&profile.user_id)
        .bind(&profile.display_name)
        .bind(profile.role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The authenticated caller, or a row security denial on `table`.
    fn require_writer<'s>(session: &'s Session, table: &str) -> Result<&'s AuthUser, AppError> {
        session.user().ok_or_else(|| AppError::row_security(table))
    }

    /// Enforce the admin-only label policy for the caller.
    async fn require_label_admin(&self, session: &Session, table: &str) -> Result<(), AppError> {
        let user = Self::require_writer(session, table)?;
        if !self.policy.admin_only_labels {
            return Ok(());
        }

        let role: Option<(String,)> = sqlx::query_as("SELECT role FROM profiles WHERE user_id = $1")
            .bind(&user.id)
            .fetch_optional(&self.pool)
            .await?;

        match role.map(|(r,)| Role::from(r.as_str())) {
            Some(Role::Admin) => Ok(()),
            _ => Err(AppError::row_security(table)),
        }
    }

    /// Attach comments and labels to ticket records.
    async fn hydrate(&self, records: Vec<TicketRecord>) -> Result<Vec<TicketRow>, AppError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut comments: HashMap<String, Vec<CommentRow>> = HashMap::new();
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, ticket_id, author_id, body, created_at FROM comments WHERE ticket_id IN (",
        );
        let mut ids = builder.separated(", ");
        for record in &records {
            ids.push_bind(record.id.clone());
        }
        builder.push(") ORDER BY created_at ASC, rowid ASC");

        for row in builder
            .build_query_as::<CommentDbRow>()
            .fetch_all(&self.pool)
            .await?
        {
            let record = row.into_record()?;
            comments
                .entry(record.ticket_id)
                .or_default()
                .push(CommentRow {
                    id: record.id,
                    body: record.body,
                    created_at: record.created_at,
                    author_id: Some(record.author_id),
                });
        }

        let mut labels: HashMap<String, Vec<TicketLabelRow>> = HashMap::new();
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT tl.ticket_id AS ticket_id, l.id AS label_id, l.name AS label_name
            FROM tickets_labels tl
            LEFT JOIN labels l ON l.id = tl.label_id
            WHERE tl.ticket_id IN (
            "#,
        );
        let mut ids = builder.separated(", ");
        for record in &records {
            ids.push_bind(record.id.clone());
        }
        builder.push(") ORDER BY l.name ASC");

        for row in builder
            .build_query_as::<TicketLabelDbRow>()
            .fetch_all(&self.pool)
            .await?
        {
            let label = match (row.label_id, row.label_name) {
                (Some(id), Some(name)) => Some(Label { id, name }),
                _ => None,
            };
            labels
                .entry(row.ticket_id)
                .or_default()
                .push(TicketLabelRow { label });
        }

        Ok(records
            .into_iter()
            .map(|record| TicketRow {
                comments: comments.remove(&record.id).unwrap_or_default(),
                tickets_labels: labels.remove(&record.id).unwrap_or_default(),
                id: record.id,
                title: record.title,
                description: record.description,
                status: record.status,
                created_by: Some(record.created_by),
                created_at: record.created_at,
                updated_at: record.updated_at,
            })
            .collect())
    }
}

#[async_trait]
impl DataSource for SqliteStore {
    async fn fetch_tickets(
        &self,
        _session: &Session,
        filter: &TicketFilter,
    ) -> Result<Vec<TicketRow>, AppError> {
        // SQLite's LIKE only folds ASCII case, so the search runs here.
        let needle = filter.search_term().map(str::to_lowercase);

        let rows = sqlx::query_as::<_, TicketDbRow>(&format!(
            r#"
            SELECT {}
            FROM tickets
            WHERE ($1 IS NULL OR status = $1)
            ORDER BY created_at DESC, rowid DESC
            "#,
            TICKET_COLUMNS
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .into_iter()
            .map(TicketDbRow::into_record)
            .filter(|record| match (record, needle.as_deref()) {
                (Ok(record), Some(needle)) => matches_search(record, needle),
                _ => true,
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.hydrate(records).await
    }

    async fn fetch_ticket(&self, _session: &Session, id: &str) -> Result<TicketRow, AppError> {
        let rows = sqlx::query_as::<_, TicketDbRow>(&format!(
            "SELECT {} FROM tickets WHERE id = $1",
            TICKET_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        if rows.len() != 1 {
            return Err(AppError::not_found_with_id("tickets", id));
        }

        let records = rows
            .into_iter()
            .map(TicketDbRow::into_record)
            .collect::<Result<Vec<_>, _>>()?;
        self.hydrate(records)
            .await?
            .pop()
            .ok_or_else(|| AppError::not_found_with_id("tickets", id))
    }

    async fn fetch_profiles(
        &self,
        _session: &Session,
        user_ids: &[String],
    ) -> Result<Vec<Profile>, AppError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT user_id, display_name, role FROM profiles WHERE user_id IN (",
        );
        let mut ids = builder.separated(", ");
        for id in user_ids {
            ids.push_bind(id.as_str());
        }
        builder.push(")");

        let rows = builder
            .build_query_as::<ProfileDbRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Profile {
                role: Role::from(row.role.as_str()),
                user_id: row.user_id,
                display_name: row.display_name,
            })
            .collect())
    }

    async fn insert_ticket(
        &self,
        session: &Session,
        ticket: &TicketInsert,
    ) -> Result<TicketRecord, AppError> {
        let user = Self::require_writer(session, "tickets")?;
        if user.id != ticket.created_by {
            return Err(AppError::row_security("tickets"));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = format_timestamp(Utc::now());

        let row = sqlx::query_as::<_, TicketDbRow>(&format!(
            r#"
            INSERT INTO tickets (id, title, description, status, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, 'open', $4, $5, $5)
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(&id)
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(&ticket.created_by)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        row.into_record()
    }

    async fn insert_ticket_labels(
        &self,
        session: &Session,
        links: &[TicketLabelLink],
    ) -> Result<(), AppError> {
        self.require_label_admin(session, "tickets_labels").await?;
        if links.is_empty() {
            return Ok(());
        }

        // One statement, so the batch lands or fails as a whole.
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO tickets_labels (ticket_id, label_id) ");
        builder.push_values(links, |mut b, link| {
            b.push_bind(link.ticket_id.as_str())
                .push_bind(link.label_id.as_str());
        });
        builder.build().execute(&self.pool).await?;

        Ok(())
    }

    async fn update_ticket_status(
        &self,
        session: &Session,
        id: &str,
        status: TicketStatus,
    ) -> Result<TicketRecord, AppError> {
        Self::require_writer(session, "tickets")?;

        let row = sqlx::query_as::<_, TicketDbRow>(&format!(
            "UPDATE tickets SET status = $1, updated_at = $2 WHERE id = $3 RETURNING {}",
            TICKET_COLUMNS
        ))
        .bind(status.as_str())
        .bind(format_timestamp(Utc::now()))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| AppError::not_found_with_id("tickets", id))?
            .into_record()
    }

    async fn insert_comment(
        &self,
        session: &Session,
        comment: &CommentInsert,
    ) -> Result<CommentRecord, AppError> {
        let user = Self::require_writer(session, "comments")?;
        if user.id != comment.author_id {
            return Err(AppError::row_security("comments"));
        }

        let row = sqlx::query_as::<_, CommentDbRow>(
            r#"
            INSERT INTO comments (id, ticket_id, author_id, body, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, ticket_id, author_id, body, created_at
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&comment.ticket_id)
        .bind(&comment.author_id)
        .bind(&comment.body)
        .bind(format_timestamp(Utc::now()))
        .fetch_one(&self.pool)
        .await?;

        row.into_record()
    }

    async fn fetch_labels(&self, _session: &Session) -> Result<Vec<Label>, AppError> {
        let labels = sqlx::query_as::<_, Label>("SELECT id, name FROM labels ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(labels)
    }

    async fn insert_label(&self, session: &Session, name: &str) -> Result<Label, AppError> {
        self.require_label_admin(session, "labels").await?;

        let label = sqlx::query_as::<_, Label>(
            "INSERT INTO labels (id, name) VALUES ($1, $2) RETURNING id, name",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(label)
    }

    async fn update_label(
        &self,
        session: &Session,
        id: &str,
        name: &str,
    ) -> Result<Label, AppError> {
        self.require_label_admin(session, "labels").await?;

        let label = sqlx::query_as::<_, Label>(
            "UPDATE labels SET name = $1 WHERE id = $2 RETURNING id, name",
        )
        .bind(name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        label.ok_or_else(|| AppError::not_found_with_id("labels", id))
    }
}

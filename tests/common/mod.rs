//! Shared fixtures for the integration tests.
//!
//! Each test gets its own temporary SQLite database. `CountingSource` wraps
//! the store and counts profile lookups so tests can check round trips.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::{tempdir, TempDir};

use ticketdesk::db::SqliteStore;
use ticketdesk::error::AppError;
use ticketdesk::models::{
    AuthUser, CommentRecord, Label, NewTicket, Profile, Role, Session, TicketFilter,
    TicketLabelLink, TicketRecord, TicketStatus,
};
use ticketdesk::services::data_source::{CommentInsert, DataSource, TicketInsert, TicketRow};
use ticketdesk::services::TicketService;

/// Message of the error returned while profile lookups are failing.
pub const PROFILES_DOWN: &str = "profiles service unavailable";

/// Data source wrapper that counts calls per operation and can make
/// profile lookups fail.
pub struct CountingSource<S> {
    inner: S,
    profile_lookups: AtomicUsize,
    ticket_inserts: AtomicUsize,
    fail_profiles: AtomicBool,
}

impl<S> CountingSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            profile_lookups: AtomicUsize::new(0),
            ticket_inserts: AtomicUsize::new(0),
            fail_profiles: AtomicBool::new(false),
        }
    }

    /// Make every following profile lookup fail with a backend error.
    pub fn fail_profile_lookups(&self, fail: bool) {
        self.fail_profiles.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn profile_lookups(&self) -> usize {
        self.profile_lookups.load(Ordering::SeqCst)
    }

    pub fn ticket_inserts(&self) -> usize {
        self.ticket_inserts.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.profile_lookups.store(0, Ordering::SeqCst);
        self.ticket_inserts.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: DataSource> DataSource for CountingSource<S> {
    async fn fetch_tickets(
        &self,
        session: &Session,
        filter: &TicketFilter,
    ) -> Result<Vec<TicketRow>, AppError> {
        self.inner.fetch_tickets(session, filter).await
    }

    async fn fetch_ticket(&self, session: &Session, id: &str) -> Result<TicketRow, AppError> {
        self.inner.fetch_ticket(session, id).await
    }

    async fn fetch_profiles(
        &self,
        session: &Session,
        user_ids: &[String],
    ) -> Result<Vec<Profile>, AppError> {
        self.profile_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_profiles.load(Ordering::SeqCst) {
            return Err(AppError::backend_with_code(PROFILES_DOWN, "PGRST000"));
        }
        self.inner.fetch_profiles(session, user_ids).await
    }

    async fn insert_ticket(
        &self,
        session: &Session,
        ticket: &TicketInsert,
    ) -> Result<TicketRecord, AppError> {
        self.ticket_inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_ticket(session, ticket).await
    }

    async fn insert_ticket_labels(
        &self,
        session: &Session,
        links: &[TicketLabelLink],
    ) -> Result<(), AppError> {
        self.inner.insert_ticket_labels(session, links).await
    }

    async fn update_ticket_status(
        &self,
        session: &Session,
        id: &str,
        status: TicketStatus,
    ) -> Result<TicketRecord, AppError> {
        self.inner.update_ticket_status(session, id, status).await
    }

    async fn insert_comment(
        &self,
        session: &Session,
        comment: &CommentInsert,
    ) -> Result<CommentRecord, AppError> {
        self.inner.insert_comment(session, comment).await
    }

    async fn fetch_labels(&self, session: &Session) -> Result<Vec<Label>, AppError> {
        self.inner.fetch_labels(session).await
    }

    async fn insert_label(&self, session: &Session, name: &str) -> Result<Label, AppError> {
        self.inner.insert_label(session, name).await
    }

    async fn update_label(
        &self,
        session: &Session,
        id: &str,
        name: &str,
    ) -> Result<Label, AppError> {
        self.inner.update_label(session, id, name).await
    }
}

pub type TestService = TicketService<CountingSource<SqliteStore>>;

/// A service over a fresh temporary database. Keep the `TempDir` alive.
pub async fn setup_service() -> (TempDir, TestService) {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("tickets.db"))
        .await
        .unwrap();
    (dir, TicketService::new(CountingSource::new(store)))
}

pub fn session_for(user_id: &str) -> Session {
    Session::authenticated(
        format!("token-{}", user_id),
        AuthUser {
            id: user_id.to_string(),
            email: Some(format!("{}@example.com", user_id)),
        },
    )
}

pub async fn seed_profile(service: &TestService, user_id: &str, display_name: &str, role: Role) {
    service
        .source()
        .inner()
        .upsert_profile(&Profile {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            role,
        })
        .await
        .unwrap();
}

/// Create a ticket with no labels as `user_id`.
pub async fn create_ticket(
    service: &TestService,
    user_id: &str,
    title: &str,
    description: &str,
) -> TicketRecord {
    service
        .create_ticket(
            &session_for(user_id),
            NewTicket {
                title: title.to_string(),
                description: description.to_string(),
                label_ids: None,
            },
        )
        .await
        .unwrap()
}

/// Count ticket rows directly in the database.
pub async fn ticket_row_count(service: &TestService) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tickets")
        .fetch_one(service.source().inner().pool())
        .await
        .unwrap();
    count
}

/// Count comment rows for a ticket directly in the database.
pub async fn comment_row_count(service: &TestService, ticket_id: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM comments WHERE ticket_id = $1")
        .bind(ticket_id)
        .fetch_one(service.source().inner().pool())
        .await
        .unwrap();
    count
}

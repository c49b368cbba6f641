//! Ticket service: the read-model aggregation layer and ticket/label writes.
//!
//! Reads fetch ticket rows with their nested comments and label
//! associations in one query, resolve every creator and comment author in
//! one batched profile lookup, and merge the result into denormalized
//! `Ticket` views. Writes pass through to the data source; the caller
//! session is threaded into every call.

use std::collections::HashSet;

use crate::error::AppError;
use crate::models::{
    Comment, CommentAuthor, Label, NewTicket, Session, Ticket, TicketCreator, TicketFilter,
    TicketLabelLink, TicketRecord, TicketStatus,
};
use crate::services::data_source::{CommentInsert, DataSource, TicketInsert, TicketRow};
use crate::services::profile_resolver::{ProfileMap, ProfileResolver};

/// Shown when the backend's row security rejects attaching labels.
pub const LABEL_PERMISSION_HINT: &str = "You do not have permission to set labels. \
Make your user an admin or relax the tickets_labels RLS policy.";

/// Aggregates tickets, comments, labels and profiles from a data source.
pub struct TicketService<S> {
    source: S,
}

impl<S: DataSource> TicketService<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// The underlying data source.
    pub fn source(&self) -> &S {
        &self.source
    }

    fn profiles(&self) -> ProfileResolver<'_> {
        ProfileResolver::new(&self.source)
    }

    /// List tickets newest first, optionally filtered by status and search term.
    ///
    /// Every returned row yields exactly one ticket, in the order the backend
    /// returned them. Label filtering is not applied here; see
    /// [`crate::models::retain_with_label`].
    pub async fn list_tickets(
        &self,
        session: &Session,
        filter: &TicketFilter,
    ) -> Result<Vec<Ticket>, AppError> {
        let rows = self.source.fetch_tickets(session, filter).await?;
        log::debug!("[tickets] Listing returned {} rows", rows.len());

        let ids = rows.iter().flat_map(|row| {
            std::iter::once(row.created_by.as_deref())
                .chain(row.comments.iter().map(|c| c.author_id.as_deref()))
        });
        let profiles = self.profiles().resolve(session, ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| denormalize(row, &profiles))
            .collect())
    }

    /// Fetch one ticket by id. A missing ticket is `NotFound`.
    pub async fn get_ticket(&self, session: &Session, id: &str) -> Result<Ticket, AppError> {
        let row = self.source.fetch_ticket(session, id).await?;

        let ids = std::iter::once(row.created_by.as_deref())
            .chain(row.comments.iter().map(|c| c.author_id.as_deref()));
        let profiles = self.profiles().resolve(session, ids).await?;

        Ok(denormalize(row, &profiles))
    }

    /// Create a ticket owned by the caller, then attach its labels.
    ///
    /// The ticket insert and the label insert are two separate writes. When
    /// the second one fails the ticket still exists, and the error is
    /// `LabelsNotAttached` carrying the new ticket's id.
    pub async fn create_ticket(
        &self,
        session: &Session,
        input: NewTicket,
    ) -> Result<TicketRecord, AppError> {
        let user = session.require_user()?;

        let title = input.title.trim();
        if title.is_empty() {
            return Err(AppError::invalid_input_field("Title is required", "title"));
        }
        let description = input.description.trim();
        if description.is_empty() {
            return Err(AppError::invalid_input_field(
                "Description is required",
                "description",
            ));
        }

        let record = self
            .source
            .insert_ticket(
                session,
                &TicketInsert {
                    title: title.to_string(),
                    description: description.to_string(),
                    created_by: user.id.clone(),
                },
            )
            .await?;
        log::info!("[tickets] Created ticket {}", record.id);

        let label_ids = dedupe_label_ids(input.label_ids.unwrap_or_default());
        if label_ids.is_empty() {
            return Ok(record);
        }

        let links: Vec<TicketLabelLink> = label_ids
            .into_iter()
            .map(|label_id| TicketLabelLink {
                ticket_id: record.id.clone(),
                label_id,
            })
            .collect();

        if let Err(err) = self.source.insert_ticket_labels(session, &links).await {
            log::warn!(
                "[tickets] Ticket {} created but labels were not attached: {}",
                record.id,
                err
            );
            let message = if err.is_row_security_violation() {
                LABEL_PERMISSION_HINT.to_string()
            } else {
                err.raw_message()
            };
            return Err(AppError::LabelsNotAttached {
                ticket_id: record.id,
                message,
            });
        }

        Ok(record)
    }

    /// Set a ticket's status. No concurrency check: the last write wins.
    pub async fn update_ticket_status(
        &self,
        session: &Session,
        id: &str,
        status: TicketStatus,
    ) -> Result<TicketRecord, AppError> {
        let record = self.source.update_ticket_status(session, id, status).await?;
        log::info!("[tickets] Ticket {} is now {}", record.id, record.status);
        Ok(record)
    }

    /// Add a comment by the caller and return it with its author resolved.
    pub async fn add_comment(
        &self,
        session: &Session,
        ticket_id: &str,
        body: &str,
    ) -> Result<Comment, AppError> {
        let user = session.require_user()?;

        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::invalid_input_field("Comment cannot be empty", "body"));
        }

        let record = self
            .source
            .insert_comment(
                session,
                &CommentInsert {
                    ticket_id: ticket_id.to_string(),
                    author_id: user.id.clone(),
                    body: body.to_string(),
                },
            )
            .await?;

        let profiles = self
            .profiles()
            .resolve(session, [Some(record.author_id.as_str())])
            .await?;

        Ok(Comment {
            author: comment_author(&profiles, Some(record.author_id.as_str())),
            id: record.id,
            ticket_id: record.ticket_id,
            body: record.body,
            created_at: record.created_at,
        })
    }

    /// All labels, ordered by name.
    pub async fn list_labels(&self, session: &Session) -> Result<Vec<Label>, AppError> {
        self.source.fetch_labels(session).await
    }

    /// Create a label. Name uniqueness is left to the store.
    pub async fn create_label(&self, session: &Session, name: &str) -> Result<Label, AppError> {
        let name = validate_label_name(name)?;
        let label = self.source.insert_label(session, name).await?;
        log::info!("[tickets] Created label '{}'", label.name);
        Ok(label)
    }

    /// Rename a label.
    pub async fn update_label(
        &self,
        session: &Session,
        id: &str,
        name: &str,
    ) -> Result<Label, AppError> {
        let name = validate_label_name(name)?;
        self.source.update_label(session, id, name).await
    }
}

fn validate_label_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::invalid_input_field("Label name is required", "name"));
    }
    Ok(name)
}

/// Drop repeated label ids, keeping first occurrences in order.
fn dedupe_label_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

fn ticket_creator(profiles: &ProfileMap, ticket_id: &str, user_id: Option<&str>) -> TicketCreator {
    match user_id.and_then(|id| profiles.get(id)) {
        Some(profile) => TicketCreator {
            display_name: profile.display_name.clone(),
            role: profile.role,
        },
        None => {
            log::warn!(
                "[tickets] No profile for creator {:?} of ticket {}",
                user_id,
                ticket_id
            );
            TicketCreator::unknown()
        }
    }
}

fn comment_author(profiles: &ProfileMap, user_id: Option<&str>) -> CommentAuthor {
    user_id
        .and_then(|id| profiles.get(id))
        .map(|profile| CommentAuthor {
            display_name: profile.display_name.clone(),
        })
        .unwrap_or_else(CommentAuthor::unknown)
}

/// Merge a ticket row with resolved profiles into its view.
fn denormalize(row: TicketRow, profiles: &ProfileMap) -> Ticket {
    let created_by = ticket_creator(profiles, &row.id, row.created_by.as_deref());

    let comments = row
        .comments
        .into_iter()
        .map(|c| Comment {
            author: comment_author(profiles, c.author_id.as_deref()),
            id: c.id,
            ticket_id: row.id.clone(),
            body: c.body,
            created_at: c.created_at,
        })
        .collect();

    let labels = row
        .tickets_labels
        .into_iter()
        .filter_map(|link| link.label)
        .collect();

    Ticket {
        id: row.id,
        title: row.title,
        description: row.description,
        status: row.status,
        created_by,
        labels,
        comments,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

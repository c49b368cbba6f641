//! Ticket model and its denormalized view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::comment::Comment;
use super::label::Label;
use super::profile::Role;

/// Status of a ticket. Transitions are manual and go both ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    /// The status a toggle moves to.
    pub fn toggled(self) -> Self {
        match self {
            Self::Open => Self::Closed,
            Self::Closed => Self::Open,
        }
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(crate::error::AppError::invalid_input_field(
                format!("Unknown ticket status '{}'", other),
                "status",
            )),
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creator of a ticket, as displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketCreator {
    pub display_name: String,
    pub role: Role,
}

impl TicketCreator {
    /// Stand-in for a creator whose profile could not be resolved.
    pub fn unknown() -> Self {
        Self {
            display_name: super::UNKNOWN_DISPLAY_NAME.to_string(),
            role: Role::User,
        }
    }
}

/// Fully denormalized ticket, ready for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,

    /// Creator resolved from the profile store.
    pub created_by: TicketCreator,

    /// Labels attached through `tickets_labels`.
    pub labels: Vec<Label>,

    /// Comment thread, oldest first.
    pub comments: Vec<Comment>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Check whether a label with exactly this name is attached.
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }
}

/// Keep only the tickets carrying a label named `name`.
///
/// Label filtering runs on the fetched listing rather than in the remote query.
pub fn retain_with_label(tickets: &mut Vec<Ticket>, name: &str) {
    tickets.retain(|t| t.has_label(name));
}

/// A ticket row as returned by writes: no nested data, creator as an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a ticket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub label_ids: Option<Vec<String>>,
}

/// Filters accepted by the ticket listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFilter {
    /// Exact status match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,

    /// Case-insensitive substring on title or description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl TicketFilter {
    /// The search term, ignoring blank input.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

//! Data models for the application.
//!
//! Row shapes as stored by the backend, and the denormalized view models
//! handed to the front end. All models derive Serialize so they can cross
//! into any UI layer as JSON.

pub mod comment;
pub mod label;
pub mod profile;
pub mod session;
pub mod ticket;

/// Display name used when a profile cannot be resolved.
pub const UNKNOWN_DISPLAY_NAME: &str = "Unknown";

// Re-exports for convenient access
pub use comment::{Comment, CommentAuthor, CommentRecord};
pub use label::{Label, TicketLabelLink};
pub use profile::{Profile, ProfileSummary, Role};
pub use session::{AuthUser, Session};
pub use ticket::{
    retain_with_label, NewTicket, Ticket, TicketCreator, TicketFilter, TicketRecord, TicketStatus,
};

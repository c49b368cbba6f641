//! Label model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A label from the shared taxonomy. Names are unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// Association between a ticket and a label (`tickets_labels` row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketLabelLink {
    pub ticket_id: String,
    pub label_id: String,
}

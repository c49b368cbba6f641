//! Business logic services.
//!
//! Clients for the hosted data and auth APIs, the data source seam both the
//! remote client and the embedded store implement, and the ticket service
//! that aggregates everything into read models.

pub mod auth_client;
pub mod credentials;
pub mod data_source;
pub mod postgrest;
pub mod profile_resolver;
pub mod tickets;

pub use auth_client::{AuthClient, AuthClientConfig};
pub use credentials::SessionVault;
pub use data_source::DataSource;
pub use postgrest::{PostgrestClient, PostgrestConfig};
pub use profile_resolver::{ProfileMap, ProfileResolver};
pub use tickets::{TicketService, LABEL_PERMISSION_HINT};

//! Ticketdesk - typed data and aggregation layer for a small ticket tracker.
//!
//! Tickets, comments and labels live in a hosted Postgres database reached
//! through its REST gateway; identity comes from the hosted auth API. This
//! crate joins them into denormalized `Ticket` views with creator and
//! comment author names resolved, and exposes the ticket and label writes.
//!
//! An embedded SQLite store implements the same `DataSource` seam for local
//! use and tests.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use config::AppConfig;
pub use error::AppError;
pub use services::{AuthClient, DataSource, PostgrestClient, SessionVault, TicketService};

//! Application error types.
//!
//! These errors are serializable so a front end can render a meaningful
//! message for any failed operation.

use serde::Serialize;
use thiserror::Error;

/// SQLSTATE reported by the backend when a row-level security policy rejects a write.
pub const ROW_SECURITY_CODE: &str = "42501";

/// Application-level errors returned by every ticket, label and auth operation.
///
/// All variants serialize to a structured JSON object for frontend consumption.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// Local database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },

    /// The backend rejected a query or write.
    #[error("{message}")]
    Backend {
        message: String,
        /// Backend error code (SQLSTATE or PostgREST code).
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },

    /// Network request failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// No authenticated caller, or the credentials were rejected.
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// Requested resource not found.
    #[error("Not found: {resource}")]
    NotFound {
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Invalid input provided.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    /// The ticket was created but attaching its labels failed.
    #[error("{message}")]
    LabelsNotAttached { ticket_id: String, message: String },

    /// Credential storage operation failed.
    #[error("Credential storage error: {message}")]
    CredentialStorage { message: String },

    /// Configuration is missing or malformed.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a database error with optional operation context.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: None,
        }
    }

    /// Create a database error with operation context.
    pub fn database_with_op(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: Some(operation.into()),
        }
    }

    /// Create a backend error carrying only a message.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            code: None,
            status_code: None,
            endpoint: None,
        }
    }

    /// Create a backend error with its error code.
    pub fn backend_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            code: Some(code.into()),
            status_code: None,
            endpoint: None,
        }
    }

    /// Create a backend error with code, HTTP status and endpoint.
    pub fn backend_full(
        message: impl Into<String>,
        code: Option<String>,
        status_code: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::Backend {
            message: message.into(),
            code,
            status_code: Some(status_code),
            endpoint: Some(endpoint.into()),
        }
    }

    /// Create a row-level security denial for `table`.
    pub fn row_security(table: &str) -> Self {
        Self::backend_with_code(
            format!(
                "new row violates row-level security policy for table \"{}\"",
                table
            ),
            ROW_SECURITY_CODE,
        )
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: None,
        }
    }

    /// Create a not found error with ID.
    pub fn not_found_with_id(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.into()),
        }
    }

    /// Create an invalid input error with field name.
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a credential storage error.
    pub fn credential_storage(message: impl Into<String>) -> Self {
        Self::CredentialStorage {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this is an authentication error.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if the backend rejected the request through a row-level security policy.
    pub fn is_row_security_violation(&self) -> bool {
        match self {
            Self::Backend { message, code, .. } => {
                code.as_deref() == Some(ROW_SECURITY_CODE)
                    || message.contains("row-level security")
            }
            _ => false,
        }
    }

    /// The message without the variant prefix, as a backend would report it.
    pub fn raw_message(&self) -> String {
        match self {
            Self::Database { message, .. }
            | Self::Backend { message, .. }
            | Self::Network { message }
            | Self::Authentication { message }
            | Self::InvalidInput { message, .. }
            | Self::LabelsNotAttached { message, .. }
            | Self::CredentialStorage { message }
            | Self::Config { message }
            | Self::Internal { message } => message.clone(),
            Self::NotFound { .. } => self.to_string(),
        }
    }
}

// Conversions from common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // Keep constraint failures shaped like the hosted backend reports them.
            if db_err.is_unique_violation() {
                return Self::backend_with_code(db_err.message().to_string(), "23505");
            }
            if db_err.is_foreign_key_violation() {
                return Self::backend_with_code(db_err.message().to_string(), "23503");
            }
        }
        Self::database(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network("Request timed out")
        } else if err.is_connect() {
            Self::network("Failed to connect to server")
        } else if err.is_status() {
            Self::backend(format!("HTTP error: {}", err))
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        match err {
            crate::db::DbError::Sqlite(e) => e.into(),
            other => Self::database(other.to_string()),
        }
    }
}

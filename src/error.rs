//! Application error types.
//!
//! These errors are serializable so the CLI can report them as structured
//! JSON, and they carry enough context to be written into the sync log.

use serde::Serialize;
use thiserror::Error;

/// Application-level errors returned by the sync engine and its collaborators.
///
/// All variants serialize to a structured JSON object.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },

    /// GitHub answered a request with a non-success status.
    #[error("Fetch error ({status_code}) for {endpoint}: {message}")]
    Fetch {
        message: String,
        status_code: u16,
        endpoint: String,
    },

    /// Network request failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Authentication failed or credentials invalid.
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

    /// Another sync of the same repository has not finished.
    #[error(
        "An outstanding sync is in progress for {repository} (by {operator}, started at {started_at}). \
         Run `hubsync cancel {repository}` or pass --force if that sync is known to be dead."
    )]
    SyncInProgress {
        repository: String,
        operator: String,
        started_at: i64,
    },

    /// The database schema has pending migrations.
    #[error("Database schema is not current; pending migrations: {}", pending.join(", "))]
    SchemaNotReady { pending: Vec<String> },

    /// A remote issue disagrees with the stored issue/pull request variant.
    #[error("Issue {repository}#{number} is stored as {stored} but the remote reports {remote}")]
    VariantMismatch {
        repository: String,
        number: i64,
        stored: String,
        remote: String,
    },

    /// An actor row of one kind was about to be updated from data of another kind.
    #[error("Actor {name} is a {stored} and cannot be updated from {incoming} data")]
    ActorKindMismatch {
        name: String,
        stored: String,
        incoming: String,
    },

    /// The operation was cancelled by the caller.
    #[error("Cancelled: {message}")]
    Cancelled { message: String },

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

    /// Create a fetch error for a non-success response.
    pub fn fetch(message: impl Into<String>, status_code: u16, endpoint: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
            status_code,
            endpoint: endpoint.into(),
        }
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

    /// Create a cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the remote reported the resource as missing (or hidden from us).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Fetch { status_code, .. } => *status_code == 404,
            _ => false,
        }
    }

    /// HTTP status carried by a fetch error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Fetch { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

// Conversions from common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::database(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network("Request timed out")
        } else if err.is_connect() {
            Self::network("Failed to connect to server")
        } else if let Some(status) = err.status() {
            Self::fetch(err.to_string(), status.as_u16(), err.url().map(|u| u.path()).unwrap_or(""))
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
            crate::db::DbError::SchemaNotReady(pending) => Self::SchemaNotReady { pending },
            other => Self::database(other.to_string()),
        }
    }
}

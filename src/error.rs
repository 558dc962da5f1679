//! # Error Types
//!
//! Crate-wide error enum. Database failures carry a typed [`DbErrorKind`]
//! assigned once at the driver boundary, which is what retry decisions are
//! made on.

use crate::database::error_codes::DbErrorKind;

/// A database failure with its classified kind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({kind})")]
pub struct DatabaseError {
    pub kind: DbErrorKind,
    pub message: String,
}

impl DatabaseError {
    pub fn new(kind: DbErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Error that must never be retried
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(DbErrorKind::Other, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        let kind = DbErrorKind::classify(&error);
        Self::new(kind, error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SentinelError {
    /// The circuit gate refused the operation
    #[error("Database unavailable: circuit open for endpoint '{endpoint}'")]
    DatabaseUnavailable { endpoint: String },

    #[error("Database error: {0}")]
    Database(DatabaseError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Alert error: {0}")]
    Alert(String),

    #[error("Collector '{collector}' failed: {message}")]
    Collector { collector: String, message: String },

    #[error("Monitor error: {0}")]
    Monitor(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SentinelError {
    /// Only connection-class database failures are retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            SentinelError::Database(err) => err.is_retryable(),
            _ => false,
        }
    }

    pub fn database_kind(&self) -> Option<DbErrorKind> {
        match self {
            SentinelError::Database(err) => Some(err.kind),
            _ => None,
        }
    }

    pub fn collector(collector: impl Into<String>, message: impl Into<String>) -> Self {
        SentinelError::Collector {
            collector: collector.into(),
            message: message.into(),
        }
    }
}

impl From<DatabaseError> for SentinelError {
    fn from(error: DatabaseError) -> Self {
        SentinelError::Database(error)
    }
}

impl From<sqlx::Error> for SentinelError {
    fn from(error: sqlx::Error) -> Self {
        SentinelError::Database(DatabaseError::from(error))
    }
}

impl From<config::ConfigError> for SentinelError {
    fn from(error: config::ConfigError) -> Self {
        SentinelError::Configuration(error.to_string())
    }
}

pub type SentinelResult<T> = std::result::Result<T, SentinelError>;

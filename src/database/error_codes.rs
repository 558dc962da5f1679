//! PostgreSQL Error Codes and Error-Kind Classification
//!
//! Maps driver errors onto a closed [`DbErrorKind`] enumeration exactly once,
//! at the point a `sqlx::Error` enters the crate. Retry decisions are made on
//! the kind, never on error text.
//!
//! ## SQLSTATE Format
//!
//! PostgreSQL error codes follow the SQL standard SQLSTATE format:
//! - 5-character codes representing error classes and conditions
//! - First 2 characters: error class
//! - Last 3 characters: specific condition
//!
//! ## Reference
//!
//! Full list: <https://www.postgresql.org/docs/current/errcodes-appendix.html>

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// Classified database failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbErrorKind {
    ConnectionReset,
    ConnectionRefused,
    Timeout,
    TooManyConnections,
    ServerClosedConnection,
    ConnectionLost,
    SerializationFailure,
    Deadlock,
    Constraint,
    Syntax,
    Other,
}

impl DbErrorKind {
    /// Connection-class failures that are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbErrorKind::ConnectionReset
                | DbErrorKind::ConnectionRefused
                | DbErrorKind::Timeout
                | DbErrorKind::TooManyConnections
                | DbErrorKind::ServerClosedConnection
                | DbErrorKind::ConnectionLost
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DbErrorKind::ConnectionReset => "connection_reset",
            DbErrorKind::ConnectionRefused => "connection_refused",
            DbErrorKind::Timeout => "timeout",
            DbErrorKind::TooManyConnections => "too_many_connections",
            DbErrorKind::ServerClosedConnection => "server_closed_connection",
            DbErrorKind::ConnectionLost => "connection_lost",
            DbErrorKind::SerializationFailure => "serialization_failure",
            DbErrorKind::Deadlock => "deadlock",
            DbErrorKind::Constraint => "constraint",
            DbErrorKind::Syntax => "syntax",
            DbErrorKind::Other => "other",
        }
    }

    /// Classify a driver error
    pub fn classify(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => DbErrorKind::Timeout,
            sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => DbErrorKind::ConnectionLost,
            sqlx::Error::Io(io_error) => Self::from_io_kind(io_error.kind()),
            sqlx::Error::Database(db_error) => db_error
                .code()
                .map(|code| PgErrorCode::kind_for_code(&code))
                .unwrap_or(DbErrorKind::Other),
            _ => DbErrorKind::Other,
        }
    }

    pub fn from_io_kind(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::ConnectionReset => DbErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionRefused => DbErrorKind::ConnectionRefused,
            io::ErrorKind::TimedOut => DbErrorKind::Timeout,
            io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => DbErrorKind::ConnectionLost,
            _ => DbErrorKind::Other,
        }
    }
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PostgreSQL SQLSTATE error codes
///
/// Only codes that influence classification are included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PgErrorCode;

impl PgErrorCode {
    // =========================================================================
    // Class 08: Connection Exception
    // =========================================================================

    pub const CONNECTION_EXCEPTION: &'static str = "08000";
    pub const CONNECTION_DOES_NOT_EXIST: &'static str = "08003";
    pub const CONNECTION_FAILURE: &'static str = "08006";
    pub const SQLCLIENT_UNABLE_TO_ESTABLISH: &'static str = "08001";
    pub const SQLSERVER_REJECTED_CONNECTION: &'static str = "08004";

    // =========================================================================
    // Class 23: Integrity Constraint Violation
    // =========================================================================

    /// Unique violation (duplicate key) - Code 23505
    pub const UNIQUE_VIOLATION: &'static str = "23505";

    // =========================================================================
    // Class 40: Transaction Rollback
    // =========================================================================

    /// Serialization failure - Code 40001
    pub const SERIALIZATION_FAILURE: &'static str = "40001";

    /// Deadlock detected - Code 40P01
    pub const DEADLOCK_DETECTED: &'static str = "40P01";

    // =========================================================================
    // Class 42: Syntax Error or Access Rule Violation
    // =========================================================================

    pub const SYNTAX_ERROR: &'static str = "42601";

    // =========================================================================
    // Class 53: Insufficient Resources
    // =========================================================================

    /// Too many connections - Code 53300
    ///
    /// Raised by the server (or PgBouncer) when `max_connections` is reached.
    pub const TOO_MANY_CONNECTIONS: &'static str = "53300";

    // =========================================================================
    // Class 57: Operator Intervention
    // =========================================================================

    /// Query canceled - Code 57014 (statement_timeout)
    pub const QUERY_CANCELED: &'static str = "57014";

    /// The server terminated the connection
    pub const ADMIN_SHUTDOWN: &'static str = "57P01";
    pub const CRASH_SHUTDOWN: &'static str = "57P02";
    pub const CANNOT_CONNECT_NOW: &'static str = "57P03";

    // =========================================================================
    // Helper Methods
    // =========================================================================

    /// Check if the error code is any integrity constraint violation (Class 23)
    #[inline]
    pub fn is_integrity_constraint_violation(code: &str) -> bool {
        code.starts_with("23")
    }

    /// Map a SQLSTATE code onto an error kind
    pub fn kind_for_code(code: &str) -> DbErrorKind {
        match code {
            Self::TOO_MANY_CONNECTIONS => DbErrorKind::TooManyConnections,
            Self::ADMIN_SHUTDOWN | Self::CRASH_SHUTDOWN => DbErrorKind::ServerClosedConnection,
            Self::CANNOT_CONNECT_NOW
            | Self::SQLCLIENT_UNABLE_TO_ESTABLISH
            | Self::SQLSERVER_REJECTED_CONNECTION => DbErrorKind::ConnectionRefused,
            Self::CONNECTION_EXCEPTION | Self::CONNECTION_DOES_NOT_EXIST | Self::CONNECTION_FAILURE => {
                DbErrorKind::ConnectionLost
            }
            Self::QUERY_CANCELED => DbErrorKind::Timeout,
            Self::SERIALIZATION_FAILURE => DbErrorKind::SerializationFailure,
            Self::DEADLOCK_DETECTED => DbErrorKind::Deadlock,
            Self::SYNTAX_ERROR => DbErrorKind::Syntax,
            code if Self::is_integrity_constraint_violation(code) => DbErrorKind::Constraint,
            _ => DbErrorKind::Other,
        }
    }
}

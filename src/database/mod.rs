//! # Database Access
//!
//! Resilient session acquisition over a pluggable connection pool.
//!
//! - [`manager`] - [`SessionResilienceManager`]: gate check, lease, commit or
//!   rollback, retry with exponential backoff
//! - [`session`] - the [`DatabaseSession`] trait and the [`SessionLease`] guard
//! - [`pool`] - the [`ConnectionPool`] trait, pool strategy selection and the
//!   sqlx PostgreSQL implementation
//! - [`statement`] - literal and comment aware statement classification
//!   and cache-key normalisation
//! - [`stats`] - lock-free session counters
//! - [`error_codes`] - classification of driver errors into retryable and
//!   fatal kinds

pub mod error_codes;
pub mod manager;
pub mod pool;
pub mod session;
pub mod statement;
pub mod stats;

pub use error_codes::DbErrorKind;
pub use manager::SessionResilienceManager;
pub use pool::{ConnectionPool, PgConnectionPool, PoolConfiguration, PoolStatus, PoolStrategy};
pub use session::{DatabaseSession, QueryResult, SessionLease, SessionPriority, SessionState};
pub use statement::StatementShape;
pub use stats::{SessionStats, SessionStatsSnapshot};

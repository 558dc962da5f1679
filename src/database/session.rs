//! # Database Sessions and Leases
//!
//! A [`DatabaseSession`] is one transactional handle checked out of a
//! [`ConnectionPool`](crate::database::pool::ConnectionPool). The session
//! manager wraps it in a [`SessionLease`], whose `Drop` releases the lease
//! from [`SessionStats`] on every exit path, including cancellation of the
//! surrounding future and panics inside the caller's operation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::database::stats::SessionStats;
use crate::error::DatabaseError;

/// Result rows (as JSON objects) and affected row count
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<serde_json::Value>,
    pub rows_affected: u64,
}

impl QueryResult {
    pub fn with_rows(rows: Vec<serde_json::Value>) -> Self {
        let rows_affected = rows.len() as u64;
        Self { rows, rows_affected }
    }
}

/// Scheduling hint carried with each session request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl SessionPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPriority::Low => "low",
            SessionPriority::Normal => "normal",
            SessionPriority::High => "high",
            SessionPriority::Critical => "critical",
        }
    }
}

impl fmt::Display for SessionPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Acquired,
    Committed,
    RolledBack,
    Closed,
}

/// A transactional handle bound to one pooled connection
#[async_trait]
pub trait DatabaseSession: Send {
    async fn execute(
        &mut self,
        query: &str,
        params: &[serde_json::Value],
    ) -> Result<QueryResult, DatabaseError>;

    async fn commit(&mut self) -> Result<(), DatabaseError>;

    async fn rollback(&mut self) -> Result<(), DatabaseError>;

    /// Return the underlying connection to its pool
    async fn close(&mut self);
}

/// A session checked out for exactly one attempt of one operation
pub struct SessionLease {
    id: Uuid,
    priority: SessionPriority,
    attempt: u32,
    state: SessionState,
    acquired_at: Instant,
    session: Box<dyn DatabaseSession>,
    stats: Arc<SessionStats>,
}

impl SessionLease {
    pub(crate) fn acquire(
        session: Box<dyn DatabaseSession>,
        priority: SessionPriority,
        attempt: u32,
        stats: Arc<SessionStats>,
    ) -> Self {
        stats.record_acquired();
        let lease = Self {
            id: Uuid::new_v4(),
            priority,
            attempt,
            state: SessionState::Acquired,
            acquired_at: Instant::now(),
            session,
            stats,
        };
        debug!(
            lease_id = %lease.id,
            priority = %priority,
            attempt = attempt,
            "💾 SESSION: Lease acquired"
        );
        lease
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn priority(&self) -> SessionPriority {
        self.priority
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    pub fn session(&mut self) -> &mut dyn DatabaseSession {
        self.session.as_mut()
    }

    pub(crate) async fn commit(&mut self) -> Result<(), DatabaseError> {
        self.session.commit().await?;
        self.state = SessionState::Committed;
        Ok(())
    }

    pub(crate) async fn rollback(&mut self) {
        match self.session.rollback().await {
            Ok(()) => self.state = SessionState::RolledBack,
            Err(error) => {
                // The connection is discarded on close either way
                warn!(lease_id = %self.id, error = %error, "Rollback failed");
            }
        }
    }

    pub(crate) async fn close(mut self) {
        self.session.close().await;
        self.state = SessionState::Closed;
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            warn!(
                lease_id = %self.id,
                state = ?self.state,
                "Session lease dropped without close - releasing"
            );
        }
        self.stats.record_released();
    }
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("attempt", &self.attempt)
            .field("state", &self.state)
            .finish()
    }
}

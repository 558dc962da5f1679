#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # DB Sentinel
//!
//! Database session resilience and in-process observability for a single
//! service process.
//!
//! ## Overview
//!
//! Two halves share one metric store:
//!
//! - **Session resilience**: every database operation runs inside a scoped,
//!   transactional lease guarded by a circuit breaker, with exponential
//!   backoff retries for connection-class failures.
//! - **Monitoring**: background loops sample database, host, process and
//!   resilience signals, score overall health, track per-metric trends, and
//!   raise, escalate and resolve threshold alerts.
//!
//! ## Module Organization
//!
//! - [`database`] - session manager, leases, pools and error classification
//! - [`resilience`] - circuit breakers, the resilience engine and query cache
//! - [`monitoring`] - metric store, trends, health, alerts and the scheduler
//! - [`config`] - typed configuration with YAML and environment layering
//! - [`core`] - wiring of all of the above
//! - [`error`] - structured error handling
//! - [`logging`] - structured logging setup and canonical log events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use db_sentinel::config::ConfigManager;
//! use db_sentinel::database::SessionPriority;
//! use db_sentinel::SentinelCore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! db_sentinel::logging::init_structured_logging();
//!
//! let config = ConfigManager::load()?.config().clone();
//! let core = SentinelCore::from_config(config)?;
//! core.start()?;
//!
//! let result = core
//!     .session_manager()
//!     .execute_query("SELECT id, status FROM jobs WHERE status = $1", vec!["queued".into()], SessionPriority::High)
//!     .await?;
//! println!("{} queued jobs", result.rows.len());
//!
//! let summary = core.monitor().get_health_summary();
//! println!("health: {}", summary.status);
//!
//! core.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod core;
pub mod database;
pub mod error;
pub mod logging;
pub mod monitoring;
pub mod resilience;

pub use crate::config::{ConfigManager, SentinelConfig};
pub use crate::core::SentinelCore;
pub use database::{QueryResult, SessionPriority, SessionResilienceManager, SessionStatsSnapshot};
pub use error::{DatabaseError, SentinelError, SentinelResult};
pub use monitoring::{Alert, AlertLevel, AlertRule, HealthStatus, HealthSummary, MetricKind, ResilienceMonitor};
pub use resilience::{CircuitBreakerManager, CircuitGate, DatabaseResilienceEngine, ResilienceEngine};

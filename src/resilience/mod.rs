//! # Resilience Module
//!
//! Fault isolation for database access. Circuit breakers keyed by endpoint
//! sit behind the [`CircuitGate`] seam; [`ResilienceEngine`] bundles the
//! gate with the connection pool and the query optimizer that the session
//! manager consumes.
//!
//! ## Usage
//!
//! ```rust
//! use db_sentinel::resilience::{CircuitBreaker, CircuitBreakerSettings, CircuitState};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new(
//!     "database",
//!     CircuitBreakerSettings {
//!         failure_threshold: 2,
//!         timeout: Duration::from_secs(30),
//!         success_threshold: 1,
//!     },
//! );
//!
//! if breaker.should_allow() {
//!     // run the transaction, then report how it went
//!     breaker.record_failure(None);
//! }
//! breaker.record_failure(None);
//! assert_eq!(breaker.state(), CircuitState::Open);
//! assert!(!breaker.should_allow());
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod engine;
pub mod gate;
pub mod manager;
pub mod metrics;
pub mod query_cache;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use self::config::CircuitBreakerSettings;
pub use engine::{DatabaseResilienceEngine, ResilienceEngine};
pub use gate::CircuitGate;
pub use manager::CircuitBreakerManager;
pub use metrics::CircuitBreakerMetrics;
pub use query_cache::{CachingQueryOptimizer, QueryOptimizer};

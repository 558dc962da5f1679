//! # Resilience Engine
//!
//! The bundle the session manager and the resilience collector talk to:
//! a circuit gate, the connection pool it guards, and an optional query
//! optimizer.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::SentinelConfig;
use crate::database::pool::{ConnectionPool, PgConnectionPool};
use crate::error::SentinelResult;
use crate::resilience::query_cache::{CachingQueryOptimizer, QueryOptimizer};
use crate::resilience::{CircuitBreakerManager, CircuitGate};

#[async_trait]
pub trait ResilienceEngine: Send + Sync {
    fn circuit_gate(&self) -> Arc<dyn CircuitGate>;

    fn connection_pool(&self) -> Arc<dyn ConnectionPool>;

    fn query_optimizer(&self) -> Option<Arc<dyn QueryOptimizer>> {
        None
    }

    /// Engine-reported health (0-100), `None` when it cannot tell
    async fn health_score(&self) -> Option<f64>;
}

/// Circuit breakers in front of a connection pool
pub struct DatabaseResilienceEngine {
    breakers: Arc<CircuitBreakerManager>,
    pool: Arc<dyn ConnectionPool>,
    optimizer: Option<Arc<CachingQueryOptimizer>>,
}

impl DatabaseResilienceEngine {
    pub fn new(
        breakers: Arc<CircuitBreakerManager>,
        pool: Arc<dyn ConnectionPool>,
        optimizer: Option<Arc<CachingQueryOptimizer>>,
    ) -> Self {
        Self {
            breakers,
            pool,
            optimizer,
        }
    }

    /// Engine over a lazily-connecting PostgreSQL pool
    pub fn from_config(config: &SentinelConfig) -> SentinelResult<Self> {
        let pool: Arc<dyn ConnectionPool> = Arc::new(PgConnectionPool::connect_lazy(&config.database)?);
        Ok(Self::with_pool(config, pool))
    }

    /// Engine over any pool, with breakers and cache built from configuration
    pub fn with_pool(config: &SentinelConfig, pool: Arc<dyn ConnectionPool>) -> Self {
        let breakers = Arc::new(CircuitBreakerManager::from_config(&config.circuit_breakers));
        let optimizer = config
            .query_cache
            .enabled
            .then(|| Arc::new(CachingQueryOptimizer::from_config(&config.query_cache)));
        Self::new(breakers, pool, optimizer)
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }
}

#[async_trait]
impl ResilienceEngine for DatabaseResilienceEngine {
    fn circuit_gate(&self) -> Arc<dyn CircuitGate> {
        self.breakers.clone()
    }

    fn connection_pool(&self) -> Arc<dyn ConnectionPool> {
        self.pool.clone()
    }

    fn query_optimizer(&self) -> Option<Arc<dyn QueryOptimizer>> {
        self.optimizer
            .clone()
            .map(|optimizer| optimizer as Arc<dyn QueryOptimizer>)
    }

    async fn health_score(&self) -> Option<f64> {
        Some(self.breakers.health_score().await)
    }
}

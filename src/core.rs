//! # Sentinel Core
//!
//! Wires one resilience engine, the session manager that leases through it,
//! and the monitor that watches both.

use std::sync::Arc;
use tracing::info;

use crate::config::SentinelConfig;
use crate::database::manager::SessionResilienceManager;
use crate::database::pool::{ConnectionPool, PgConnectionPool};
use crate::error::SentinelResult;
use crate::monitoring::monitor::ResilienceMonitor;
use crate::resilience::{DatabaseResilienceEngine, ResilienceEngine};

pub struct SentinelCore {
    config: SentinelConfig,
    engine: Arc<DatabaseResilienceEngine>,
    sessions: Arc<SessionResilienceManager>,
    monitor: Arc<ResilienceMonitor>,
}

impl SentinelCore {
    /// Validate configuration and build over a lazily-connecting PostgreSQL pool
    pub fn from_config(config: SentinelConfig) -> SentinelResult<Self> {
        let pool: Arc<dyn ConnectionPool> = Arc::new(PgConnectionPool::connect_lazy(&config.database)?);
        Self::with_pool(config, pool)
    }

    pub fn with_pool(config: SentinelConfig, pool: Arc<dyn ConnectionPool>) -> SentinelResult<Self> {
        config.validate()?;

        let engine = Arc::new(DatabaseResilienceEngine::with_pool(&config, pool.clone()));
        let monitor = Arc::new(ResilienceMonitor::from_config(&config));
        let sessions = Arc::new(
            SessionResilienceManager::new(config.session.clone())
                .with_engine(engine.clone())
                .with_metric_store(monitor.store()),
        );

        let engine_handle: Arc<dyn ResilienceEngine> = engine.clone();
        monitor.register_default_collectors(sessions.stats(), Some(pool), Some(engine_handle));

        info!(
            endpoint = %config.session.endpoint,
            alert_rules = config.effective_alert_rules().len(),
            "✅ CORE: Sentinel core assembled"
        );

        Ok(Self {
            config,
            engine,
            sessions,
            monitor,
        })
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<DatabaseResilienceEngine> {
        &self.engine
    }

    pub fn session_manager(&self) -> &Arc<SessionResilienceManager> {
        &self.sessions
    }

    pub fn monitor(&self) -> &Arc<ResilienceMonitor> {
        &self.monitor
    }

    /// Start the monitor's background loops
    pub fn start(&self) -> SentinelResult<()> {
        self.monitor.start()
    }

    /// Stop monitoring, reset session statistics and close the pool
    pub async fn stop(&self) {
        self.monitor.stop().await;
        self.sessions.cleanup().await;
        self.engine.connection_pool().close().await;
        info!("🛑 CORE: Sentinel core stopped");
    }
}

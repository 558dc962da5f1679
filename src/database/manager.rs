//! # Session Resilience Manager
//!
//! Scoped database access guarded by the resilience engine. Every attempt
//! runs the same cycle:
//!
//! 1. ask the circuit gate; a refusal fails fast without touching the pool
//! 2. lease a session from the engine's pool (or the local fallback pool)
//! 3. run the caller's operation, then commit
//! 4. on failure roll back and report it to the gate
//! 5. close the lease
//!
//! Retryable (connection-class) failures back off `base * 2^attempt` and
//! rerun the whole cycle while attempts remain. Fatal failures return
//! immediately.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::constants::database;
use crate::database::pool::ConnectionPool;
use crate::database::session::{DatabaseSession, QueryResult, SessionLease, SessionPriority};
use crate::database::stats::{SessionStats, SessionStatsSnapshot};
use crate::error::{SentinelError, SentinelResult};
use crate::logging::log_session_operation;
use crate::monitoring::metrics::{MetricKind, MetricStore};
use crate::resilience::{CircuitGate, ResilienceEngine};

pub struct SessionResilienceManager {
    config: SessionConfig,
    engine: Option<Arc<dyn ResilienceEngine>>,
    fallback_pool: Option<Arc<dyn ConnectionPool>>,
    stats: Arc<SessionStats>,
    metric_store: Option<Arc<MetricStore>>,
}

impl SessionResilienceManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            engine: None,
            fallback_pool: None,
            stats: Arc::new(SessionStats::new()),
            metric_store: None,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn ResilienceEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Pool used when no resilience engine is attached
    pub fn with_fallback_pool(mut self, pool: Arc<dyn ConnectionPool>) -> Self {
        self.fallback_pool = Some(pool);
        self
    }

    /// Store that receives a duration timer for every attempt
    pub fn with_metric_store(mut self, store: Arc<MetricStore>) -> Self {
        self.metric_store = Some(store);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        self.stats.clone()
    }

    pub fn get_session_stats(&self) -> SessionStatsSnapshot {
        self.stats.snapshot()
    }

    /// The pool the next attempt would lease from
    pub fn connection_pool(&self) -> Option<Arc<dyn ConnectionPool>> {
        self.engine
            .as_ref()
            .map(|engine| engine.connection_pool())
            .or_else(|| self.fallback_pool.clone())
    }

    /// Run `operation` inside a leased, transactional session.
    ///
    /// The operation may run more than once: each retry gets a fresh
    /// session. Up to `max_retries` attempts are made (at least one).
    ///
    /// ```rust,ignore
    /// let count = manager
    ///     .get_session(SessionPriority::High, 3, |session| {
    ///         Box::pin(async move {
    ///             let result = session.execute("SELECT count(*) AS n FROM jobs", &[]).await?;
    ///             Ok(result.rows.len())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn get_session<T, F>(
        &self,
        priority: SessionPriority,
        max_retries: u32,
        mut operation: F,
    ) -> SentinelResult<T>
    where
        F: for<'s> FnMut(&'s mut dyn DatabaseSession) -> BoxFuture<'s, SentinelResult<T>> + Send,
        T: Send,
    {
        let attempts = max_retries.max(1);
        let mut attempt = 0u32;

        loop {
            let error = match self.attempt_once(priority, attempt, &mut operation).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_retryable() {
                debug!(error = %error, attempt = attempt, "Non-retryable session failure");
                return Err(error);
            }

            let delay = self.backoff_for(attempt);
            warn!(
                error = %error,
                attempt = attempt,
                attempts = attempts,
                backoff_ms = delay.as_millis() as u64,
                "🔄 SESSION: Retryable failure - backing off"
            );
            tokio::time::sleep(delay).await;

            attempt += 1;
            if attempt >= attempts {
                warn!(attempts = attempts, error = %error, "❌ SESSION: Retries exhausted");
                return Err(error);
            }
            self.stats.record_retry();
        }
    }

    async fn attempt_once<T, F>(
        &self,
        priority: SessionPriority,
        attempt: u32,
        operation: &mut F,
    ) -> SentinelResult<T>
    where
        F: for<'s> FnMut(&'s mut dyn DatabaseSession) -> BoxFuture<'s, SentinelResult<T>> + Send,
        T: Send,
    {
        let endpoint = self.config.endpoint.as_str();
        let gate = self.engine.as_ref().map(|engine| engine.circuit_gate());

        if let Some(gate) = &gate {
            if !gate.should_allow(endpoint).await {
                self.stats.record_rejected();
                log_session_operation(
                    "get_session",
                    priority.as_str(),
                    attempt,
                    "rejected",
                    None,
                    Some("circuit open"),
                );
                return Err(SentinelError::DatabaseUnavailable {
                    endpoint: endpoint.to_string(),
                });
            }
        }

        let pool = self.connection_pool().ok_or_else(|| {
            SentinelError::Configuration("no resilience engine or fallback connection pool configured".to_string())
        })?;

        let started = Instant::now();
        let session = match pool.get_connection(priority).await {
            Ok(session) => session,
            Err(error) => {
                let error = SentinelError::from(error);
                self.record_failure(gate.as_deref(), endpoint, &error).await;
                self.finish(priority, attempt, "acquire_failed", started, Some(&error));
                return Err(error);
            }
        };

        let mut lease = SessionLease::acquire(session, priority, attempt, self.stats.clone());
        let outcome = match operation(lease.session()).await {
            Ok(value) => lease.commit().await.map(|()| value).map_err(SentinelError::from),
            Err(error) => Err(error),
        };

        let result = match outcome {
            Ok(value) => {
                if let Some(gate) = &gate {
                    gate.record_success(endpoint).await;
                }
                Ok(value)
            }
            Err(error) => {
                lease.rollback().await;
                self.record_failure(gate.as_deref(), endpoint, &error).await;
                Err(error)
            }
        };

        lease.close().await;

        match &result {
            Ok(_) => self.finish(priority, attempt, "committed", started, None),
            Err(error) => self.finish(priority, attempt, "rolled_back", started, Some(error)),
        }
        result
    }

    async fn record_failure(&self, gate: Option<&dyn CircuitGate>, endpoint: &str, error: &SentinelError) {
        self.stats.record_failure();
        if let Some(gate) = gate {
            gate.record_failure(endpoint, error).await;
        }
    }

    fn finish(
        &self,
        priority: SessionPriority,
        attempt: u32,
        outcome: &str,
        started: Instant,
        error: Option<&SentinelError>,
    ) {
        let elapsed = started.elapsed();
        if let Some(store) = &self.metric_store {
            let tags = HashMap::from([
                ("priority".to_string(), priority.as_str().to_string()),
                ("outcome".to_string(), outcome.to_string()),
            ]);
            store.record(
                database::SESSION_DURATION_MS,
                elapsed.as_secs_f64() * 1000.0,
                MetricKind::Timer,
                tags,
            );
        }

        let details = error.map(|error| error.to_string());
        log_session_operation(
            "get_session",
            priority.as_str(),
            attempt,
            outcome,
            Some(elapsed.as_millis() as u64),
            details.as_deref(),
        );
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.config
            .backoff_base()
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run one statement under the session contract, consulting the
    /// engine's query optimizer for cached reads. The statement is sent
    /// exactly as given.
    pub async fn execute_query(
        &self,
        query: &str,
        params: Vec<Value>,
        priority: SessionPriority,
    ) -> SentinelResult<QueryResult> {
        let optimizer = self.engine.as_ref().and_then(|engine| engine.query_optimizer());

        if let Some(optimizer) = &optimizer {
            if let Some(cached) = optimizer.cached(query, &params) {
                self.stats.record_cache_hit();
                debug!(priority = %priority, "💾 SESSION: Query answered from cache");
                return Ok(cached);
            }
        }

        let statement = query.to_string();

        let result = self
            .get_session(priority, self.config.max_retries, |session| {
                let statement = statement.clone();
                let params = params.clone();
                Box::pin(async move {
                    session
                        .execute(&statement, &params)
                        .await
                        .map_err(SentinelError::from)
                })
            })
            .await?;

        if let Some(optimizer) = &optimizer {
            optimizer.store(query, &params, &result);
        }
        Ok(result)
    }

    /// Reset statistics and close the local fallback pool
    pub async fn cleanup(&self) {
        self.stats.reset();
        if let Some(pool) = &self.fallback_pool {
            pool.close().await;
        }
        info!("🧹 SESSION: Session manager cleaned up");
    }
}

impl std::fmt::Debug for SessionResilienceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResilienceManager")
            .field("config", &self.config)
            .field("has_engine", &self.engine.is_some())
            .field("has_fallback_pool", &self.fallback_pool.is_some())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

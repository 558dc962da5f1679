//! In-memory collaborators for integration tests. No test needs a live database.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use db_sentinel::database::{ConnectionPool, DatabaseSession, DbErrorKind, QueryResult, SessionPriority};
use db_sentinel::error::{DatabaseError, SentinelError};
use db_sentinel::resilience::{CircuitGate, QueryOptimizer, ResilienceEngine};

/// What every session handed out by a [`FakePool`] did
#[derive(Debug, Default)]
pub struct SessionLog {
    pub executed: Vec<String>,
    pub commits: usize,
    pub rollbacks: usize,
    pub closes: usize,
}

pub struct FakeSession {
    log: Arc<Mutex<SessionLog>>,
    fail_with: Option<DbErrorKind>,
    rows: Vec<Value>,
}

#[async_trait]
impl DatabaseSession for FakeSession {
    async fn execute(&mut self, query: &str, _params: &[Value]) -> Result<QueryResult, DatabaseError> {
        self.log.lock().executed.push(query.to_string());
        match self.fail_with {
            Some(kind) => Err(DatabaseError::new(kind, format!("injected {kind}"))),
            None => Ok(QueryResult::with_rows(self.rows.clone())),
        }
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        self.log.lock().commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.log.lock().rollbacks += 1;
        Ok(())
    }

    async fn close(&mut self) {
        self.log.lock().closes += 1;
    }
}

/// Pool whose sessions fail with a scripted sequence of error kinds, then succeed
pub struct FakePool {
    pub log: Arc<Mutex<SessionLog>>,
    script: Mutex<VecDeque<DbErrorKind>>,
    always_fail: Option<DbErrorKind>,
    rows: Vec<Value>,
    pub connections: AtomicUsize,
    pub closed: AtomicBool,
}

impl FakePool {
    pub fn healthy() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(failures: Vec<DbErrorKind>) -> Self {
        Self {
            log: Arc::new(Mutex::new(SessionLog::default())),
            script: Mutex::new(failures.into()),
            always_fail: None,
            rows: vec![serde_json::json!({ "id": 1, "status": "queued" })],
            connections: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn always_failing(kind: DbErrorKind) -> Self {
        Self {
            always_fail: Some(kind),
            ..Self::healthy()
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionPool for FakePool {
    async fn get_connection(&self, _priority: SessionPriority) -> Result<Box<dyn DatabaseSession>, DatabaseError> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        let fail_with = self.always_fail.or_else(|| self.script.lock().pop_front());
        Ok(Box::new(FakeSession {
            log: self.log.clone(),
            fail_with,
            rows: self.rows.clone(),
        }))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Gate with a manual switch that counts what it was told
#[derive(Default)]
pub struct SwitchGate {
    pub open: AtomicBool,
    pub checks: AtomicUsize,
    pub successes: AtomicUsize,
    pub failures: AtomicUsize,
}

impl SwitchGate {
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn tripped() -> Self {
        let gate = Self::default();
        gate.open.store(true, Ordering::SeqCst);
        gate
    }
}

#[async_trait]
impl CircuitGate for SwitchGate {
    async fn should_allow(&self, _endpoint: &str) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        !self.open.load(Ordering::SeqCst)
    }

    async fn record_success(&self, _endpoint: &str) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    async fn record_failure(&self, _endpoint: &str, _error: &SentinelError) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }
}

/// Engine assembled from fakes
pub struct FakeEngine {
    pub gate: Arc<SwitchGate>,
    pub pool: Arc<FakePool>,
    pub optimizer: Option<Arc<dyn QueryOptimizer>>,
    pub health: Option<f64>,
}

impl FakeEngine {
    pub fn new(gate: Arc<SwitchGate>, pool: Arc<FakePool>) -> Self {
        Self {
            gate,
            pool,
            optimizer: None,
            health: Some(100.0),
        }
    }

    pub fn with_optimizer(mut self, optimizer: Arc<dyn QueryOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }
}

#[async_trait]
impl ResilienceEngine for FakeEngine {
    fn circuit_gate(&self) -> Arc<dyn CircuitGate> {
        self.gate.clone()
    }

    fn connection_pool(&self) -> Arc<dyn ConnectionPool> {
        self.pool.clone()
    }

    fn query_optimizer(&self) -> Option<Arc<dyn QueryOptimizer>> {
        self.optimizer.clone()
    }

    async fn health_score(&self) -> Option<f64> {
        self.health
    }
}

//! # Metric Collectors
//!
//! Sources sampled on every collection tick. Each collector is independent:
//! the scheduler logs and skips a collector that fails without aborting the
//! rest of the tick.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::{Disks, Networks, System};

use crate::constants::{application, database, resilience, system};
use crate::database::pool::ConnectionPool;
use crate::database::stats::SessionStats;
use crate::error::{SentinelError, SentinelResult};
use crate::monitoring::metrics::CollectedMetric;
use crate::resilience::ResilienceEngine;

#[async_trait]
pub trait MetricCollector: Send + Sync {
    fn name(&self) -> &str;

    async fn collect(&self) -> SentinelResult<Vec<CollectedMetric>>;
}

/// Session counters and pool occupancy
pub struct DatabaseCollector {
    stats: Arc<SessionStats>,
    pool: Option<Arc<dyn ConnectionPool>>,
}

impl DatabaseCollector {
    pub fn new(stats: Arc<SessionStats>, pool: Option<Arc<dyn ConnectionPool>>) -> Self {
        Self { stats, pool }
    }
}

#[async_trait]
impl MetricCollector for DatabaseCollector {
    fn name(&self) -> &str {
        "database"
    }

    async fn collect(&self) -> SentinelResult<Vec<CollectedMetric>> {
        let snapshot = self.stats.snapshot();
        let mut metrics = vec![
            CollectedMetric::gauge(database::ACTIVE_SESSIONS, snapshot.active as f64),
            CollectedMetric::counter(database::TOTAL_SESSIONS, snapshot.total as f64),
            CollectedMetric::counter(database::FAILED_SESSIONS, snapshot.failed as f64),
            CollectedMetric::counter(database::RETRIED_SESSIONS, snapshot.retried as f64),
            CollectedMetric::counter(database::REJECTED_SESSIONS, snapshot.rejected as f64),
            CollectedMetric::counter(database::CACHE_HITS, snapshot.cache_hits as f64),
        ];
        if let Some(rate) = snapshot.cache_hit_rate() {
            metrics.push(CollectedMetric::gauge(database::CACHE_HIT_RATE, rate));
        }

        if let Some(status) = self.pool.as_ref().and_then(|pool| pool.status()) {
            metrics.push(CollectedMetric::gauge(database::POOL_SIZE, status.size as f64).with_tag("strategy", status.strategy));
            metrics.push(CollectedMetric::gauge(database::POOL_IDLE, status.idle as f64).with_tag("strategy", status.strategy));
        }

        Ok(metrics)
    }
}

/// Host CPU, memory, disk and network
pub struct SystemCollector {
    system: Arc<Mutex<System>>,
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime CPU counters so the first tick has a baseline
        system.refresh_cpu();
        Self {
            system: Arc::new(Mutex::new(system)),
        }
    }

    fn sample(system: &mut System) -> Vec<CollectedMetric> {
        system.refresh_cpu();
        system.refresh_memory();

        let mut metrics = vec![CollectedMetric::gauge(
            system::CPU_USAGE,
            system.global_cpu_info().cpu_usage() as f64,
        )];

        if system.total_memory() > 0 {
            let memory_percent = system.used_memory() as f64 / system.total_memory() as f64 * 100.0;
            metrics.push(CollectedMetric::gauge(system::MEMORY_USAGE, memory_percent));
        }

        let disks = Disks::new_with_refreshed_list();
        let (total, available) = disks.list().iter().fold((0u64, 0u64), |(total, available), disk| {
            (total + disk.total_space(), available + disk.available_space())
        });
        if total > 0 {
            let disk_percent = total.saturating_sub(available) as f64 / total as f64 * 100.0;
            metrics.push(CollectedMetric::gauge(system::DISK_USAGE, disk_percent));
        }

        let networks = Networks::new_with_refreshed_list();
        let (received, transmitted) = networks.iter().fold((0u64, 0u64), |(rx, tx), (_, data)| {
            (rx + data.total_received(), tx + data.total_transmitted())
        });
        metrics.push(CollectedMetric::counter(system::NETWORK_BYTES_RECEIVED, received as f64));
        metrics.push(CollectedMetric::counter(system::NETWORK_BYTES_SENT, transmitted as f64));

        metrics
    }
}

#[async_trait]
impl MetricCollector for SystemCollector {
    fn name(&self) -> &str {
        "system"
    }

    async fn collect(&self) -> SentinelResult<Vec<CollectedMetric>> {
        let system = self.system.clone();
        tokio::task::spawn_blocking(move || Self::sample(&mut system.lock()))
            .await
            .map_err(|error| SentinelError::collector("system", error.to_string()))
    }
}

/// The current process: threads, CPU and resident memory
pub struct ApplicationCollector {
    system: Arc<Mutex<System>>,
}

impl Default for ApplicationCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationCollector {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    fn sample(system: &mut System) -> SentinelResult<Vec<CollectedMetric>> {
        let pid = sysinfo::get_current_pid().map_err(|error| SentinelError::collector("application", error))?;
        if !system.refresh_process(pid) {
            return Err(SentinelError::collector("application", format!("process {pid} not found")));
        }
        let process = system
            .process(pid)
            .ok_or_else(|| SentinelError::collector("application", format!("process {pid} not found")))?;

        let mut metrics = vec![
            CollectedMetric::gauge(application::CPU_USAGE, process.cpu_usage() as f64),
            CollectedMetric::gauge(application::MEMORY_BYTES, process.memory() as f64),
        ];
        if let Some(tasks) = process.tasks() {
            // The main thread is not listed among the tasks
            metrics.push(CollectedMetric::gauge(application::THREAD_COUNT, (tasks.len() + 1) as f64));
        }
        Ok(metrics)
    }
}

#[async_trait]
impl MetricCollector for ApplicationCollector {
    fn name(&self) -> &str {
        "application"
    }

    async fn collect(&self) -> SentinelResult<Vec<CollectedMetric>> {
        let system = self.system.clone();
        tokio::task::spawn_blocking(move || Self::sample(&mut system.lock()))
            .await
            .map_err(|error| SentinelError::collector("application", error.to_string()))?
    }
}

/// Health reported by the resilience engine
pub struct ResilienceCollector {
    engine: Arc<dyn ResilienceEngine>,
}

impl ResilienceCollector {
    pub fn new(engine: Arc<dyn ResilienceEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl MetricCollector for ResilienceCollector {
    fn name(&self) -> &str {
        "resilience"
    }

    async fn collect(&self) -> SentinelResult<Vec<CollectedMetric>> {
        Ok(self
            .engine
            .health_score()
            .await
            .map(|score| vec![CollectedMetric::gauge(resilience::HEALTH_SCORE, score)])
            .unwrap_or_default())
    }
}

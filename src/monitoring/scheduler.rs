//! # Monitor Scheduler
//!
//! Two independent background loops drive the monitoring pipeline:
//!
//! - **collection** (default 10s): collectors → store, health scoring,
//!   trend updates, retention pruning
//! - **alerting** (default 5s): rule evaluation, escalation, callback dispatch
//!
//! A tick that fails or panics is logged and the loop backs off (30s / 10s)
//! before the next attempt; one loop failing never halts the other. `stop()`
//! signals both loops over a broadcast channel and joins them under a
//! timeout, aborting a loop that does not exit in time.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MonitoringConfig;
use crate::constants::health;
use crate::error::{SentinelError, SentinelResult};
use crate::logging::{log_collector_failure, log_error};
use crate::monitoring::alerts::{AlertCycleReport, AlertEngine};
use crate::monitoring::collectors::MetricCollector;
use crate::monitoring::health::{HealthScorer, HealthSnapshot};
use crate::monitoring::metrics::MetricStore;
use crate::monitoring::trends::TrendAnalyzer;

/// What one collection tick did
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionReport {
    pub collected: usize,
    pub failed_collectors: Vec<String>,
    pub snapshot: HealthSnapshot,
    pub trend_points: usize,
    pub pruned: usize,
}

/// The components both loops operate on
pub struct MonitoringPipeline {
    pub store: Arc<MetricStore>,
    pub trends: Arc<TrendAnalyzer>,
    pub health: Arc<HealthScorer>,
    pub alerts: Arc<AlertEngine>,
    collectors: RwLock<Vec<Arc<dyn MetricCollector>>>,
    last_collection: RwLock<Option<DateTime<Utc>>>,
    last_alerting: RwLock<Option<DateTime<Utc>>>,
}

impl MonitoringPipeline {
    pub fn new(
        store: Arc<MetricStore>,
        trends: Arc<TrendAnalyzer>,
        health: Arc<HealthScorer>,
        alerts: Arc<AlertEngine>,
    ) -> Self {
        Self {
            store,
            trends,
            health,
            alerts,
            collectors: RwLock::new(Vec::new()),
            last_collection: RwLock::new(None),
            last_alerting: RwLock::new(None),
        }
    }

    pub fn register_collector(&self, collector: Arc<dyn MetricCollector>) {
        debug!(collector = collector.name(), "Registering metric collector");
        self.collectors.write().push(collector);
    }

    pub fn collector_names(&self) -> Vec<String> {
        self.collectors
            .read()
            .iter()
            .map(|collector| collector.name().to_string())
            .collect()
    }

    pub fn last_collection(&self) -> Option<DateTime<Utc>> {
        *self.last_collection.read()
    }

    pub fn last_alerting(&self) -> Option<DateTime<Utc>> {
        *self.last_alerting.read()
    }

    /// Collect, score health, update trends, then prune expired points
    pub async fn collection_tick(&self) -> CollectionReport {
        let collectors: Vec<Arc<dyn MetricCollector>> = self.collectors.read().clone();
        let mut collected = 0;
        let mut failed_collectors = Vec::new();

        for collector in collectors {
            match collector.collect().await {
                Ok(metrics) => {
                    collected += metrics.len();
                    for metric in metrics {
                        self.store.record_collected(metric);
                    }
                }
                Err(error) => {
                    log_collector_failure(collector.name(), &error.to_string());
                    failed_collectors.push(collector.name().to_string());
                }
            }
        }

        let now = Utc::now();
        let snapshot = self.health.compute(&self.store.current_values(), now);
        self.record_health(&snapshot);

        let trend_points = self.trends.ingest_from(&self.store);
        let pruned = self.store.prune_expired();
        *self.last_collection.write() = Some(now);

        debug!(
            collected = collected,
            failed = failed_collectors.len(),
            overall_health = snapshot.overall,
            trend_points = trend_points,
            pruned = pruned,
            "📊 MONITOR: Collection tick complete"
        );

        CollectionReport {
            collected,
            failed_collectors,
            snapshot,
            trend_points,
            pruned,
        }
    }

    fn record_health(&self, snapshot: &HealthSnapshot) {
        let components = &snapshot.components;
        self.store.record_gauge(health::OVERALL_SCORE, snapshot.overall);
        self.store.record_gauge(health::DATABASE_SCORE, components.database);
        self.store.record_gauge(health::SYSTEM_SCORE, components.system);
        self.store.record_gauge(health::APPLICATION_SCORE, components.application);
        self.store.record_gauge(health::RESILIENCE_SCORE, components.resilience);
    }

    /// Evaluate rules, escalate and dispatch
    pub fn alerting_tick(&self) -> AlertCycleReport {
        let report = self.alerts.run_cycle(&self.store);
        *self.last_alerting.write() = Some(Utc::now());
        if !report.triggered.is_empty() || !report.resolved.is_empty() || !report.escalated.is_empty() {
            info!(
                triggered = report.triggered.len(),
                resolved = report.resolved.len(),
                escalated = report.escalated.len(),
                rule_errors = report.rule_errors,
                "🚨 MONITOR: Alert state changed"
            );
        }
        report
    }
}

/// Timing for one background loop
#[derive(Debug, Clone, Copy)]
struct LoopTiming {
    interval: Duration,
    error_backoff: Duration,
}

pub struct MonitorScheduler {
    pipeline: Arc<MonitoringPipeline>,
    collection: LoopTiming,
    alerting: LoopTiming,
    stop_timeout: Duration,
    shutdown: broadcast::Sender<()>,
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    running: AtomicBool,
}

impl MonitorScheduler {
    pub fn new(pipeline: Arc<MonitoringPipeline>, config: &MonitoringConfig) -> Self {
        let (shutdown, _) = broadcast::channel(4);
        Self {
            pipeline,
            collection: LoopTiming {
                interval: config.collection_interval(),
                error_backoff: Duration::from_secs(config.collection_error_backoff_seconds),
            },
            alerting: LoopTiming {
                interval: config.alerting_interval(),
                error_backoff: Duration::from_secs(config.alerting_error_backoff_seconds),
            },
            stop_timeout: Duration::from_secs(config.stop_timeout_seconds),
            shutdown,
            handles: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn both loops on the current tokio runtime
    pub fn start(&self) -> SentinelResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|error| SentinelError::Monitor(format!("no tokio runtime available: {error}")))?;

        if self.running.swap(true, Ordering::AcqRel) {
            return Err(SentinelError::Monitor("monitor scheduler is already running".to_string()));
        }

        info!(
            collection_interval_seconds = self.collection.interval.as_secs(),
            alerting_interval_seconds = self.alerting.interval.as_secs(),
            "🔄 MONITOR: Starting background loops"
        );

        let collection_pipeline = self.pipeline.clone();
        let collection = runtime.spawn(run_loop(
            "collection",
            self.collection,
            self.shutdown.subscribe(),
            move || {
                let pipeline = collection_pipeline.clone();
                async move {
                    pipeline.collection_tick().await;
                    Ok(())
                }
            },
        ));

        let alerting_pipeline = self.pipeline.clone();
        let alerting = runtime.spawn(run_loop(
            "alerting",
            self.alerting,
            self.shutdown.subscribe(),
            move || {
                let pipeline = alerting_pipeline.clone();
                async move {
                    pipeline.alerting_tick();
                    Ok(())
                }
            },
        ));

        let mut handles = self.handles.lock();
        handles.push(("collection", collection));
        handles.push(("alerting", alerting));

        info!("✅ MONITOR: Background loops started");
        Ok(())
    }

    /// Signal both loops and wait for them, aborting any that overrun the timeout
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            debug!("MONITOR: Already stopped");
            return;
        }

        info!("🛑 MONITOR: Stopping background loops");
        // No receivers only means the loops have already exited
        let _ = self.shutdown.send(());

        let handles = std::mem::take(&mut *self.handles.lock());
        for (name, mut handle) in handles {
            match tokio::time::timeout(self.stop_timeout, &mut handle).await {
                Ok(Ok(())) => debug!(loop_name = name, "Loop joined"),
                Ok(Err(error)) => warn!(loop_name = name, error = %error, "Loop task ended abnormally"),
                Err(_) => {
                    warn!(
                        loop_name = name,
                        timeout_seconds = self.stop_timeout.as_secs(),
                        "Loop did not stop in time - aborting"
                    );
                    handle.abort();
                }
            }
        }

        info!("✅ MONITOR: Background loops stopped");
    }
}

async fn run_loop<F, Fut>(
    name: &'static str,
    timing: LoopTiming,
    mut shutdown: broadcast::Receiver<()>,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = SentinelResult<()>>,
{
    debug!(loop_name = name, "Monitoring loop started");
    loop {
        let delay = match AssertUnwindSafe(tick()).catch_unwind().await {
            Ok(Ok(())) => timing.interval,
            Ok(Err(error)) => {
                log_error("monitor_scheduler", name, &error.to_string(), None);
                timing.error_backoff
            }
            Err(_) => {
                error!(loop_name = name, "❌ MONITOR: Tick panicked");
                timing.error_backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.recv() => {
                info!(loop_name = name, "Monitoring loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::alerts::{AlertLevel, AlertRule, Comparison};
    use crate::monitoring::metrics::CollectedMetric;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct FixedCollector {
        metric: &'static str,
        value: f64,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MetricCollector for FixedCollector {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn collect(&self) -> SentinelResult<Vec<CollectedMetric>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![CollectedMetric::gauge(self.metric, self.value)])
        }
    }

    struct FailingCollector;

    #[async_trait]
    impl MetricCollector for FailingCollector {
        fn name(&self) -> &str {
            "failing"
        }

        async fn collect(&self) -> SentinelResult<Vec<CollectedMetric>> {
            Err(SentinelError::collector("failing", "source unavailable"))
        }
    }

    fn pipeline(rules: Vec<AlertRule>) -> Arc<MonitoringPipeline> {
        Arc::new(MonitoringPipeline::new(
            Arc::new(MetricStore::default()),
            Arc::new(TrendAnalyzer::default()),
            Arc::new(HealthScorer::default()),
            Arc::new(AlertEngine::new(rules)),
        ))
    }

    #[tokio::test]
    async fn test_failing_collector_is_skipped() {
        let pipeline = pipeline(Vec::new());
        let calls = Arc::new(AtomicUsize::new(0));
        pipeline.register_collector(Arc::new(FailingCollector));
        pipeline.register_collector(Arc::new(FixedCollector {
            metric: "system_cpu_usage",
            value: 42.0,
            calls: calls.clone(),
        }));

        let report = pipeline.collection_tick().await;

        assert_eq!(report.failed_collectors, vec!["failing".to_string()]);
        assert_eq!(report.collected, 1);
        assert_eq!(pipeline.store.current("system_cpu_usage"), Some(42.0));
        assert_eq!(pipeline.store.current(health::OVERALL_SCORE), Some(report.snapshot.overall));
        assert!(pipeline.last_collection().is_some());
    }

    #[tokio::test]
    async fn test_alerting_tick_uses_store() {
        let rule = AlertRule::new("disk_space_low", "system_disk_usage", 90.0, Comparison::Gt, 0, AlertLevel::Warning);
        let pipeline = pipeline(vec![rule]);
        pipeline.store.record_gauge("system_disk_usage", 99.0);

        let report = pipeline.alerting_tick();
        assert_eq!(report.triggered.len(), 1);
        assert!(pipeline.last_alerting().is_some());
    }

    #[tokio::test]
    async fn test_scheduler_start_and_stop() {
        let pipeline = pipeline(Vec::new());
        let calls = Arc::new(AtomicUsize::new(0));
        pipeline.register_collector(Arc::new(FixedCollector {
            metric: "application_thread_count",
            value: 12.0,
            calls: calls.clone(),
        }));

        let config = MonitoringConfig {
            monitoring_interval_seconds: 3600,
            alerting_interval_seconds: 3600,
            ..Default::default()
        };
        let scheduler = MonitorScheduler::new(pipeline.clone(), &config);

        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        assert!(scheduler.start().is_err());

        // The first collection tick runs immediately
        for _ in 0..50 {
            if calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stopped = tokio::time::timeout(Duration::from_secs(2), scheduler.stop()).await;
        assert!(stopped.is_ok());
        assert!(!scheduler.is_running());

        // Stopping twice is a no-op
        scheduler.stop().await;
    }

    #[test]
    fn test_start_requires_runtime() {
        let scheduler = MonitorScheduler::new(pipeline(Vec::new()), &MonitoringConfig::default());
        assert!(matches!(scheduler.start(), Err(SentinelError::Monitor(_))));
        assert!(!scheduler.is_running());
    }
}

//! # Resilience Monitor
//!
//! Public facade over the monitoring pipeline: metric recording and
//! queries, health summaries, trends, alert callbacks and acknowledgement,
//! and the lifecycle of the background scheduler.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::{MonitoringConfig, SentinelConfig};
use crate::constants::{defaults, health};
use crate::database::pool::ConnectionPool;
use crate::database::stats::SessionStats;
use crate::error::SentinelResult;
use crate::monitoring::alerts::{Alert, AlertCycleReport, AlertEngine, AlertRule};
use crate::monitoring::collectors::{
    ApplicationCollector, DatabaseCollector, MetricCollector, ResilienceCollector, SystemCollector,
};
use crate::monitoring::health::{ComponentScores, HealthScorer, HealthSnapshot, HealthStatus};
use crate::monitoring::metrics::{MetricKind, MetricPoint, MetricStore};
use crate::monitoring::scheduler::{CollectionReport, MonitorScheduler, MonitoringPipeline};
use crate::monitoring::trends::{TrendAnalyzer, TrendDirection, TrendState};
use crate::resilience::ResilienceEngine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub status: HealthStatus,
    pub current: Option<HealthSnapshot>,
    /// Component means over the most recent snapshots
    pub average: Option<ComponentScores>,
    pub average_overall: Option<f64>,
    pub trend: TrendDirection,
    pub active_alerts: usize,
    pub critical_alerts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub uptime_seconds: Option<u64>,
    pub tracked_metrics: usize,
    pub stored_points: usize,
    pub trend_metrics: usize,
    pub health_snapshots: usize,
    pub alert_rules: usize,
    pub active_alerts: usize,
    pub total_alerts: usize,
    pub alert_callbacks: usize,
    pub collectors: Vec<String>,
    pub monitoring_interval_seconds: u64,
    pub alerting_interval_seconds: u64,
    pub last_collection: Option<DateTime<Utc>>,
    pub last_alerting: Option<DateTime<Utc>>,
}

pub struct ResilienceMonitor {
    config: MonitoringConfig,
    pipeline: Arc<MonitoringPipeline>,
    scheduler: MonitorScheduler,
    started_at: RwLock<Option<Instant>>,
}

impl ResilienceMonitor {
    pub fn new(config: MonitoringConfig, rules: Vec<AlertRule>) -> Self {
        let pipeline = Arc::new(MonitoringPipeline::new(
            Arc::new(MetricStore::from_config(&config)),
            Arc::new(TrendAnalyzer::new(config.trend_window)),
            Arc::new(HealthScorer::new(config.health_history_size)),
            Arc::new(AlertEngine::with_escalation(
                rules,
                Duration::from_secs(config.escalation_after_seconds),
            )),
        ));
        let scheduler = MonitorScheduler::new(pipeline.clone(), &config);

        Self {
            config,
            pipeline,
            scheduler,
            started_at: RwLock::new(None),
        }
    }

    pub fn from_config(config: &SentinelConfig) -> Self {
        Self::new(config.monitoring.clone(), config.effective_alert_rules())
    }

    pub fn store(&self) -> Arc<MetricStore> {
        self.pipeline.store.clone()
    }

    pub fn alert_engine(&self) -> Arc<AlertEngine> {
        self.pipeline.alerts.clone()
    }

    pub fn register_collector(&self, collector: Arc<dyn MetricCollector>) {
        self.pipeline.register_collector(collector);
    }

    /// Database, resilience and (when enabled) host and process collectors
    pub fn register_default_collectors(
        &self,
        stats: Arc<SessionStats>,
        pool: Option<Arc<dyn ConnectionPool>>,
        engine: Option<Arc<dyn ResilienceEngine>>,
    ) {
        self.register_collector(Arc::new(DatabaseCollector::new(stats, pool)));
        if self.config.enable_system_metrics {
            self.register_collector(Arc::new(SystemCollector::new()));
            self.register_collector(Arc::new(ApplicationCollector::new()));
        }
        if let Some(engine) = engine {
            self.register_collector(Arc::new(ResilienceCollector::new(engine)));
        }
    }

    /// Start the collection and alerting loops
    pub fn start(&self) -> SentinelResult<()> {
        self.scheduler.start()?;
        *self.started_at.write() = Some(Instant::now());
        info!("🚀 MONITOR: Resilience monitor started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub async fn stop(&self) {
        self.scheduler.stop().await;
        *self.started_at.write() = None;
    }

    /// Run one collection tick immediately
    pub async fn collect_now(&self) -> CollectionReport {
        self.pipeline.collection_tick().await
    }

    /// Run one alerting tick immediately
    pub fn evaluate_alerts_now(&self) -> AlertCycleReport {
        self.pipeline.alerting_tick()
    }

    pub fn record_metric(
        &self,
        name: &str,
        value: f64,
        kind: MetricKind,
        tags: HashMap<String, String>,
    ) -> MetricPoint {
        self.pipeline.store.record(name, value, kind, tags)
    }

    pub fn get_metrics(&self, names: Option<&[&str]>, time_range: Duration) -> HashMap<String, Vec<MetricPoint>> {
        self.pipeline.store.get(names, time_range)
    }

    pub fn get_alerts(&self, include_resolved: bool) -> Vec<Alert> {
        self.pipeline.alerts.get_alerts(include_resolved)
    }

    pub fn add_alert_callback<F>(&self, callback: F)
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.pipeline.alerts.add_callback(Arc::new(callback));
    }

    pub fn acknowledge_alert(&self, id: &str) -> bool {
        self.pipeline.alerts.acknowledge(id)
    }

    pub fn get_trends(&self) -> HashMap<String, TrendState> {
        self.pipeline.trends.states()
    }

    pub fn get_health_summary(&self) -> HealthSummary {
        let scorer = &self.pipeline.health;
        let current = scorer.latest();
        let status = current
            .as_ref()
            .map_or(HealthStatus::Unknown, |snapshot| HealthStatus::from_score(snapshot.overall));
        let trend = self
            .pipeline
            .trends
            .state(health::OVERALL_SCORE)
            .map(|state| state.trend)
            .unwrap_or_default();

        HealthSummary {
            status,
            current,
            average: scorer.average_of_last(defaults::HEALTH_SUMMARY_WINDOW),
            average_overall: scorer.average_overall(defaults::HEALTH_SUMMARY_WINDOW),
            trend,
            active_alerts: self.pipeline.alerts.active_count(),
            critical_alerts: self.pipeline.alerts.critical_count(),
        }
    }

    pub fn get_status(&self) -> MonitorStatus {
        let alerts = &self.pipeline.alerts;
        MonitorStatus {
            running: self.is_running(),
            uptime_seconds: self.started_at.read().map(|started| started.elapsed().as_secs()),
            tracked_metrics: self.pipeline.store.metric_count(),
            stored_points: self.pipeline.store.total_points(),
            trend_metrics: self.pipeline.trends.tracked_metrics(),
            health_snapshots: self.pipeline.health.history_len(),
            alert_rules: alerts.rules().len(),
            active_alerts: alerts.active_count(),
            total_alerts: alerts.total_count(),
            alert_callbacks: alerts.callback_count(),
            collectors: self.pipeline.collector_names(),
            monitoring_interval_seconds: self.config.monitoring_interval_seconds,
            alerting_interval_seconds: self.config.alerting_interval_seconds,
            last_collection: self.pipeline.last_collection(),
            last_alerting: self.pipeline.last_alerting(),
        }
    }
}

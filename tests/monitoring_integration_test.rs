//! Collection, health, trends and the alert lifecycle through the monitor facade.

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::{FakeEngine, FakePool, SwitchGate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use db_sentinel::config::MonitoringConfig;
use db_sentinel::constants::{health, system};
use db_sentinel::database::SessionStats;
use db_sentinel::error::{SentinelError, SentinelResult};
use db_sentinel::monitoring::collectors::MetricCollector;
use db_sentinel::monitoring::{
    default_alert_rules, AlertLevel, AlertRule, CollectedMetric, Comparison, HealthStatus, MetricKind,
    ResilienceMonitor, TrendDirection,
};

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap() + ChronoDuration::seconds(seconds)
}

fn quiet_config() -> MonitoringConfig {
    MonitoringConfig {
        enable_system_metrics: false,
        ..Default::default()
    }
}

/// Emits fixed host readings
struct HostReadings {
    cpu: f64,
    disk: f64,
}

#[async_trait]
impl MetricCollector for HostReadings {
    fn name(&self) -> &str {
        "host_readings"
    }

    async fn collect(&self) -> SentinelResult<Vec<CollectedMetric>> {
        Ok(vec![
            CollectedMetric::gauge(system::CPU_USAGE, self.cpu),
            CollectedMetric::gauge(system::DISK_USAGE, self.disk),
        ])
    }
}

struct BrokenCollector;

#[async_trait]
impl MetricCollector for BrokenCollector {
    fn name(&self) -> &str {
        "broken"
    }

    async fn collect(&self) -> SentinelResult<Vec<CollectedMetric>> {
        Err(SentinelError::collector("broken", "permission denied"))
    }
}

#[tokio::test]
async fn test_sustained_cpu_breach_raises_single_critical_alert() {
    let monitor = ResilienceMonitor::new(quiet_config(), default_alert_rules());
    let store = monitor.store();
    for i in 0..7 {
        store.record_at(system::CPU_USAGE, 96.0, MetricKind::Gauge, HashMap::new(), at(i * 10));
    }

    let engine = monitor.alert_engine();
    engine.run_cycle_at(&store, at(60));
    engine.run_cycle_at(&store, at(65));

    let alerts = monitor.get_alerts(false);
    let critical: Vec<_> = alerts.iter().filter(|a| a.rule_name == "critical_cpu_usage").collect();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].id, "alert_critical_cpu_usage");
    assert_eq!(critical[0].level, AlertLevel::Critical);
    // Every sample in the 300s warning window conforms as well
    assert!(alerts.iter().any(|a| a.rule_name == "high_cpu_usage"));
}

#[tokio::test]
async fn test_one_dip_in_window_suppresses_alert() {
    let monitor = ResilienceMonitor::new(quiet_config(), default_alert_rules());
    let store = monitor.store();
    let values = [96.0, 96.0, 96.0, 96.0, 80.0, 96.0, 96.0];
    for (i, value) in values.iter().enumerate() {
        store.record_at(system::CPU_USAGE, *value, MetricKind::Gauge, HashMap::new(), at(i as i64 * 10));
    }

    monitor.alert_engine().run_cycle_at(&store, at(60));
    assert!(monitor.get_alerts(true).iter().all(|a| a.rule_name != "critical_cpu_usage"));
}

#[tokio::test]
async fn test_unacknowledged_critical_escalates_and_stays_escalated() {
    let rule = AlertRule::new("low_health_score", health::OVERALL_SCORE, 50.0, Comparison::Lt, 0, AlertLevel::Critical);
    let monitor = ResilienceMonitor::new(quiet_config(), vec![rule]);
    let store = monitor.store();
    let engine = monitor.alert_engine();
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    monitor.add_alert_callback(move |alert| {
        if alert.level == AlertLevel::Emergency {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    store.record_at(health::OVERALL_SCORE, 30.0, MetricKind::Gauge, HashMap::new(), at(0));
    engine.run_cycle_at(&store, at(0));
    let report = engine.run_cycle_at(&store, at(900));
    assert_eq!(report.escalated, vec!["alert_low_health_score".to_string()]);

    let report = engine.run_cycle_at(&store, at(1800));
    assert!(report.escalated.is_empty());

    let alert = monitor.get_alerts(false).pop().unwrap();
    assert_eq!(alert.level, AlertLevel::Emergency);
    assert_eq!(alert.metadata["original_level"], serde_json::json!("critical"));
    assert!(alert.metadata.contains_key("escalated_at"));
    assert_eq!(delivered.load(Ordering::SeqCst), 2);
    assert_eq!(monitor.get_health_summary().critical_alerts, 1);
}

#[tokio::test]
async fn test_collection_tick_scores_health_and_tolerates_failures() {
    let monitor = ResilienceMonitor::new(quiet_config(), default_alert_rules());
    monitor.register_collector(Arc::new(BrokenCollector));
    monitor.register_collector(Arc::new(HostReadings { cpu: 91.0, disk: 50.0 }));

    let report = monitor.collect_now().await;

    assert_eq!(report.failed_collectors, vec!["broken".to_string()]);
    // system 70, resilience unavailable 50: 40 + 21 + 20 + 5
    assert!((report.snapshot.overall - 86.0).abs() < 1e-9);
    assert_eq!(monitor.store().current(health::SYSTEM_SCORE), Some(70.0));
    assert_eq!(monitor.get_health_summary().status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_resilience_engine_health_flows_into_score() {
    let monitor = ResilienceMonitor::new(quiet_config(), default_alert_rules());
    let mut engine = FakeEngine::new(Arc::new(SwitchGate::closed()), Arc::new(FakePool::healthy()));
    engine.health = Some(20.0);
    monitor.register_default_collectors(Arc::new(SessionStats::new()), None, Some(Arc::new(engine)));

    let report = monitor.collect_now().await;
    assert_eq!(report.snapshot.components.resilience, 20.0);
}

#[tokio::test]
async fn test_health_trend_follows_declining_scores() {
    let monitor = ResilienceMonitor::new(quiet_config(), Vec::new());
    let store = monitor.store();
    for i in 0..20 {
        store.record_at(health::OVERALL_SCORE, 100.0 - i as f64 * 2.0, MetricKind::Gauge, HashMap::new(), at(i));
    }

    monitor.collect_now().await;
    let trends = monitor.get_trends();
    let overall = &trends[health::OVERALL_SCORE];
    assert_eq!(overall.trend, TrendDirection::Decreasing);
}

#[tokio::test]
async fn test_scheduler_runs_loops_until_stopped() {
    let config = MonitoringConfig {
        monitoring_interval_seconds: 1,
        alerting_interval_seconds: 1,
        stop_timeout_seconds: 2,
        enable_system_metrics: false,
        ..Default::default()
    };
    let rule = AlertRule::new("disk_space_low", system::DISK_USAGE, 90.0, Comparison::Gt, 0, AlertLevel::Warning);
    let monitor = ResilienceMonitor::new(config, vec![rule]);
    monitor.register_collector(Arc::new(HostReadings { cpu: 10.0, disk: 97.0 }));

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    monitor.add_alert_callback(move |_alert| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    monitor.start().unwrap();
    assert!(monitor.start().is_err());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while delivered.load(Ordering::SeqCst) == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(delivered.load(Ordering::SeqCst) > 0);

    let status = monitor.get_status();
    assert!(status.running);
    assert!(status.uptime_seconds.is_some());
    assert!(status.last_collection.is_some());
    assert!(status.last_alerting.is_some());

    tokio::time::timeout(Duration::from_secs(3), monitor.stop())
        .await
        .expect("stop joins both loops");
    assert!(!monitor.get_status().running);

    // Loops are gone: no further collection happens
    let points = monitor.get_status().stored_points;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(monitor.get_status().stored_points, points);
}

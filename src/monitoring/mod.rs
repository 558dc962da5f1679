//! # Monitoring
//!
//! In-memory metrics, trend analysis, health scoring and threshold alerting,
//! driven by two background loops.
//!
//! - [`metrics`] - bounded per-metric series with retention
//! - [`trends`] - least-squares trend state per metric
//! - [`health`] - weighted component health scores and history
//! - [`alerts`] - alert rules and the alert lifecycle
//! - [`collectors`] - database, host, process and resilience sources
//! - [`scheduler`] - collection and alerting loops
//! - [`monitor`] - the [`ResilienceMonitor`] facade

pub mod alerts;
pub mod collectors;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod scheduler;
pub mod trends;

pub use alerts::{default_alert_rules, Alert, AlertEngine, AlertLevel, AlertRule, Comparison};
pub use collectors::MetricCollector;
pub use health::{ComponentScores, HealthScorer, HealthSnapshot, HealthStatus};
pub use metrics::{CollectedMetric, MetricKind, MetricPoint, MetricStore};
pub use monitor::{HealthSummary, MonitorStatus, ResilienceMonitor};
pub use scheduler::{MonitorScheduler, MonitoringPipeline};
pub use trends::{TrendAnalyzer, TrendDirection, TrendState};

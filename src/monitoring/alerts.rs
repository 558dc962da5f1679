//! # Alert Engine
//!
//! Threshold rules evaluated against the metric store. Each rule owns one
//! alert slot (`alert_<rule>`) that is created on trigger, refreshed while
//! the breach continues, resolved when it stops, and re-created on the next
//! trigger. Rules with a duration only fire on a sustained breach: the
//! current value and every sample inside the trailing window must satisfy
//! the comparison.
//!
//! Unacknowledged critical alerts escalate to emergency once they have been
//! open for the escalation period. Every cycle delivers each pending alert
//! (unacknowledged and unresolved) to every callback, so delivery repeats
//! until the alert is acknowledged or resolved. Callbacks run outside the
//! engine's locks and a panicking callback never stops dispatch to the others.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::constants::{database, defaults, health, system};
use crate::error::{SentinelError, SentinelResult};
use crate::logging::{log_alert_operation, log_error};
use crate::monitoring::metrics::{cutoff, MetricStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl Comparison {
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Gt => value > threshold,
            Comparison::Gte => value >= threshold,
            Comparison::Lt => value < threshold,
            Comparison::Lte => value <= threshold,
            Comparison::Eq => (value - threshold).abs() < f64::EPSILON,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Eq => "==",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
            AlertLevel::Emergency => "emergency",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_title_template() -> String {
    "{rule}: {metric} {comparison} {threshold}".to_string()
}

fn default_message_template() -> String {
    "{metric} is {value} (threshold {comparison} {threshold})".to_string()
}

/// Static threshold rule loaded at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub name: String,
    pub metric: String,
    pub threshold: f64,
    pub comparison: Comparison,
    #[serde(default)]
    pub duration_seconds: u64,
    pub level: AlertLevel,
    #[serde(default = "default_title_template")]
    pub title_template: String,
    #[serde(default = "default_message_template")]
    pub message_template: String,
}

impl AlertRule {
    pub fn new(
        name: &str,
        metric: &str,
        threshold: f64,
        comparison: Comparison,
        duration_seconds: u64,
        level: AlertLevel,
    ) -> Self {
        Self {
            name: name.to_string(),
            metric: metric.to_string(),
            threshold,
            comparison,
            duration_seconds,
            level,
            title_template: default_title_template(),
            message_template: default_message_template(),
        }
    }

    pub fn with_templates(mut self, title: &str, message: &str) -> Self {
        self.title_template = title.to_string();
        self.message_template = message.to_string();
        self
    }

    pub fn alert_id(&self) -> String {
        format!("alert_{}", self.name)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_seconds)
    }

    pub fn validate(&self) -> SentinelResult<()> {
        if self.name.trim().is_empty() {
            return Err(SentinelError::Configuration("alert rule name must not be empty".to_string()));
        }
        if self.metric.trim().is_empty() {
            return Err(SentinelError::Configuration(format!(
                "alert rule '{}' has an empty metric",
                self.name
            )));
        }
        if !self.threshold.is_finite() {
            return Err(SentinelError::Configuration(format!(
                "alert rule '{}' threshold must be finite",
                self.name
            )));
        }
        self.render(&self.title_template, 0.0)
            .and_then(|_| self.render(&self.message_template, 0.0))
            .map(|_| ())
            .map_err(|error| SentinelError::Configuration(error.to_string()))
    }

    /// Substitute `{metric}`, `{value}`, `{threshold}`, `{comparison}`, `{level}`, `{rule}`
    pub fn render(&self, template: &str, value: f64) -> SentinelResult<String> {
        let mut rendered = String::with_capacity(template.len() + 16);
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut placeholder = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => {
                                return Err(SentinelError::Alert(format!(
                                    "rule '{}': unbalanced '{{' in template",
                                    self.name
                                )))
                            }
                            Some(other) => placeholder.push(other),
                        }
                    }
                    match placeholder.as_str() {
                        "metric" => rendered.push_str(&self.metric),
                        "value" => rendered.push_str(&format!("{value:.2}")),
                        "threshold" => rendered.push_str(&format!("{:.2}", self.threshold)),
                        "comparison" => rendered.push_str(self.comparison.symbol()),
                        "level" => rendered.push_str(self.level.as_str()),
                        "rule" => rendered.push_str(&self.name),
                        unknown => {
                            return Err(SentinelError::Alert(format!(
                                "rule '{}': unknown placeholder '{{{unknown}}}'",
                                self.name
                            )))
                        }
                    }
                }
                '}' => {
                    return Err(SentinelError::Alert(format!(
                        "rule '{}': unbalanced '}}' in template",
                        self.name
                    )))
                }
                other => rendered.push(other),
            }
        }

        Ok(rendered)
    }
}

/// Built-in rules used when configuration provides none
pub fn default_alert_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new("critical_cpu_usage", system::CPU_USAGE, 95.0, Comparison::Gt, 60, AlertLevel::Critical)
            .with_templates("Critical CPU usage", "CPU usage is {value}% (threshold {threshold}%)"),
        AlertRule::new("high_cpu_usage", system::CPU_USAGE, 80.0, Comparison::Gt, 300, AlertLevel::Warning)
            .with_templates("High CPU usage", "CPU usage is {value}% (threshold {threshold}%)"),
        AlertRule::new("high_memory_usage", system::MEMORY_USAGE, 85.0, Comparison::Gt, 300, AlertLevel::Warning)
            .with_templates("High memory usage", "Memory usage is {value}% (threshold {threshold}%)"),
        AlertRule::new(
            "critical_memory_usage",
            system::MEMORY_USAGE,
            95.0,
            Comparison::Gt,
            60,
            AlertLevel::Critical,
        )
        .with_templates("Critical memory usage", "Memory usage is {value}% (threshold {threshold}%)"),
        AlertRule::new("disk_space_low", system::DISK_USAGE, 90.0, Comparison::Gt, 0, AlertLevel::Warning)
            .with_templates("Disk space low", "Disk usage is {value}% (threshold {threshold}%)"),
        AlertRule::new(
            "database_session_failures",
            database::FAILED_SESSIONS,
            10.0,
            Comparison::Gt,
            0,
            AlertLevel::Warning,
        )
        .with_templates("Database session failures", "{value} failed sessions (threshold {threshold})"),
        AlertRule::new("low_health_score", health::OVERALL_SCORE, 50.0, Comparison::Lt, 120, AlertLevel::Critical)
            .with_templates("Low system health", "Overall health score is {value} (threshold {threshold})"),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_name: String,
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub metric_name: String,
    pub current_value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        !self.resolved
    }

    pub fn is_escalated(&self) -> bool {
        self.metadata.contains_key("escalated_at")
    }
}

pub type AlertCallback = Arc<dyn Fn(&Alert) + Send + Sync>;

/// What one alerting pass changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertCycleReport {
    pub triggered: Vec<String>,
    pub resolved: Vec<String>,
    pub escalated: Vec<String>,
    pub rule_errors: usize,
    pub callback_failures: usize,
}

pub struct AlertEngine {
    rules: Vec<AlertRule>,
    alerts: RwLock<HashMap<String, Alert>>,
    callbacks: RwLock<Vec<AlertCallback>>,
    escalation_after: Duration,
}

impl fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertEngine")
            .field("rules", &self.rules.len())
            .field("alerts", &self.alerts.read().len())
            .field("callbacks", &self.callbacks.read().len())
            .field("escalation_after", &self.escalation_after)
            .finish()
    }
}

impl AlertEngine {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self::with_escalation(rules, Duration::from_secs(defaults::ESCALATION_AFTER_SECONDS))
    }

    pub fn with_escalation(rules: Vec<AlertRule>, escalation_after: Duration) -> Self {
        Self {
            rules,
            alerts: RwLock::new(HashMap::new()),
            callbacks: RwLock::new(Vec::new()),
            escalation_after,
        }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    pub fn add_callback(&self, callback: AlertCallback) {
        self.callbacks.write().push(callback);
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Alerts ordered by trigger time; resolved ones only when asked for
    pub fn get_alerts(&self, include_resolved: bool) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .read()
            .values()
            .filter(|alert| include_resolved || !alert.resolved)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        alerts
    }

    pub fn get_alert(&self, id: &str) -> Option<Alert> {
        self.alerts.read().get(id).cloned()
    }

    /// Mark an alert acknowledged; false when no such alert exists
    pub fn acknowledge(&self, id: &str) -> bool {
        match self.alerts.write().get_mut(id) {
            Some(alert) => {
                alert.acknowledged = true;
                info!(alert_id = %id, "🚨 ALERT: Acknowledged");
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.alerts.read().values().filter(|alert| !alert.resolved).count()
    }

    /// Unresolved alerts at critical level or above
    pub fn critical_count(&self) -> usize {
        self.alerts
            .read()
            .values()
            .filter(|alert| !alert.resolved && alert.level >= AlertLevel::Critical)
            .count()
    }

    pub fn total_count(&self) -> usize {
        self.alerts.read().len()
    }

    pub fn run_cycle(&self, store: &MetricStore) -> AlertCycleReport {
        self.run_cycle_at(store, Utc::now())
    }

    /// Evaluate every rule, escalate, then dispatch callbacks for every
    /// alert that is neither acknowledged nor resolved
    pub fn run_cycle_at(&self, store: &MetricStore, now: DateTime<Utc>) -> AlertCycleReport {
        let mut report = AlertCycleReport::default();

        for rule in &self.rules {
            match self.evaluate_rule(rule, store, now) {
                Ok(Some(RuleOutcome::Triggered(id))) => report.triggered.push(id),
                Ok(Some(RuleOutcome::Resolved(id))) => report.resolved.push(id),
                Ok(None) => {}
                Err(error) => {
                    report.rule_errors += 1;
                    log_error("alert_engine", "evaluate_rule", &error.to_string(), Some(&rule.name));
                }
            }
        }

        report.escalated = self
            .process_escalations_at(now)
            .into_iter()
            .map(|alert| alert.id)
            .collect();

        report.callback_failures = self.dispatch(&self.pending_alerts());
        report
    }

    /// Alerts awaiting acknowledgement, oldest first
    pub fn pending_alerts(&self) -> Vec<Alert> {
        let mut pending: Vec<Alert> = self
            .alerts
            .read()
            .values()
            .filter(|alert| !alert.acknowledged && !alert.resolved)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        pending
    }

    fn evaluate_rule(
        &self,
        rule: &AlertRule,
        store: &MetricStore,
        now: DateTime<Utc>,
    ) -> SentinelResult<Option<RuleOutcome>> {
        let Some(current) = store.current(&rule.metric) else {
            return Ok(None);
        };

        let triggered = if rule.duration_seconds == 0 {
            rule.comparison.evaluate(current, rule.threshold)
        } else {
            let samples = store.values_since(&rule.metric, cutoff(now, rule.duration()));
            !samples.is_empty()
                && rule.comparison.evaluate(current, rule.threshold)
                && samples
                    .iter()
                    .all(|sample| rule.comparison.evaluate(*sample, rule.threshold))
        };

        let id = rule.alert_id();

        if triggered {
            if let Some(existing) = self.alerts.write().get_mut(&id) {
                if !existing.resolved {
                    existing.current_value = current;
                    return Ok(None);
                }
            }

            let alert = Alert {
                id: id.clone(),
                rule_name: rule.name.clone(),
                level: rule.level,
                title: rule.render(&rule.title_template, current)?,
                message: rule.render(&rule.message_template, current)?,
                metric_name: rule.metric.clone(),
                current_value: current,
                threshold: rule.threshold,
                timestamp: now,
                acknowledged: false,
                resolved: false,
                resolved_at: None,
                metadata: HashMap::from([
                    ("comparison".to_string(), serde_json::json!(rule.comparison.symbol())),
                    ("duration_seconds".to_string(), serde_json::json!(rule.duration_seconds)),
                ]),
            };
            self.alerts.write().insert(id.clone(), alert);
            log_alert_operation("triggered", &id, rule.level.as_str(), &rule.metric, current, None);
            return Ok(Some(RuleOutcome::Triggered(id)));
        }

        let mut alerts = self.alerts.write();
        match alerts.get_mut(&id) {
            Some(existing) if !existing.resolved => {
                existing.resolved = true;
                existing.resolved_at = Some(now);
                existing.current_value = current;
                log_alert_operation("resolved", &id, existing.level.as_str(), &rule.metric, current, None);
                Ok(Some(RuleOutcome::Resolved(id)))
            }
            _ => Ok(None),
        }
    }

    /// Escalate unacknowledged critical alerts open for the escalation period
    pub fn process_escalations_at(&self, now: DateTime<Utc>) -> Vec<Alert> {
        let escalation_cutoff = cutoff(now, self.escalation_after);
        let mut escalated = Vec::new();

        for alert in self.alerts.write().values_mut() {
            if alert.level == AlertLevel::Critical
                && !alert.acknowledged
                && !alert.resolved
                && alert.timestamp <= escalation_cutoff
            {
                alert
                    .metadata
                    .insert("original_level".to_string(), serde_json::json!(alert.level.as_str()));
                alert
                    .metadata
                    .insert("escalated_at".to_string(), serde_json::json!(now.to_rfc3339()));
                alert.level = AlertLevel::Emergency;
                log_alert_operation(
                    "escalated",
                    &alert.id,
                    alert.level.as_str(),
                    &alert.metric_name,
                    alert.current_value,
                    Some("critical alert unacknowledged"),
                );
                escalated.push(alert.clone());
            }
        }

        escalated
    }

    /// Invoke every callback for every alert; returns how many invocations panicked
    fn dispatch(&self, alerts: &[Alert]) -> usize {
        if alerts.is_empty() {
            return 0;
        }
        let callbacks: Vec<AlertCallback> = self.callbacks.read().clone();
        let mut failures = 0;

        for alert in alerts {
            for (index, callback) in callbacks.iter().enumerate() {
                if catch_unwind(AssertUnwindSafe(|| callback(alert))).is_err() {
                    failures += 1;
                    error!(alert_id = %alert.id, callback_index = index, "🚨 ALERT: Callback panicked");
                }
            }
        }

        debug!(alerts = alerts.len(), callbacks = callbacks.len(), "Alert callbacks dispatched");
        failures
    }
}

enum RuleOutcome {
    Triggered(String),
    Resolved(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::metrics::MetricKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    fn critical_cpu_rule() -> AlertRule {
        AlertRule::new("critical_cpu_usage", "system_cpu_usage", 95.0, Comparison::Gt, 60, AlertLevel::Critical)
    }

    fn record_series(store: &MetricStore, metric: &str, values: &[f64]) {
        for (i, value) in values.iter().enumerate() {
            store.record_at(metric, *value, MetricKind::Gauge, HashMap::new(), at(i as i64 * 10));
        }
    }

    #[test]
    fn test_sustained_breach_creates_one_alert() {
        let store = MetricStore::default();
        let engine = AlertEngine::new(vec![critical_cpu_rule()]);
        record_series(&store, "system_cpu_usage", &[96.0; 6]);

        let report = engine.run_cycle_at(&store, at(50));
        assert_eq!(report.triggered, vec!["alert_critical_cpu_usage".to_string()]);

        // A second pass refreshes the same slot
        engine.run_cycle_at(&store, at(55));
        let alerts = engine.get_alerts(false);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, "alert_critical_cpu_usage");
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert!(!alerts[0].resolved);
    }

    #[test]
    fn test_one_conforming_sample_suppresses_trigger() {
        let store = MetricStore::default();
        let engine = AlertEngine::new(vec![critical_cpu_rule()]);
        record_series(&store, "system_cpu_usage", &[96.0, 96.0, 96.0, 96.0, 80.0, 96.0]);

        let report = engine.run_cycle_at(&store, at(50));
        assert!(report.triggered.is_empty());
        assert!(engine.get_alerts(true).is_empty());
    }

    #[test]
    fn test_instantaneous_rule_and_resolution() {
        let store = MetricStore::default();
        let rule = AlertRule::new("disk_space_low", "system_disk_usage", 90.0, Comparison::Gt, 0, AlertLevel::Warning);
        let engine = AlertEngine::new(vec![rule]);

        store.record_at("system_disk_usage", 91.0, MetricKind::Gauge, HashMap::new(), at(0));
        assert_eq!(engine.run_cycle_at(&store, at(0)).triggered.len(), 1);

        store.record_at("system_disk_usage", 50.0, MetricKind::Gauge, HashMap::new(), at(5));
        let report = engine.run_cycle_at(&store, at(5));
        assert_eq!(report.resolved, vec!["alert_disk_space_low".to_string()]);
        assert!(engine.get_alerts(false).is_empty());
        assert_eq!(engine.get_alerts(true).len(), 1);

        // Same id is reused on the next trigger
        store.record_at("system_disk_usage", 99.0, MetricKind::Gauge, HashMap::new(), at(10));
        engine.run_cycle_at(&store, at(10));
        let alert = engine.get_alert("alert_disk_space_low").unwrap();
        assert!(!alert.resolved);
        assert_eq!(alert.timestamp, at(10));
        assert_eq!(engine.total_count(), 1);
    }

    #[test]
    fn test_missing_metric_is_not_evaluated() {
        let store = MetricStore::default();
        let engine = AlertEngine::new(vec![critical_cpu_rule()]);
        let report = engine.run_cycle_at(&store, at(0));
        assert_eq!(report, AlertCycleReport::default());
    }

    #[test]
    fn test_critical_escalates_once() {
        let store = MetricStore::default();
        let engine = AlertEngine::new(vec![critical_cpu_rule()]);
        record_series(&store, "system_cpu_usage", &[99.0; 7]);
        engine.run_cycle_at(&store, at(60));

        assert!(engine.process_escalations_at(at(60 + 899)).is_empty());

        let escalated = engine.process_escalations_at(at(60 + 900));
        assert_eq!(escalated.len(), 1);
        assert_eq!(escalated[0].level, AlertLevel::Emergency);
        assert_eq!(escalated[0].metadata["original_level"], serde_json::json!("critical"));

        assert!(engine.process_escalations_at(at(60 + 2000)).is_empty());
        assert_eq!(engine.get_alert("alert_critical_cpu_usage").unwrap().level, AlertLevel::Emergency);
    }

    #[test]
    fn test_acknowledged_alerts_do_not_escalate() {
        let store = MetricStore::default();
        let engine = AlertEngine::new(vec![critical_cpu_rule()]);
        record_series(&store, "system_cpu_usage", &[99.0; 7]);
        engine.run_cycle_at(&store, at(60));

        assert!(engine.acknowledge("alert_critical_cpu_usage"));
        assert!(!engine.acknowledge("alert_unknown"));
        assert!(engine.process_escalations_at(at(60 + 5000)).is_empty());
    }

    #[test]
    fn test_panicking_callback_does_not_block_others() {
        let store = MetricStore::default();
        let rule = AlertRule::new("disk_space_low", "system_disk_usage", 90.0, Comparison::Gt, 0, AlertLevel::Warning);
        let engine = AlertEngine::new(vec![rule]);
        let calls = Arc::new(AtomicUsize::new(0));

        engine.add_callback(Arc::new(|_alert: &Alert| panic!("callback failure")));
        let counter = calls.clone();
        engine.add_callback(Arc::new(move |_alert: &Alert| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        store.record_at("system_disk_usage", 95.0, MetricKind::Gauge, HashMap::new(), at(0));
        let report = engine.run_cycle_at(&store, at(0));

        assert_eq!(report.callback_failures, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pending_alerts_are_redelivered_until_acknowledged() {
        let store = MetricStore::default();
        let rule = AlertRule::new("disk_space_low", "system_disk_usage", 90.0, Comparison::Gt, 0, AlertLevel::Warning);
        let engine = AlertEngine::new(vec![rule]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        engine.add_callback(Arc::new(move |_alert: &Alert| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        store.record_at("system_disk_usage", 95.0, MetricKind::Gauge, HashMap::new(), at(0));
        engine.run_cycle_at(&store, at(0));
        engine.run_cycle_at(&store, at(5));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(engine.acknowledge("alert_disk_space_low"));
        engine.run_cycle_at(&store, at(10));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(engine.pending_alerts().is_empty());
    }

    #[test]
    fn test_template_rendering() {
        let rule = critical_cpu_rule().with_templates("{rule} on {metric}", "{value} {comparison} {threshold} [{level}]");
        assert_eq!(
            rule.render(&rule.title_template, 1.0).unwrap(),
            "critical_cpu_usage on system_cpu_usage"
        );
        assert_eq!(
            rule.render(&rule.message_template, 96.5).unwrap(),
            "96.50 > 95.00 [critical]"
        );
        assert!(rule.render("{nope}", 1.0).is_err());
        assert!(rule.render("{metric", 1.0).is_err());
        assert!(rule.render("metric}", 1.0).is_err());
    }

    #[test]
    fn test_malformed_rule_does_not_block_others() {
        let store = MetricStore::default();
        let broken = AlertRule::new("broken", "system_disk_usage", 10.0, Comparison::Gt, 0, AlertLevel::Info)
            .with_templates("{bogus}", "x");
        let good = AlertRule::new("disk_space_low", "system_disk_usage", 90.0, Comparison::Gt, 0, AlertLevel::Warning);
        let engine = AlertEngine::new(vec![broken, good]);

        store.record_at("system_disk_usage", 95.0, MetricKind::Gauge, HashMap::new(), at(0));
        let report = engine.run_cycle_at(&store, at(0));

        assert_eq!(report.rule_errors, 1);
        assert_eq!(report.triggered, vec!["alert_disk_space_low".to_string()]);
    }

    #[test]
    fn test_rule_validation() {
        assert!(critical_cpu_rule().validate().is_ok());
        assert!(default_alert_rules().iter().all(|rule| rule.validate().is_ok()));

        let mut rule = critical_cpu_rule();
        rule.threshold = f64::NAN;
        assert!(rule.validate().is_err());

        let rule = critical_cpu_rule().with_templates("{", "");
        assert!(matches!(rule.validate(), Err(SentinelError::Configuration(_))));
    }

    #[test]
    fn test_comparisons() {
        assert!(Comparison::Gt.evaluate(2.0, 1.0));
        assert!(!Comparison::Gt.evaluate(1.0, 1.0));
        assert!(Comparison::Gte.evaluate(1.0, 1.0));
        assert!(Comparison::Lt.evaluate(0.5, 1.0));
        assert!(Comparison::Lte.evaluate(1.0, 1.0));
        assert!(Comparison::Eq.evaluate(1.0, 1.0));
        assert!(!Comparison::Eq.evaluate(1.0, 1.1));
    }
}

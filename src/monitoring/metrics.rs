//! # Metric Store
//!
//! Bounded per-name time series held in memory for the life of the process.
//! Each series is a ring buffer capped at `max_points_per_series`; points
//! older than the retention window are pruned on every collection tick and
//! are never returned by reads.
//!
//! One `parking_lot::RwLock` guards the whole store. Writers hold it for a
//! single push, readers for a single copy-out, so no caller blocks beyond a
//! bounded critical section.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use crate::config::MonitoringConfig;
use crate::constants::defaults;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    #[default]
    Gauge,
    Counter,
    Histogram,
    Timer,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
            MetricKind::Histogram => "histogram",
            MetricKind::Timer => "timer",
        };
        f.write_str(name)
    }
}

/// One recorded sample; immutable once stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub tags: HashMap<String, String>,
    pub kind: MetricKind,
}

/// A sample produced by a collector, before it is timestamped by the store
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedMetric {
    pub name: String,
    pub value: f64,
    pub kind: MetricKind,
    pub tags: HashMap<String, String>,
}

impl CollectedMetric {
    pub fn gauge(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            kind: MetricKind::Gauge,
            tags: HashMap::new(),
        }
    }

    pub fn counter(name: &str, value: f64) -> Self {
        Self {
            kind: MetricKind::Counter,
            ..Self::gauge(name, value)
        }
    }

    pub fn with_tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }
}

/// Ring buffer of points for one metric name
#[derive(Debug, Clone)]
pub struct MetricSeries {
    points: VecDeque<MetricPoint>,
    capacity: usize,
    /// Points ever pushed; the sequence number of the next point
    recorded: u64,
}

impl MetricSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            recorded: 0,
        }
    }

    /// Append, evicting the oldest point when full
    pub fn push(&mut self, point: MetricPoint) {
        while self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
        self.recorded += 1;
    }

    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    /// Held points with a sequence number of at least `cursor`, oldest first
    pub fn from_sequence(&self, cursor: u64) -> impl Iterator<Item = &MetricPoint> {
        let first = self.recorded - self.points.len() as u64;
        // A cursor ahead of the series means it was cleared and rebuilt
        let cursor = if cursor > self.recorded { 0 } else { cursor };
        let skip = cursor.saturating_sub(first) as usize;
        self.points.iter().skip(skip)
    }

    /// Drop points older than `cutoff`, returning how many were removed
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.points.len();
        while self
            .points
            .front()
            .is_some_and(|point| point.timestamp < cutoff)
        {
            self.points.pop_front();
        }
        before - self.points.len()
    }

    pub fn since(&self, cutoff: DateTime<Utc>) -> impl Iterator<Item = &MetricPoint> {
        self.points.iter().filter(move |point| point.timestamp >= cutoff)
    }

    pub fn last(&self) -> Option<&MetricPoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    series: HashMap<String, MetricSeries>,
    current: HashMap<String, f64>,
}

#[derive(Debug)]
pub struct MetricStore {
    inner: RwLock<StoreInner>,
    max_points_per_series: usize,
    retention: Duration,
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new(defaults::MAX_POINTS_PER_SERIES, Duration::from_secs(3600))
    }
}

impl MetricStore {
    pub fn new(max_points_per_series: usize, retention: Duration) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            max_points_per_series: max_points_per_series.max(1),
            retention,
        }
    }

    pub fn from_config(config: &MonitoringConfig) -> Self {
        Self::new(config.max_points_per_series, config.retention())
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn record(
        &self,
        name: &str,
        value: f64,
        kind: MetricKind,
        tags: HashMap<String, String>,
    ) -> MetricPoint {
        self.record_at(name, value, kind, tags, Utc::now())
    }

    /// Record with an explicit timestamp; per-metric timestamps never go backwards
    pub fn record_at(
        &self,
        name: &str,
        value: f64,
        kind: MetricKind,
        tags: HashMap<String, String>,
        timestamp: DateTime<Utc>,
    ) -> MetricPoint {
        let mut inner = self.inner.write();
        let capacity = self.max_points_per_series;
        let series = inner
            .series
            .entry(name.to_string())
            .or_insert_with(|| MetricSeries::new(capacity));

        let timestamp = match series.last() {
            Some(last) if last.timestamp > timestamp => last.timestamp,
            _ => timestamp,
        };

        let point = MetricPoint {
            name: name.to_string(),
            value,
            timestamp,
            tags,
            kind,
        };
        series.push(point.clone());
        inner.current.insert(name.to_string(), value);
        point
    }

    pub fn record_collected(&self, metric: CollectedMetric) -> MetricPoint {
        self.record(&metric.name, metric.value, metric.kind, metric.tags)
    }

    pub fn record_gauge(&self, name: &str, value: f64) -> MetricPoint {
        self.record(name, value, MetricKind::Gauge, HashMap::new())
    }

    /// Points no older than `min(time_range, retention)` for the requested names,
    /// or for every known metric when `names` is `None`
    pub fn get(&self, names: Option<&[&str]>, time_range: Duration) -> HashMap<String, Vec<MetricPoint>> {
        self.get_at(names, time_range, Utc::now())
    }

    pub fn get_at(
        &self,
        names: Option<&[&str]>,
        time_range: Duration,
        now: DateTime<Utc>,
    ) -> HashMap<String, Vec<MetricPoint>> {
        let cutoff = cutoff(now, time_range.min(self.retention));
        let inner = self.inner.read();

        let collect = |series: &MetricSeries| -> Vec<MetricPoint> { series.since(cutoff).cloned().collect() };

        match names {
            Some(names) => names
                .iter()
                .filter_map(|name| {
                    inner
                        .series
                        .get(*name)
                        .map(|series| (name.to_string(), collect(series)))
                })
                .collect(),
            None => inner
                .series
                .iter()
                .map(|(name, series)| (name.clone(), collect(series)))
                .collect(),
        }
    }

    /// Values of one metric recorded at or after `since`, oldest first
    pub fn values_since(&self, name: &str, since: DateTime<Utc>) -> Vec<f64> {
        let inner = self.inner.read();
        inner
            .series
            .get(name)
            .map(|series| series.since(since).map(|point| point.value).collect())
            .unwrap_or_default()
    }

    /// Points of one metric recorded since sequence `cursor`, oldest first,
    /// with the cursor to pass next time. Points sharing a timestamp are
    /// still told apart.
    pub fn points_from(&self, name: &str, cursor: u64) -> (u64, Vec<MetricPoint>) {
        let inner = self.inner.read();
        inner
            .series
            .get(name)
            .map(|series| {
                (
                    series.recorded(),
                    series.from_sequence(cursor).cloned().collect(),
                )
            })
            .unwrap_or((0, Vec::new()))
    }

    /// Most recent value of a metric
    pub fn current(&self, name: &str) -> Option<f64> {
        self.inner.read().current.get(name).copied()
    }

    pub fn current_values(&self) -> HashMap<String, f64> {
        self.inner.read().current.clone()
    }

    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().series.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn metric_count(&self) -> usize {
        self.inner.read().series.len()
    }

    pub fn total_points(&self) -> usize {
        self.inner.read().series.values().map(MetricSeries::len).sum()
    }

    pub fn series_len(&self, name: &str) -> usize {
        self.inner.read().series.get(name).map_or(0, MetricSeries::len)
    }

    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(Utc::now())
    }

    /// Apply the retention window, returning how many points were removed.
    /// Current values are kept even when their series empties.
    pub fn prune_expired_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = cutoff(now, self.retention);
        let mut inner = self.inner.write();
        inner
            .series
            .values_mut()
            .map(|series| series.prune_before(cutoff))
            .sum()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.series.clear();
        inner.current.clear();
    }
}

/// `now - window`, saturating at the earliest representable instant
pub(crate) fn cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

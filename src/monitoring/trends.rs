//! # Trend Analysis
//!
//! Per-metric least-squares regression over a bounded window of recent
//! values. Each state reports a direction, a normalised strength, a one-step
//! prediction and an anomaly score for the latest value.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::constants::defaults;
use crate::monitoring::metrics::MetricStore;

/// Slopes smaller than this fraction of the window's range count as flat
const STABLE_SLOPE_RATIO: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    #[default]
    Stable,
    Increasing,
    Decreasing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendState {
    pub values: VecDeque<f64>,
    pub timestamps: VecDeque<DateTime<Utc>>,
    pub trend: TrendDirection,
    pub strength: f64,
    pub predicted_next: Option<f64>,
    pub anomaly_score: f64,
    #[serde(skip)]
    capacity: usize,
}

impl TrendState {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            timestamps: VecDeque::with_capacity(capacity),
            trend: TrendDirection::Stable,
            strength: 0.0,
            predicted_next: None,
            anomaly_score: 0.0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.back().copied()
    }

    fn push(&mut self, value: f64, timestamp: DateTime<Utc>) {
        if self.values.len() >= self.capacity {
            self.values.pop_front();
            self.timestamps.pop_front();
        }
        self.values.push_back(value);
        self.timestamps.push_back(timestamp);
    }

    /// Recompute the regression; windows shorter than the minimum are left untouched
    pub fn analyze(&mut self) {
        let n = self.values.len();
        if n < defaults::TREND_MIN_POINTS {
            return;
        }

        let count = n as f64;
        let x_mean = (count - 1.0) / 2.0;
        let y_mean = self.values.iter().sum::<f64>() / count;

        let (mut covariance, mut variance) = (0.0, 0.0);
        for (index, value) in self.values.iter().enumerate() {
            let dx = index as f64 - x_mean;
            covariance += dx * (value - y_mean);
            variance += dx * dx;
        }
        let slope = if variance > 0.0 { covariance / variance } else { 0.0 };
        let intercept = y_mean - slope * x_mean;

        let (min, max) = self
            .values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
                (min.min(*value), max.max(*value))
            });
        let range = max - min;

        self.predicted_next = Some(intercept + slope * count);

        if range <= 0.0 || !range.is_finite() {
            self.trend = TrendDirection::Stable;
            self.strength = 0.0;
            self.anomaly_score = 0.0;
            return;
        }

        self.trend = if slope.abs() < STABLE_SLOPE_RATIO * range {
            TrendDirection::Stable
        } else if slope > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        };
        self.strength = (slope.abs() / range).clamp(0.0, 1.0);

        let expected_last = intercept + slope * (count - 1.0);
        let actual_last = self.values.back().copied().unwrap_or(expected_last);
        self.anomaly_score = (actual_last - expected_last).abs() / range;
    }
}

#[derive(Debug)]
pub struct TrendAnalyzer {
    states: RwLock<HashMap<String, TrendState>>,
    /// Store sequence reached per metric by `ingest_from`
    cursors: Mutex<HashMap<String, u64>>,
    window: usize,
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(defaults::TREND_WINDOW)
    }
}

impl TrendAnalyzer {
    pub fn new(window: usize) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            cursors: Mutex::new(HashMap::new()),
            window: window.max(1),
        }
    }

    /// Append one point and re-analyze its metric
    pub fn update(&self, name: &str, value: f64, timestamp: DateTime<Utc>) {
        if !value.is_finite() {
            return;
        }
        let mut states = self.states.write();
        let state = states
            .entry(name.to_string())
            .or_insert_with(|| TrendState::new(self.window));
        state.push(value, timestamp);
        state.analyze();
    }

    /// Feed every point recorded since the previous call; returns how many were taken
    pub fn ingest_from(&self, store: &MetricStore) -> usize {
        let mut cursors = self.cursors.lock();
        let mut ingested = 0;
        for name in store.metric_names() {
            let cursor = cursors.get(&name).copied().unwrap_or(0);
            let (next, points) = store.points_from(&name, cursor);
            for point in &points {
                self.update(&name, point.value, point.timestamp);
            }
            ingested += points.len();
            cursors.insert(name, next);
        }
        ingested
    }

    pub fn state(&self, name: &str) -> Option<TrendState> {
        self.states.read().get(name).cloned()
    }

    pub fn states(&self) -> HashMap<String, TrendState> {
        self.states.read().clone()
    }

    pub fn tracked_metrics(&self) -> usize {
        self.states.read().len()
    }
}

//! # Health Scoring
//!
//! Four component scores computed from the store's current values, each
//! starting at 100 and reduced by deductions, then combined into a weighted
//! overall score. Every score is clamped to `[0, 100]`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::constants::{application, database, defaults, resilience, system};

pub const DATABASE_WEIGHT: f64 = 0.4;
pub const SYSTEM_WEIGHT: f64 = 0.3;
pub const APPLICATION_WEIGHT: f64 = 0.2;
pub const RESILIENCE_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentScores {
    pub database: f64,
    pub system: f64,
    pub application: f64,
    pub resilience: f64,
}

impl ComponentScores {
    pub fn overall(&self) -> f64 {
        clamp_score(
            self.database * DATABASE_WEIGHT
                + self.system * SYSTEM_WEIGHT
                + self.application * APPLICATION_WEIGHT
                + self.resilience * RESILIENCE_WEIGHT,
        )
    }
}

/// One health computation; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub overall: f64,
    pub components: ComponentScores,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            HealthStatus::Healthy
        } else if score >= 60.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct HealthScorer {
    history: RwLock<VecDeque<HealthSnapshot>>,
    capacity: usize,
}

impl Default for HealthScorer {
    fn default() -> Self {
        Self::new(defaults::HEALTH_HISTORY_SIZE)
    }
}

impl HealthScorer {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Score the current values without touching history
    pub fn score(values: &HashMap<String, f64>) -> ComponentScores {
        ComponentScores {
            database: database_score(values),
            system: system_score(values),
            application: application_score(values),
            resilience: resilience_score(values),
        }
    }

    /// Score the current values and append the snapshot to history
    pub fn compute(&self, values: &HashMap<String, f64>, now: DateTime<Utc>) -> HealthSnapshot {
        let components = Self::score(values);
        let snapshot = HealthSnapshot {
            timestamp: now,
            overall: components.overall(),
            components,
        };

        let mut history = self.history.write();
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(snapshot.clone());
        snapshot
    }

    pub fn latest(&self) -> Option<HealthSnapshot> {
        self.history.read().back().cloned()
    }

    pub fn history(&self) -> Vec<HealthSnapshot> {
        self.history.read().iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Component-wise mean of the most recent `count` snapshots
    pub fn average_of_last(&self, count: usize) -> Option<ComponentScores> {
        let history = self.history.read();
        let recent: Vec<&HealthSnapshot> = history.iter().rev().take(count.max(1)).collect();
        if recent.is_empty() {
            return None;
        }
        let n = recent.len() as f64;
        let sum = recent.iter().fold(ComponentScores::default(), |acc, snapshot| ComponentScores {
            database: acc.database + snapshot.components.database,
            system: acc.system + snapshot.components.system,
            application: acc.application + snapshot.components.application,
            resilience: acc.resilience + snapshot.components.resilience,
        });
        Some(ComponentScores {
            database: sum.database / n,
            system: sum.system / n,
            application: sum.application / n,
            resilience: sum.resilience / n,
        })
    }

    /// Mean overall score of the most recent `count` snapshots
    pub fn average_overall(&self, count: usize) -> Option<f64> {
        let history = self.history.read();
        let recent: Vec<f64> = history.iter().rev().take(count.max(1)).map(|s| s.overall).collect();
        if recent.is_empty() {
            None
        } else {
            Some(recent.iter().sum::<f64>() / recent.len() as f64)
        }
    }
}

fn current(values: &HashMap<String, f64>, name: &str) -> Option<f64> {
    values.get(name).copied().filter(|value| value.is_finite())
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

fn database_score(values: &HashMap<String, f64>) -> f64 {
    let mut score = 100.0;

    if let Some(active) = current(values, database::ACTIVE_SESSIONS) {
        if active > 50.0 {
            score -= ((active - 50.0) * 0.4).min(20.0);
        }
    }
    if let Some(failed) = current(values, database::FAILED_SESSIONS) {
        if failed > 0.0 {
            score -= (failed * 2.0).min(15.0);
        }
    }
    if let Some(hit_rate) = current(values, database::CACHE_HIT_RATE) {
        if hit_rate < 70.0 {
            score -= (70.0 - hit_rate.max(0.0)) * 0.25;
        }
    }

    clamp_score(score)
}

fn system_score(values: &HashMap<String, f64>) -> f64 {
    let mut score = 100.0;

    if let Some(cpu) = current(values, system::CPU_USAGE) {
        score -= tiered(cpu, &[(90.0, 30.0), (80.0, 20.0), (70.0, 10.0)]);
    }
    if let Some(memory) = current(values, system::MEMORY_USAGE) {
        score -= tiered(memory, &[(95.0, 25.0), (85.0, 15.0), (75.0, 8.0)]);
    }
    if let Some(disk) = current(values, system::DISK_USAGE) {
        score -= tiered(disk, &[(95.0, 20.0), (90.0, 10.0), (85.0, 5.0)]);
    }

    clamp_score(score)
}

/// Deduction of the first tier whose threshold is exceeded
fn tiered(value: f64, tiers: &[(f64, f64)]) -> f64 {
    tiers
        .iter()
        .find(|(threshold, _)| value > *threshold)
        .map_or(0.0, |(_, deduction)| *deduction)
}

fn application_score(values: &HashMap<String, f64>) -> f64 {
    let mut score = 100.0;

    if let Some(threads) = current(values, application::THREAD_COUNT) {
        if threads > 100.0 {
            score -= ((threads - 100.0) * 0.1).min(15.0);
        }
    }
    if let Some(cpu) = current(values, application::CPU_USAGE) {
        if cpu > 80.0 {
            score -= ((cpu - 80.0) * 0.5).min(10.0);
        }
    }

    clamp_score(score)
}

fn resilience_score(values: &HashMap<String, f64>) -> f64 {
    clamp_score(current(values, resilience::HEALTH_SCORE).unwrap_or(defaults::RESILIENCE_SCORE_UNAVAILABLE))
}

//! Per-endpoint breaker accounting.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::database::DbErrorKind;
use crate::resilience::CircuitState;

/// Snapshot of one breaker's counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    /// Outcomes reported through `record_success`/`record_failure`
    pub successes: u64,
    pub failures: u64,
    /// Admission checks refused while open
    pub rejections: u64,
    pub consecutive_failures: u32,
    pub times_opened: u64,
    /// Half-open admissions that never reported an outcome within the timeout
    pub abandoned_trials: u64,
    pub last_failure_kind: Option<DbErrorKind>,
    pub failures_by_kind: HashMap<DbErrorKind, u64>,
}

impl CircuitBreakerMetrics {
    pub fn outcomes(&self) -> u64 {
        self.successes + self.failures
    }

    pub fn failure_rate(&self) -> f64 {
        match self.outcomes() {
            0 => 0.0,
            total => self.failures as f64 / total as f64,
        }
    }
}

//! # Circuit Breaker
//!
//! Fault isolation for one database endpoint. Three states: Closed (normal
//! operation), Open (failing fast) and Half-Open (testing recovery).
//!
//! Admission and outcome reporting are separate calls. The session manager
//! asks [`CircuitBreaker::should_allow`] before leasing a connection and
//! reports the outcome only after the transaction has been committed or
//! rolled back, so a single attempt always maps to exactly one outcome.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::database::DbErrorKind;
use crate::resilience::{CircuitBreakerMetrics, CircuitBreakerSettings};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Every attempt is admitted
    #[default]
    Closed,
    /// Attempts are refused until the open timeout elapses
    Open,
    /// A bounded number of trial attempts are admitted
    HalfOpen,
}

impl CircuitState {
    /// Health contribution of a breaker in this state (0-100)
    pub fn health_score(&self) -> f64 {
        match self {
            CircuitState::Closed => 100.0,
            CircuitState::HalfOpen => 50.0,
            CircuitState::Open => 0.0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open for {endpoint}")]
    CircuitOpen { endpoint: String },

    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

#[derive(Debug, Default)]
struct BreakerState {
    metrics: CircuitBreakerMetrics,
    opened_at: Option<Instant>,
    /// Trial attempts admitted since entering half-open
    trials_admitted: u32,
    /// Trial attempts that succeeded since entering half-open
    trials_succeeded: u32,
    last_trial_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint: String,
    settings: CircuitBreakerSettings,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(endpoint: impl Into<String>, settings: CircuitBreakerSettings) -> Self {
        let endpoint = endpoint.into();
        info!(
            endpoint = %endpoint,
            failure_threshold = settings.failure_threshold,
            timeout_seconds = settings.timeout.as_secs(),
            success_threshold = settings.success_threshold,
            "🛡️ CIRCUIT: Breaker initialized"
        );

        Self {
            endpoint,
            settings,
            inner: Mutex::new(BreakerState::default()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().metrics.state
    }

    /// Admission check; an expired open period moves the breaker to half-open.
    ///
    /// Half-open admits up to `success_threshold` trials. Trials whose caller
    /// was cancelled never report back, so once the newest trial is older than
    /// the open timeout the outstanding ones are written off and a fresh one
    /// is admitted.
    pub fn should_allow(&self) -> bool {
        let mut inner = self.inner.lock();
        let state = inner.metrics.state;
        match state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let expired = inner
                    .opened_at
                    .map_or(true, |opened| opened.elapsed() >= self.settings.timeout);
                if expired {
                    self.enter(&mut inner, CircuitState::HalfOpen);
                    self.admit_trial(&mut inner);
                    true
                } else {
                    inner.metrics.rejections += 1;
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.trials_admitted < self.trial_limit() {
                    self.admit_trial(&mut inner);
                    return true;
                }

                let stale = inner
                    .last_trial_at
                    .map_or(true, |admitted| admitted.elapsed() >= self.settings.timeout);
                if stale {
                    let abandoned = inner.trials_admitted - inner.trials_succeeded;
                    inner.metrics.abandoned_trials += u64::from(abandoned);
                    warn!(
                        endpoint = %self.endpoint,
                        abandoned,
                        "🟡 CIRCUIT: Half-open trials never reported, admitting a new one"
                    );
                    inner.trials_admitted = inner.trials_succeeded;
                    self.admit_trial(&mut inner);
                    true
                } else {
                    inner.metrics.rejections += 1;
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.metrics.successes += 1;
        inner.metrics.consecutive_failures = 0;

        if inner.metrics.state == CircuitState::HalfOpen {
            inner.trials_succeeded += 1;
            if inner.trials_succeeded >= self.trial_limit() {
                self.enter(&mut inner, CircuitState::Closed);
            }
        }
    }

    /// Record a failed attempt, optionally classified by database error kind
    pub fn record_failure(&self, kind: Option<DbErrorKind>) {
        let mut inner = self.inner.lock();
        inner.metrics.failures += 1;
        inner.metrics.consecutive_failures = inner.metrics.consecutive_failures.saturating_add(1);
        if let Some(kind) = kind {
            inner.metrics.last_failure_kind = Some(kind);
            *inner.metrics.failures_by_kind.entry(kind).or_insert(0) += 1;
        }

        debug!(
            endpoint = %self.endpoint,
            consecutive_failures = inner.metrics.consecutive_failures,
            kind = kind.map(|k| k.as_str()),
            "🔴 CIRCUIT: Failure recorded"
        );

        let state = inner.metrics.state;
        match state {
            CircuitState::Closed
                if inner.metrics.consecutive_failures as usize >= self.settings.failure_threshold =>
            {
                self.enter(&mut inner, CircuitState::Open);
            }
            CircuitState::HalfOpen => self.enter(&mut inner, CircuitState::Open),
            _ => {}
        }
    }

    /// Run an operation under the breaker, refusing it while open
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.should_allow() {
            return Err(CircuitBreakerError::CircuitOpen {
                endpoint: self.endpoint.clone(),
            });
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure(None);
                Err(CircuitBreakerError::OperationFailed(error))
            }
        }
    }

    pub fn force_open(&self) {
        warn!(endpoint = %self.endpoint, "🚨 CIRCUIT: Breaker forced open");
        let mut inner = self.inner.lock();
        self.enter(&mut inner, CircuitState::Open);
    }

    pub fn force_closed(&self) {
        warn!(endpoint = %self.endpoint, "🚨 CIRCUIT: Breaker forced closed");
        let mut inner = self.inner.lock();
        self.enter(&mut inner, CircuitState::Closed);
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.inner.lock().metrics.clone()
    }

    /// Closed with a failure rate under 10% (or too few outcomes to judge)
    pub fn is_healthy(&self) -> bool {
        let inner = self.inner.lock();
        if inner.metrics.state != CircuitState::Closed {
            return false;
        }
        inner.metrics.outcomes() < 10 || inner.metrics.failure_rate() < 0.1
    }

    fn trial_limit(&self) -> u32 {
        self.settings.success_threshold.max(1) as u32
    }

    fn admit_trial(&self, inner: &mut BreakerState) {
        inner.trials_admitted += 1;
        inner.last_trial_at = Some(Instant::now());
    }

    fn enter(&self, inner: &mut BreakerState, next: CircuitState) {
        let previous = inner.metrics.state;
        inner.metrics.state = next;
        inner.trials_admitted = 0;
        inner.trials_succeeded = 0;
        inner.last_trial_at = None;

        match next {
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                inner.metrics.times_opened += 1;
                warn!(
                    endpoint = %self.endpoint,
                    from = ?previous,
                    consecutive_failures = inner.metrics.consecutive_failures,
                    timeout_seconds = self.settings.timeout.as_secs(),
                    "🔴 CIRCUIT: Breaker opened (failing fast)"
                );
            }
            CircuitState::HalfOpen => {
                info!(
                    endpoint = %self.endpoint,
                    trials = self.trial_limit(),
                    "🟡 CIRCUIT: Breaker half-open (testing recovery)"
                );
            }
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.metrics.consecutive_failures = 0;
                info!(
                    endpoint = %self.endpoint,
                    from = ?previous,
                    "🟢 CIRCUIT: Breaker closed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(failure_threshold: usize, timeout: Duration, success_threshold: usize) -> CircuitBreaker {
        CircuitBreaker::new(
            "database",
            CircuitBreakerSettings {
                failure_threshold,
                timeout,
                success_threshold,
            },
        )
    }

    #[tokio::test]
    async fn test_call_passes_through_when_closed() {
        let circuit = breaker(3, Duration::from_millis(100), 2);

        let result = circuit.call(|| async { Ok::<_, String>("rows") }).await;
        assert_eq!(result.unwrap(), "rows");

        let metrics = circuit.metrics();
        assert_eq!(metrics.state, CircuitState::Closed);
        assert_eq!(metrics.successes, 1);
        assert_eq!(metrics.failures, 0);
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures_and_rejects() {
        let circuit = breaker(2, Duration::from_secs(60), 1);

        let _ = circuit.call(|| async { Err::<(), _>("reset") }).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
        let _ = circuit.call(|| async { Err::<(), _>("reset") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let result = circuit.call(|| async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen { .. })));

        let metrics = circuit.metrics();
        assert_eq!(metrics.times_opened, 1);
        assert_eq!(metrics.rejections, 1);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let circuit = breaker(3, Duration::from_secs(60), 1);
        circuit.record_failure(Some(DbErrorKind::Timeout));
        circuit.record_failure(Some(DbErrorKind::Timeout));
        circuit.record_success();
        circuit.record_failure(Some(DbErrorKind::ConnectionReset));
        assert_eq!(circuit.state(), CircuitState::Closed);

        let metrics = circuit.metrics();
        assert_eq!(metrics.consecutive_failures, 1);
        assert_eq!(metrics.failures_by_kind.get(&DbErrorKind::Timeout), Some(&2));
        assert_eq!(metrics.last_failure_kind, Some(DbErrorKind::ConnectionReset));
    }

    #[tokio::test]
    async fn test_half_open_trials_close_the_circuit() {
        let circuit = breaker(1, Duration::from_millis(30), 2);
        circuit.record_failure(None);
        assert!(!circuit.should_allow());

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(circuit.should_allow());
        assert_eq!(circuit.state(), CircuitState::HalfOpen);
        assert!(circuit.should_allow());
        // Trial budget spent until outcomes arrive
        assert!(!circuit.should_allow());

        circuit.record_success();
        assert_eq!(circuit.state(), CircuitState::HalfOpen);
        circuit.record_success();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(circuit.should_allow());
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let circuit = breaker(1, Duration::from_millis(20), 2);
        circuit.record_failure(None);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(circuit.should_allow());

        circuit.record_failure(Some(DbErrorKind::ConnectionRefused));
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.should_allow());
        assert_eq!(circuit.metrics().times_opened, 2);
    }

    #[tokio::test]
    async fn test_unreported_half_open_trial_expires() {
        let circuit = breaker(1, Duration::from_millis(50), 1);
        circuit.record_failure(None);
        tokio::time::sleep(Duration::from_millis(60)).await;

        // Admitted, then the caller goes away without reporting
        assert!(circuit.should_allow());
        assert!(!circuit.should_allow());
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(circuit.should_allow());
        assert_eq!(circuit.metrics().abandoned_trials, 1);

        circuit.record_success();
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[test]
    fn test_force_transitions_and_health() {
        let circuit = breaker(1, Duration::from_secs(1), 1);

        circuit.force_open();
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.is_healthy());

        circuit.force_closed();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(circuit.is_healthy());
    }
}

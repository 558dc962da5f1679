//! Runtime circuit breaker parameters.

use std::time::Duration;

/// Thresholds for a single circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures in the closed state before the circuit opens
    pub failure_threshold: usize,
    /// How long the circuit stays open before probing recovery
    pub timeout: Duration,
    /// Successful half-open calls required before closing again
    pub success_threshold: usize,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

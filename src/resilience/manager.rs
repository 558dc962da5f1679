//! # Circuit Breaker Manager
//!
//! Owns one [`CircuitBreaker`] per endpoint, created on first use from the
//! component or default configuration, and implements [`CircuitGate`] on top
//! of them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::CircuitBreakerConfig;
use crate::error::SentinelError;
use crate::resilience::{CircuitBreaker, CircuitBreakerMetrics, CircuitGate, CircuitState};

#[derive(Debug)]
pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerManager {
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        info!(
            enabled = config.enabled,
            components = config.component_configs.len(),
            "🛡️ Circuit breaker manager created"
        );

        Self {
            config: config.clone(),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get or lazily create the breaker for an endpoint
    pub async fn get_circuit_breaker(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().await.get(endpoint) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write().await;
        breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                debug!(endpoint = %endpoint, "Creating circuit breaker");
                let settings = self.config.config_for_component(endpoint).to_resilience_config();
                Arc::new(CircuitBreaker::new(endpoint, settings))
            })
            .clone()
    }

    /// States of every breaker created so far
    pub async fn states(&self) -> HashMap<String, CircuitState> {
        self.breakers
            .read()
            .await
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state()))
            .collect()
    }

    pub async fn metrics(&self) -> HashMap<String, CircuitBreakerMetrics> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.read().await.values().cloned().collect();
        breakers
            .into_iter()
            .map(|breaker| (breaker.endpoint().to_string(), breaker.metrics()))
            .collect()
    }

    /// Average breaker health (closed 100, half-open 50, open 0)
    pub async fn health_score(&self) -> f64 {
        let states = self.states().await;
        if states.is_empty() {
            return 100.0;
        }
        states.values().map(CircuitState::health_score).sum::<f64>() / states.len() as f64
    }
}

#[async_trait]
impl CircuitGate for CircuitBreakerManager {
    async fn should_allow(&self, endpoint: &str) -> bool {
        if !self.config.enabled {
            return true;
        }
        self.get_circuit_breaker(endpoint).await.should_allow()
    }

    async fn record_success(&self, endpoint: &str) {
        if self.config.enabled {
            self.get_circuit_breaker(endpoint).await.record_success();
        }
    }

    async fn record_failure(&self, endpoint: &str, error: &SentinelError) {
        if self.config.enabled {
            debug!(endpoint = %endpoint, error = %error, "Recording endpoint failure");
            self.get_circuit_breaker(endpoint)
                .await
                .record_failure(error.database_kind());
        }
    }
}

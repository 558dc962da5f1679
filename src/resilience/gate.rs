//! Circuit gate seam consulted before every session acquisition.

use async_trait::async_trait;

use crate::error::SentinelError;

/// Decides whether an operation against an endpoint may proceed and
/// receives the outcome afterwards
#[async_trait]
pub trait CircuitGate: Send + Sync {
    async fn should_allow(&self, endpoint: &str) -> bool;

    async fn record_success(&self, endpoint: &str);

    async fn record_failure(&self, endpoint: &str, error: &SentinelError);
}

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::{
    AlternativesContext, ConfirmationContext, ExtractedFields, ExtractionMode, PatientInfo,
    PatientReply,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Transport failure or provider outage. Worth retrying.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    #[error("gateway timed out after {0:?}")]
    Timeout(Duration),

    /// The provider answered, but not with the structure we asked for.
    #[error("malformed gateway output: {0}")]
    Malformed(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_) | GatewayError::Timeout(_))
    }
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        GatewayError::Unavailable(format!("{err:#}"))
    }
}

/// Text-to-structure service the workflow relies on. Implementations own the defaults for
/// fields the text leaves out.
#[async_trait]
pub trait ExtractionGateway: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        mode: ExtractionMode,
    ) -> Result<ExtractedFields, GatewayError>;

    async fn compose_alternatives(
        &self,
        ctx: &AlternativesContext,
    ) -> Result<String, GatewayError>;

    async fn compose_confirmation(
        &self,
        ctx: &ConfirmationContext,
    ) -> Result<String, GatewayError>;
}

/// The other side of the conversation. In the demo this is a simulated patient.
#[async_trait]
pub trait PatientResponder: Send + Sync {
    /// Writes a fresh appointment request email.
    async fn write_request(&self) -> Result<String, GatewayError>;

    async fn respond_to_slots(
        &self,
        patient: &PatientInfo,
        draft: &str,
    ) -> Result<PatientReply, GatewayError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the policy runs out of
/// attempts. Backoff doubles after every failed attempt.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "{what} failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(error = %e, attempt, "{what} failed");
                return Err(e);
            }
        }
    }
}

//! Per-UPF association tasks

use crate::{Result, UpfNode};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One association handshake attempt with a UPF
#[async_trait]
pub trait UpfAssociation: Send + Sync {
    async fn associate(&self, upf: &UpfNode) -> Result<()>;
}

/// Backoff policy between failed association attempts
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Delay after the first failure
    pub initial_backoff: Duration,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
    /// Fraction of the delay added as random jitter (0.0 disables jitter)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff without jitter for the given retry count
    pub fn backoff_duration(&self, retry_count: u32) -> Duration {
        let base = self.initial_backoff.as_millis() as u64;
        let exponential = 2u64.saturating_pow(retry_count);
        let backoff_ms = base
            .saturating_mul(exponential)
            .min(self.max_backoff.as_millis() as u64);
        Duration::from_millis(backoff_ms)
    }

    /// Backoff with jitter applied, still capped at `max_backoff`
    pub fn jittered_backoff(&self, retry_count: u32) -> Duration {
        let backoff = self.backoff_duration(retry_count);
        if self.jitter <= 0.0 {
            return backoff;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(0.0..self.jitter);
        backoff.mul_f64(factor).min(self.max_backoff)
    }
}

/// How an association task ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssociationOutcome {
    Associated,
    Cancelled,
}

/// Drive association with one UPF until it succeeds or `cancel` fires.
///
/// Failures are retried with backoff; they never affect other UPFs.
pub async fn associate_with_upf(
    cancel: CancellationToken,
    upf: Arc<UpfNode>,
    association: Arc<dyn UpfAssociation>,
    retry: RetryPolicy,
) -> AssociationOutcome {
    let mut retry_count: u32 = 0;
    loop {
        debug!(upf = %upf.node_id, attempt = retry_count + 1, "PFCP association attempt");
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return AssociationOutcome::Cancelled,
            result = association.associate(&upf) => result,
        };

        match result {
            Ok(()) => {
                upf.mark_associated();
                return AssociationOutcome::Associated;
            }
            Err(e) => {
                let delay = retry.jittered_backoff(retry_count);
                warn!(
                    upf = %upf.node_id,
                    "PFCP association with {} failed: {}; retrying in {:?}",
                    upf.addr, e, delay
                );
                retry_count = retry_count.saturating_add(1);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return AssociationOutcome::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

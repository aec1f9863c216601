//! Remote read gateway: bounded, fixed-delay retry for transient failures.
//!
//! Every read and write submission against the collaborators goes through
//! [`Gateway::call`]. Only `VaultError::TransientNetwork` is retried; any
//! other error propagates on first occurrence. The gateway keeps no state
//! between calls and is safe to share across concurrent workflows.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{GatewayConfig, TransactionConfig};
use crate::errors::VaultError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Policy for the configured mode. With resilient mode off every call
    /// gets exactly one attempt.
    pub fn from_config(gateway: &GatewayConfig, transactions: &TransactionConfig) -> Self {
        if !transactions.resilient_mode {
            return Self::single_attempt();
        }
        Self {
            max_attempts: gateway.max_attempts.max(1),
            delay: Duration::from_millis(gateway.retry_delay_ms),
        }
    }

    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Gateway {
    policy: RetryPolicy,
}

impl Gateway {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `thunk` under the retry policy.
    ///
    /// A thunk that keeps failing transiently surfaces
    /// `VaultError::RetriesExhausted` wrapping the last failure, which is
    /// distinct from a deterministic rejection.
    pub async fn call<T, F, Fut>(&self, operation: &str, mut thunk: F) -> Result<T, VaultError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, VaultError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match thunk().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation, attempt, "remote call recovered after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    if attempt >= max_attempts {
                        warn!(operation, attempts = attempt, error = %e, "retries exhausted");
                        return Err(VaultError::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = self.policy.delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

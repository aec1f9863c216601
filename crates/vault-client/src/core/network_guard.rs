//! Network guard: identity, network and liveness checks ahead of every
//! state-mutating workflow.
//!
//! Checks run in order and fail fast on the first miss, each with its own
//! `Precondition` reason. The guard issues single attempts; it never goes
//! through the retry gateway.

use std::sync::Arc;

use alloy::primitives::Address;
use tracing::{debug, warn};

use crate::errors::{Precondition, VaultError};
use crate::execution::Connectivity;

pub struct NetworkGuard {
    connectivity: Arc<dyn Connectivity>,
    expected_network: u64,
}

impl NetworkGuard {
    pub fn new(connectivity: Arc<dyn Connectivity>, expected_network: u64) -> Self {
        Self {
            connectivity,
            expected_network,
        }
    }

    /// Verify that `identity` is set, the provider is on the supported
    /// network and the remote service answers a liveness check.
    ///
    /// Returns the checked identity.
    pub async fn assert_ready(&self, identity: Option<Address>) -> Result<Address, VaultError> {
        let Some(owner) = identity else {
            return Err(Precondition::NoIdentity.into());
        };

        let actual = self.connectivity.network_id().await.map_err(|e| {
            warn!(error = %e, "network id check failed");
            unreachable_from(&e)
        })?;
        if actual != self.expected_network {
            warn!(expected = self.expected_network, actual, "wrong network");
            return Err(Precondition::WrongNetwork {
                expected: self.expected_network,
                actual,
            }
            .into());
        }

        let height = self.connectivity.block_height().await.map_err(|e| {
            warn!(error = %e, "liveness check failed");
            unreachable_from(&e)
        })?;

        debug!(%owner, network = actual, height, "network guard passed");
        Ok(owner)
    }
}

fn unreachable_from(err: &VaultError) -> VaultError {
    Precondition::Unreachable {
        reason: err.to_string(),
    }
    .into()
}

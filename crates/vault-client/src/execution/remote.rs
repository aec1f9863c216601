//! Collaborator capability surface consumed by the core.
//!
//! The snapshot builder, network guard and orchestrator only see these
//! traits. `evm_client` implements them over JSON-RPC; tests use in-memory
//! doubles. Amounts cross this boundary as raw 18-decimal `U256` values and
//! every error is already tagged with its [`VaultError`] variant.

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::Serialize;

use crate::errors::VaultError;

/// Handle to a submitted, not yet confirmed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TxHandle {
    pub hash: B256,
}

/// Terminal, successful outcome of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Collateral price, WAD-scaled.
    async fn get_price(&self) -> Result<U256, VaultError>;
}

#[async_trait]
pub trait CollateralToken: Send + Sync {
    fn address(&self) -> Address;

    async fn balance_of(&self, owner: Address) -> Result<U256, VaultError>;

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, VaultError>;

    /// Submit an approval. `gas_limit` of `None` lets the adapter estimate.
    async fn approve(
        &self,
        spender: Address,
        amount: U256,
        gas_limit: Option<u64>,
    ) -> Result<TxHandle, VaultError>;
}

#[async_trait]
pub trait VaultService: Send + Sync {
    fn address(&self) -> Address;

    async fn user_collateral(&self, user: Address) -> Result<U256, VaultError>;

    async fn user_debt(&self, user: Address) -> Result<U256, VaultError>;

    /// Accrued interest through whichever accessor the deployment exposes.
    async fn pending_interest(&self, user: Address) -> Result<U256, VaultError>;

    async fn borrow_rate_bps(&self) -> Result<u64, VaultError>;

    async fn deposit(&self, amount: U256) -> Result<TxHandle, VaultError>;

    /// Estimated execution budget (gas) for `borrow(amount)`.
    async fn estimate_borrow(&self, amount: U256) -> Result<u64, VaultError>;

    async fn borrow(&self, amount: U256, gas_limit: u64) -> Result<TxHandle, VaultError>;
}

#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn network_id(&self) -> Result<u64, VaultError>;

    /// Lightweight liveness check.
    async fn block_height(&self) -> Result<u64, VaultError>;

    /// Account the wallet exposes for signing.
    async fn request_account(&self) -> Result<Address, VaultError>;

    /// Wait for a submitted write to be mined.
    ///
    /// Returns `TxReverted` for a failed receipt. There is no client-side
    /// timeout.
    async fn confirm(&self, tx: TxHandle) -> Result<Confirmation, VaultError>;
}

/// The four collaborators, shared by every component of one session.
#[derive(Clone)]
pub struct VaultServices {
    pub oracle: Arc<dyn PriceOracle>,
    pub token: Arc<dyn CollateralToken>,
    pub vault: Arc<dyn VaultService>,
    pub connectivity: Arc<dyn Connectivity>,
}

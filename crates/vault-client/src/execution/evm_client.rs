//! Alloy-backed implementations of the collaborator traits.
//!
//! One HTTP provider is shared by the price feed, token, vault and
//! connectivity adapters. Writes go through [`TxSubmitter`] when a signer is
//! configured; without one the services are read-only and every write
//! fails with `Precondition::NoWalletProvider` before anything is sent.
//!
//! This module is the only place where raw JSON-RPC failures are turned
//! into [`VaultError`] variants.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::json_rpc::ErrorPayload;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use alloy::transports::http::reqwest::Url;
use alloy::transports::{RpcError, TransportError, TransportErrorKind};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{ClientConfig, InterestAccessor};
use crate::errors::{Precondition, VaultError};

use super::contracts::{IPriceFeed, IVault, IERC20};
use super::remote::{
    CollateralToken, Confirmation, Connectivity, PriceOracle, TxHandle, VaultService,
    VaultServices,
};
use super::tx_submitter::TxSubmitter;

/// Concrete provider type: Alloy HTTP provider over Ethereum network.
pub type HttpProvider = RootProvider;

// JSON-RPC / EIP-1193 error codes.
const EXECUTION_REVERTED_CODE: i64 = 3;
const USER_REJECTED_CODE: i64 = 4001;
const SERVER_ERROR_CODE: i64 = -32000;
const INTERNAL_ERROR_CODE: i64 = -32603;
const LIMIT_EXCEEDED_CODE: i64 = -32005;

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Build the four services for the configured network.
///
/// `signer` of `None` yields read-only services.
pub fn build_services(
    config: &ClientConfig,
    signer: Option<PrivateKeySigner>,
) -> Result<VaultServices, VaultError> {
    let rpc_url: Url = config
        .network
        .rpc
        .http_url
        .parse()
        .map_err(|e| VaultError::Config(format!("invalid RPC URL: {e}")))?;
    let provider = RootProvider::new_http(rpc_url);

    let contracts = &config.network.contracts;
    let token_addr = parse_address("collateral_token", &contracts.collateral_token)?;
    let vault_addr = parse_address("vault", &contracts.vault)?;
    let feed_addr = parse_address("price_feed", &contracts.price_feed)?;

    let submitter = signer.map(|signer| {
        Arc::new(TxSubmitter::new(
            provider.clone(),
            signer,
            &config.gateway,
            config.network.chain_id,
        ))
    });

    info!(
        chain_id = config.network.chain_id,
        vault = %vault_addr,
        token = %token_addr,
        price_feed = %feed_addr,
        interest_accessor = config.network.vault.interest_accessor.method_name(),
        read_only = submitter.is_none(),
        "EVM services initialized"
    );

    Ok(VaultServices {
        oracle: Arc::new(EvmPriceFeed {
            feed: IPriceFeed::new(feed_addr, provider.clone()),
        }),
        token: Arc::new(EvmCollateralToken {
            token: IERC20::new(token_addr, provider.clone()),
            submitter: submitter.clone(),
        }),
        vault: Arc::new(EvmVault {
            vault: IVault::new(vault_addr, provider.clone()),
            accessor: config.network.vault.interest_accessor,
            submitter: submitter.clone(),
        }),
        connectivity: Arc::new(EvmConnectivity {
            provider,
            submitter,
        }),
    })
}

fn parse_address(name: &str, raw: &str) -> Result<Address, VaultError> {
    raw.parse()
        .map_err(|e| VaultError::Config(format!("invalid {name} address '{raw}': {e}")))
}

fn require_submitter(submitter: &Option<Arc<TxSubmitter>>) -> Result<&TxSubmitter, VaultError> {
    submitter
        .as_deref()
        .ok_or_else(|| Precondition::NoWalletProvider.into())
}

// ---------------------------------------------------------------------------
// Price feed
// ---------------------------------------------------------------------------

pub struct EvmPriceFeed {
    feed: IPriceFeed::IPriceFeedInstance<HttpProvider>,
}

#[async_trait]
impl PriceOracle for EvmPriceFeed {
    async fn get_price(&self) -> Result<U256, VaultError> {
        let price = self
            .feed
            .getPrice()
            .call()
            .await
            .map_err(|e| classify_contract_error("getPrice", e))?;
        debug!(price = %price, "price feed reading");
        Ok(price)
    }
}

// ---------------------------------------------------------------------------
// Collateral token
// ---------------------------------------------------------------------------

pub struct EvmCollateralToken {
    token: IERC20::IERC20Instance<HttpProvider>,
    submitter: Option<Arc<TxSubmitter>>,
}

#[async_trait]
impl CollateralToken for EvmCollateralToken {
    fn address(&self) -> Address {
        *self.token.address()
    }

    async fn balance_of(&self, owner: Address) -> Result<U256, VaultError> {
        self.token
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| classify_contract_error("balanceOf", e))
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, VaultError> {
        self.token
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| classify_contract_error("allowance", e))
    }

    async fn approve(
        &self,
        spender: Address,
        amount: U256,
        gas_limit: Option<u64>,
    ) -> Result<TxHandle, VaultError> {
        let submitter = require_submitter(&self.submitter)?;
        let input = Bytes::from(IERC20::approveCall { spender, amount }.abi_encode());
        let hash = submitter
            .submit("approve", *self.token.address(), input, gas_limit)
            .await?;
        Ok(TxHandle { hash })
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

pub struct EvmVault {
    vault: IVault::IVaultInstance<HttpProvider>,
    accessor: InterestAccessor,
    submitter: Option<Arc<TxSubmitter>>,
}

#[async_trait]
impl VaultService for EvmVault {
    fn address(&self) -> Address {
        *self.vault.address()
    }

    async fn user_collateral(&self, user: Address) -> Result<U256, VaultError> {
        self.vault
            .getUserCollateral(user)
            .call()
            .await
            .map_err(|e| classify_contract_error("getUserCollateral", e))
    }

    async fn user_debt(&self, user: Address) -> Result<U256, VaultError> {
        self.vault
            .getUserDebt(user)
            .call()
            .await
            .map_err(|e| classify_contract_error("getUserDebt", e))
    }

    async fn pending_interest(&self, user: Address) -> Result<U256, VaultError> {
        let operation = self.accessor.method_name();
        let result = match self.accessor {
            InterestAccessor::VaultInfo => self
                .vault
                .getVaultInfo(user)
                .call()
                .await
                .map(|info| info.pendingInterest),
            InterestAccessor::PendingInterest => {
                self.vault.getPendingInterest(user).call().await
            }
            InterestAccessor::CalculateInterest => {
                self.vault.calculateInterest(user).call().await
            }
        };
        result.map_err(|e| classify_contract_error(operation, e))
    }

    async fn borrow_rate_bps(&self) -> Result<u64, VaultError> {
        let rate = self
            .vault
            .borrowRate()
            .call()
            .await
            .map_err(|e| classify_contract_error("borrowRate", e))?;
        u64::try_from(rate)
            .map_err(|_| VaultError::rejected("borrowRate", format!("rate {rate} out of range")))
    }

    async fn deposit(&self, amount: U256) -> Result<TxHandle, VaultError> {
        let submitter = require_submitter(&self.submitter)?;
        let input = Bytes::from(IVault::depositCall { amount }.abi_encode());
        let hash = submitter
            .submit("deposit", *self.vault.address(), input, None)
            .await?;
        Ok(TxHandle { hash })
    }

    async fn estimate_borrow(&self, amount: U256) -> Result<u64, VaultError> {
        let submitter = require_submitter(&self.submitter)?;
        let input = Bytes::from(IVault::borrowCall { amount }.abi_encode());
        submitter
            .estimate_gas("estimateGas(borrow)", *self.vault.address(), input)
            .await
    }

    async fn borrow(&self, amount: U256, gas_limit: u64) -> Result<TxHandle, VaultError> {
        let submitter = require_submitter(&self.submitter)?;
        let input = Bytes::from(IVault::borrowCall { amount }.abi_encode());
        let hash = submitter
            .submit("borrow", *self.vault.address(), input, Some(gas_limit))
            .await?;
        Ok(TxHandle { hash })
    }
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

pub struct EvmConnectivity {
    provider: HttpProvider,
    submitter: Option<Arc<TxSubmitter>>,
}

#[async_trait]
impl Connectivity for EvmConnectivity {
    async fn network_id(&self) -> Result<u64, VaultError> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| classify_rpc_error("eth_chainId", &e))
    }

    async fn block_height(&self) -> Result<u64, VaultError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| classify_rpc_error("eth_blockNumber", &e))
    }

    async fn request_account(&self) -> Result<Address, VaultError> {
        Ok(require_submitter(&self.submitter)?.signer_address())
    }

    async fn confirm(&self, tx: TxHandle) -> Result<Confirmation, VaultError> {
        require_submitter(&self.submitter)?
            .wait_for_receipt(tx.hash)
            .await
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Tag a contract binding failure. Only transport failures can be transient;
/// ABI and decoding failures are deterministic.
pub(crate) fn classify_contract_error(operation: &str, err: alloy::contract::Error) -> VaultError {
    match err {
        alloy::contract::Error::TransportError(e) => classify_rpc_error(operation, &e),
        other => VaultError::rejected(operation, other.to_string()),
    }
}

/// Tag a raw JSON-RPC failure with its [`VaultError`] variant.
pub(crate) fn classify_rpc_error(operation: &str, err: &TransportError) -> VaultError {
    match err {
        RpcError::ErrorResp(payload) => classify_error_payload(operation, payload),
        RpcError::Transport(TransportErrorKind::HttpError(http))
            if http.status == 429 || http.status >= 500 =>
        {
            VaultError::transient(operation, format!("HTTP {}", http.status))
        }
        RpcError::Transport(TransportErrorKind::HttpError(http)) => {
            VaultError::rejected(operation, format!("HTTP {}: {}", http.status, http.body))
        }
        RpcError::Transport(kind) => VaultError::transient(operation, kind.to_string()),
        RpcError::NullResp => VaultError::transient(operation, "null response"),
        other => VaultError::rejected(operation, other.to_string()),
    }
}

fn classify_error_payload(operation: &str, payload: &ErrorPayload) -> VaultError {
    if let Some(data) = payload.as_revert_data() {
        return VaultError::rejected(operation, TxSubmitter::decode_revert_reason(&data));
    }

    let message = payload.message.to_string();
    match payload.code {
        USER_REJECTED_CODE => VaultError::UserDeclined { reason: message },
        EXECUTION_REVERTED_CODE => VaultError::rejected(operation, message),
        SERVER_ERROR_CODE if message.to_lowercase().contains("insufficient funds") => {
            VaultError::InsufficientFunds { reason: message }
        }
        INTERNAL_ERROR_CODE | LIMIT_EXCEEDED_CODE => VaultError::transient(
            operation,
            format!("JSON-RPC error {}: {message}", payload.code),
        ),
        code => VaultError::rejected(operation, format!("{message} (code {code})")),
    }
}

//! In-memory collaborator doubles for workflow tests.
//!
//! `MockChain` implements all four collaborator traits over one shared
//! state. Writes are recorded as pending and only take effect when
//! confirmed, so a failed confirmation leaves balances untouched. Every
//! call is counted per operation and failures can be scripted per
//! operation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::config::{
    AppConfig, ClientConfig, ContractsConfig, GatewayConfig, LoggingConfig, NetworkConfig,
    RpcConfig, TransactionConfig, VaultConfig,
};
use crate::constants::{AMOY_CHAIN_ID, AMOY_COLLATERAL_TOKEN, AMOY_PRICE_FEED, AMOY_VAULT};
use crate::errors::{Precondition, VaultError};
use crate::execution::{
    CollateralToken, Confirmation, Connectivity, PriceOracle, TxHandle, VaultService,
    VaultServices,
};
use crate::types::wad::decimal_to_wad;

pub const USER: Address = Address::repeat_byte(0xAA);

/// WAD-scale a decimal literal for test setup.
pub fn wad(amount: Decimal) -> U256 {
    decimal_to_wad(amount).unwrap()
}

/// Failure shape to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Transient,
    Rejected,
    Declined,
    InsufficientFunds,
    Reverted,
}

impl Fault {
    fn to_error(self, operation: &str) -> VaultError {
        match self {
            Fault::Transient => VaultError::transient(operation, "connection reset"),
            Fault::Rejected => VaultError::rejected(operation, "execution reverted"),
            Fault::Declined => VaultError::UserDeclined {
                reason: "User denied transaction signature".into(),
            },
            Fault::InsufficientFunds => VaultError::InsufficientFunds {
                reason: "insufficient funds for gas * price + value".into(),
            },
            Fault::Reverted => VaultError::TxReverted {
                tx_hash: "0xdead".into(),
                reason: "transaction reverted on-chain".into(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Effect {
    Approve(U256),
    Deposit(U256),
    Borrow(U256),
}

#[derive(Debug, Clone)]
pub struct ChainState {
    pub network_id: u64,
    pub block_height: u64,
    /// `None` models a session with no wallet provider.
    pub account: Option<Address>,
    pub price: U256,
    pub balance: U256,
    pub allowance: U256,
    pub collateral: U256,
    pub debt: U256,
    pub interest: U256,
    pub borrow_rate_bps: u64,
    pub gas_estimate: u64,
    pub confirm_delay: Duration,
}

impl Default for ChainState {
    fn default() -> Self {
        Self {
            network_id: AMOY_CHAIN_ID,
            block_height: 1_000,
            account: Some(USER),
            price: wad(Decimal::new(40, 2)),
            balance: U256::ZERO,
            allowance: U256::ZERO,
            collateral: U256::ZERO,
            debt: U256::ZERO,
            interest: U256::ZERO,
            borrow_rate_bps: 500,
            gas_estimate: 200_000,
            confirm_delay: Duration::ZERO,
        }
    }
}

struct Script {
    fault: Fault,
    /// `None` fails forever.
    remaining: Option<u32>,
}

#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
    scripts: Mutex<HashMap<&'static str, VecDeque<Script>>>,
    calls: Mutex<HashMap<&'static str, u32>>,
    pending: Mutex<HashMap<B256, Effect>>,
    gas_limits: Mutex<HashMap<&'static str, Option<u64>>>,
    next_tx: Mutex<u8>,
}

impl MockChain {
    pub fn new(state: ChainState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            ..Default::default()
        })
    }

    /// Bundle this chain as the four collaborator services.
    pub fn services(self: &Arc<Self>) -> VaultServices {
        VaultServices {
            oracle: self.clone(),
            token: self.clone(),
            vault: self.clone(),
            connectivity: self.clone(),
        }
    }

    /// Fail the next `times` calls of `operation`.
    pub fn fail(&self, operation: &'static str, fault: Fault, times: u32) {
        self.push_script(operation, fault, Some(times));
    }

    /// Fail every call of `operation`.
    pub fn fail_always(&self, operation: &'static str, fault: Fault) {
        self.push_script(operation, fault, None);
    }

    pub fn calls(&self, operation: &str) -> u32 {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    /// Gas limit passed to the last call of a write operation.
    pub fn last_gas_limit(&self, operation: &str) -> Option<u64> {
        self.gas_limits.lock().unwrap().get(operation).copied().flatten()
    }

    pub fn state(&self) -> ChainState {
        self.state.lock().unwrap().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut ChainState)) {
        f(&mut self.state.lock().unwrap());
    }

    fn push_script(&self, operation: &'static str, fault: Fault, remaining: Option<u32>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(Script { fault, remaining });
    }

    /// Count the call and return the scripted failure, if any.
    fn enter(&self, operation: &'static str) -> Result<(), VaultError> {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;

        let mut scripts = self.scripts.lock().unwrap();
        let Some(queue) = scripts.get_mut(operation) else {
            return Ok(());
        };
        let Some(script) = queue.front_mut() else {
            return Ok(());
        };
        let fault = script.fault;
        match script.remaining.as_mut() {
            None => {}
            Some(n) => {
                *n -= 1;
                if *n == 0 {
                    queue.pop_front();
                }
            }
        }
        Err(fault.to_error(operation))
    }

    fn record_write(&self, operation: &'static str, gas_limit: Option<u64>, effect: Effect) -> TxHandle {
        self.gas_limits.lock().unwrap().insert(operation, gas_limit);
        let mut next = self.next_tx.lock().unwrap();
        *next += 1;
        let hash = B256::with_last_byte(*next);
        self.pending.lock().unwrap().insert(hash, effect);
        TxHandle { hash }
    }

    fn apply(&self, effect: Effect) {
        let mut state = self.state.lock().unwrap();
        match effect {
            Effect::Approve(amount) => state.allowance = amount,
            Effect::Deposit(amount) => {
                state.balance = state.balance.saturating_sub(amount);
                state.allowance = state.allowance.saturating_sub(amount);
                state.collateral += amount;
            }
            Effect::Borrow(amount) => state.debt += amount,
        }
    }
}

#[async_trait]
impl PriceOracle for MockChain {
    async fn get_price(&self) -> Result<U256, VaultError> {
        self.enter("get_price")?;
        Ok(self.state.lock().unwrap().price)
    }
}

#[async_trait]
impl CollateralToken for MockChain {
    fn address(&self) -> Address {
        AMOY_COLLATERAL_TOKEN
    }

    async fn balance_of(&self, _owner: Address) -> Result<U256, VaultError> {
        self.enter("balance_of")?;
        Ok(self.state.lock().unwrap().balance)
    }

    async fn allowance(&self, _owner: Address, _spender: Address) -> Result<U256, VaultError> {
        self.enter("allowance")?;
        Ok(self.state.lock().unwrap().allowance)
    }

    async fn approve(
        &self,
        _spender: Address,
        amount: U256,
        gas_limit: Option<u64>,
    ) -> Result<TxHandle, VaultError> {
        self.enter("approve")?;
        Ok(self.record_write("approve", gas_limit, Effect::Approve(amount)))
    }
}

#[async_trait]
impl VaultService for MockChain {
    fn address(&self) -> Address {
        AMOY_VAULT
    }

    async fn user_collateral(&self, _user: Address) -> Result<U256, VaultError> {
        self.enter("user_collateral")?;
        Ok(self.state.lock().unwrap().collateral)
    }

    async fn user_debt(&self, _user: Address) -> Result<U256, VaultError> {
        self.enter("user_debt")?;
        Ok(self.state.lock().unwrap().debt)
    }

    async fn pending_interest(&self, _user: Address) -> Result<U256, VaultError> {
        self.enter("pending_interest")?;
        Ok(self.state.lock().unwrap().interest)
    }

    async fn borrow_rate_bps(&self) -> Result<u64, VaultError> {
        self.enter("borrow_rate")?;
        Ok(self.state.lock().unwrap().borrow_rate_bps)
    }

    async fn deposit(&self, amount: U256) -> Result<TxHandle, VaultError> {
        self.enter("deposit")?;
        Ok(self.record_write("deposit", None, Effect::Deposit(amount)))
    }

    async fn estimate_borrow(&self, _amount: U256) -> Result<u64, VaultError> {
        self.enter("estimate_borrow")?;
        Ok(self.state.lock().unwrap().gas_estimate)
    }

    async fn borrow(&self, amount: U256, gas_limit: u64) -> Result<TxHandle, VaultError> {
        self.enter("borrow")?;
        Ok(self.record_write("borrow", Some(gas_limit), Effect::Borrow(amount)))
    }
}

#[async_trait]
impl Connectivity for MockChain {
    async fn network_id(&self) -> Result<u64, VaultError> {
        self.enter("network_id")?;
        Ok(self.state.lock().unwrap().network_id)
    }

    async fn block_height(&self) -> Result<u64, VaultError> {
        self.enter("block_height")?;
        Ok(self.state.lock().unwrap().block_height)
    }

    async fn request_account(&self) -> Result<Address, VaultError> {
        self.enter("request_account")?;
        self.state
            .lock()
            .unwrap()
            .account
            .ok_or_else(|| Precondition::NoWalletProvider.into())
    }

    async fn confirm(&self, tx: TxHandle) -> Result<Confirmation, VaultError> {
        self.enter("confirm")?;
        let delay = self.state.lock().unwrap().confirm_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let effect = self.pending.lock().unwrap().remove(&tx.hash);
        if let Some(effect) = effect {
            self.apply(effect);
        }
        let mut state = self.state.lock().unwrap();
        state.block_height += 1;
        Ok(Confirmation {
            tx_hash: tx.hash,
            block_number: Some(state.block_height),
            gas_used: 21_000,
        })
    }
}

/// Config matching the mock chain's defaults.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        app: AppConfig {
            active_network: AMOY_CHAIN_ID,
            logging: LoggingConfig::default(),
        },
        network: NetworkConfig {
            chain_id: AMOY_CHAIN_ID,
            chain_name: "Polygon Amoy Testnet".into(),
            rpc: RpcConfig {
                http_url: "http://127.0.0.1:8545".into(),
            },
            contracts: ContractsConfig {
                collateral_token: AMOY_COLLATERAL_TOKEN.to_string(),
                vault: AMOY_VAULT.to_string(),
                price_feed: AMOY_PRICE_FEED.to_string(),
            },
            vault: VaultConfig::default(),
        },
        gateway: GatewayConfig {
            retry_delay_ms: 10,
            ..GatewayConfig::default()
        },
        transactions: TransactionConfig::default(),
    }
}

//! Transaction submitter: local signing, raw submission, receipt polling.
//!
//! Signs legacy transactions with a local key and sends the raw bytes over
//! the configured RPC. The nonce counter is guarded by an async mutex and
//! only advances once a send has been accepted. A retried submit of the
//! same call resends the same signed bytes, so a send that reached the
//! node before its error did is never doubled by a second signature.

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::providers::Provider;
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::errors::VaultError;
use crate::execution::evm_client::{classify_rpc_error, HttpProvider};
use crate::execution::remote::Confirmation;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// `Error(string)` selector: `keccak256("Error(string)")[0..4]`.
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// `Panic(uint256)` selector: `keccak256("Panic(uint256)")[0..4]`.
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Gas price safety buffer, in percent of the node's quoted price.
const GAS_PRICE_BUFFER_PCT: u128 = 110;

// ---------------------------------------------------------------------------
// TxSubmitter
// ---------------------------------------------------------------------------

pub struct TxSubmitter {
    provider: HttpProvider,
    signer: PrivateKeySigner,
    nonce: Mutex<NonceState>,
    poll_interval: Duration,
    max_poll_failures: u32,
    chain_id: u64,
}

impl TxSubmitter {
    pub fn new(
        provider: HttpProvider,
        signer: PrivateKeySigner,
        gateway: &GatewayConfig,
        chain_id: u64,
    ) -> Self {
        info!(
            address = %signer.address(),
            chain_id,
            poll_interval_ms = gateway.receipt_poll_interval_ms,
            max_poll_failures = gateway.max_receipt_poll_failures,
            "TxSubmitter initialized"
        );

        Self {
            provider,
            signer,
            nonce: Mutex::new(NonceState::default()),
            poll_interval: Duration::from_millis(gateway.receipt_poll_interval_ms),
            max_poll_failures: gateway.max_receipt_poll_failures,
            chain_id,
        }
    }

    /// Returns the address associated with the signer.
    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Estimate gas for a call from the signer to `to`.
    pub async fn estimate_gas(
        &self,
        operation: &str,
        to: Address,
        input: Bytes,
    ) -> Result<u64, VaultError> {
        let request = TransactionRequest {
            from: Some(self.signer.address()),
            to: Some(TxKind::Call(to)),
            input: TransactionInput::new(input),
            ..Default::default()
        };
        let estimate = self
            .provider
            .estimate_gas(request)
            .await
            .map_err(|e| classify_rpc_error(operation, &e))?;
        debug!(operation, estimate, "gas estimated");
        Ok(estimate)
    }

    /// Sign and submit a call to `to`.
    ///
    /// Estimates gas when `gas_limit` is `None`. Returns the transaction
    /// hash once the node has accepted the raw transaction.
    ///
    /// A send that failed transiently may still have reached the mempool.
    /// Its signed bytes are held, and the next submit of the same call
    /// resends them unchanged instead of signing a second transaction at
    /// the same nonce. If the node already knows the held hash, that hash
    /// is returned without resending.
    pub async fn submit(
        &self,
        operation: &str,
        to: Address,
        input: Bytes,
        gas_limit: Option<u64>,
    ) -> Result<B256, VaultError> {
        // Held across the send so concurrent submissions cannot share a nonce.
        let mut state = self.nonce.lock().await;

        if let Some(held) = state.unsent.take() {
            let known = match self.is_known(operation, held.hash).await {
                Ok(known) => known,
                Err(e) => {
                    state.unsent = Some(held);
                    return Err(e);
                }
            };
            let (hash, nonce) = (held.hash, held.nonce);
            match state.settle_held(held, known, to, &input) {
                HeldTx::Accepted(hash) => {
                    info!(operation, tx_hash = %hash, nonce, "earlier send was accepted");
                    return Ok(hash);
                }
                HeldTx::Resend(signed) => {
                    info!(operation, tx_hash = %hash, nonce, "resending signed transaction");
                    return self.send_signed(&mut state, operation, signed).await;
                }
                HeldTx::Superseded if known => {
                    warn!(operation, tx_hash = %hash, nonce, "earlier send for a different call was accepted");
                }
                HeldTx::Superseded => {
                    debug!(operation, tx_hash = %hash, nonce, "dropping unsent transaction for a different call");
                }
            }
        }

        let gas_limit = match gas_limit {
            Some(limit) => limit,
            None => self.estimate_gas(operation, to, input.clone()).await?,
        };
        let gas_price = self.get_gas_price(operation).await?;

        let nonce = match state.next {
            Some(n) => n,
            None => {
                let n = self
                    .provider
                    .get_transaction_count(self.signer.address())
                    .await
                    .map_err(|e| classify_rpc_error(operation, &e))?;
                info!(nonce = n, "nonce initialized from chain");
                n
            }
        };

        let tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(to),
            value: U256::ZERO,
            input,
        };
        let signed = sign_legacy(&self.signer, tx)
            .map_err(|e| VaultError::rejected(operation, format!("transaction signing failed: {e}")))?;
        debug!(operation, tx_hash = %signed.hash, nonce, gas_price, gas_limit, "transaction signed");

        self.send_signed(&mut state, operation, signed).await
    }

    /// Poll for a transaction receipt until it is mined.
    ///
    /// There is no wall-clock timeout. Polling gives up only after
    /// `max_poll_failures` consecutive RPC errors. Returns
    /// `VaultError::TxReverted` if the receipt has `status == 0`.
    pub async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Confirmation, VaultError> {
        let mut consecutive_failures = 0u32;

        loop {
            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    if !receipt.status() {
                        return Err(VaultError::TxReverted {
                            tx_hash: tx_hash.to_string(),
                            reason: "transaction reverted on-chain".into(),
                        });
                    }
                    info!(
                        tx_hash = %tx_hash,
                        block = ?receipt.block_number,
                        gas_used = receipt.gas_used,
                        "transaction confirmed"
                    );
                    return Ok(Confirmation {
                        tx_hash,
                        block_number: receipt.block_number,
                        gas_used: receipt.gas_used,
                    });
                }
                Ok(None) => {
                    consecutive_failures = 0;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    let err = classify_rpc_error("getTransactionReceipt", &e);
                    if !err.is_transient() || consecutive_failures >= self.max_poll_failures {
                        return Err(err);
                    }
                    warn!(
                        error = %e,
                        tx_hash = %tx_hash,
                        consecutive_failures,
                        "receipt poll error, retrying"
                    );
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Current gas price in wei with a 10% buffer.
    pub async fn get_gas_price(&self, operation: &str) -> Result<u128, VaultError> {
        let base_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| classify_rpc_error(operation, &e))?;
        Ok(buffered_gas_price(base_price))
    }

    // -----------------------------------------------------------------------
    // Revert decoding
    // -----------------------------------------------------------------------

    /// Decode a Solidity revert reason from raw return data.
    ///
    /// Handles:
    /// - `Error(string)` (0x08c379a0): standard revert messages.
    /// - `Panic(uint256)` (0x4e487b71): arithmetic and assertion panics.
    /// - Unknown selectors fall back to hex encoding.
    pub fn decode_revert_reason(data: &[u8]) -> String {
        if data.is_empty() {
            return "Unknown revert".into();
        }

        if data.len() < 4 {
            return hex::encode(data);
        }

        // Error(string): selector(4) + offset(32) + length(32) + data
        if data[..4] == ERROR_SELECTOR && data.len() >= 68 {
            if let Ok(len_bytes) = <[u8; 8]>::try_from(&data[60..68]) {
                let str_len = u64::from_be_bytes(len_bytes) as usize;
                if data.len() >= 68 + str_len {
                    return String::from_utf8_lossy(&data[68..68 + str_len]).into_owned();
                }
            }
        }

        // Panic(uint256): selector(4) + code(32)
        if data[..4] == PANIC_SELECTOR && data.len() >= 36 {
            let code = U256::from_be_slice(&data[4..36]);
            return match code.saturating_to::<u64>() {
                0x01 => "Panic: assertion failed".into(),
                0x11 => "Panic: arithmetic overflow/underflow".into(),
                0x12 => "Panic: division by zero".into(),
                0x21 => "Panic: enum conversion out of range".into(),
                0x22 => "Panic: incorrectly encoded storage byte array".into(),
                0x31 => "Panic: pop on empty array".into(),
                0x32 => "Panic: array index out of bounds".into(),
                0x41 => "Panic: too much memory allocated".into(),
                0x51 => "Panic: called zero-initialized function pointer".into(),
                _ => format!("Panic(0x{code:x})"),
            };
        }

        hex::encode(data)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Send signed bytes and update the nonce state from the outcome.
    async fn send_signed(
        &self,
        state: &mut NonceState,
        operation: &str,
        signed: SignedTx,
    ) -> Result<B256, VaultError> {
        let err = match self.provider.send_raw_transaction(&signed.raw).await {
            Ok(_) => {
                state.next = Some(signed.nonce + 1);
                info!(
                    operation,
                    tx_hash = %signed.hash,
                    nonce = signed.nonce,
                    "transaction submitted"
                );
                return Ok(signed.hash);
            }
            Err(e) => classify_rpc_error(operation, &e),
        };

        if err.is_transient() {
            warn!(operation, tx_hash = %signed.hash, error = %err, "send failed, holding signed transaction");
            state.hold(signed);
            return Err(err);
        }

        // "already known" and "nonce too low" answer a resend the node has seen.
        if matches!(self.is_known(operation, signed.hash).await, Ok(true)) {
            state.next = Some(signed.nonce + 1);
            info!(operation, tx_hash = %signed.hash, "node already has the transaction");
            return Ok(signed.hash);
        }

        // A rejected send may mean the cached nonce drifted.
        state.next = None;
        warn!(operation, nonce = signed.nonce, error = %err, "send rejected, nonce will resync");
        Err(err)
    }

    /// Whether the node knows `hash`, pending or mined.
    async fn is_known(&self, operation: &str, hash: B256) -> Result<bool, VaultError> {
        self.provider
            .get_transaction_by_hash(hash)
            .await
            .map(|tx| tx.is_some())
            .map_err(|e| classify_rpc_error(operation, &e))
    }
}

// ---------------------------------------------------------------------------
// Signed transactions and nonce state
// ---------------------------------------------------------------------------

/// A locally signed transaction: target call, nonce, raw bytes and hash.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SignedTx {
    to: Address,
    input: Bytes,
    nonce: u64,
    raw: Bytes,
    hash: B256,
}

impl SignedTx {
    fn matches(&self, to: Address, input: &Bytes) -> bool {
        self.to == to && &self.input == input
    }
}

#[derive(Debug, Default)]
struct NonceState {
    /// Next nonce to use. `None` until first chain query, or after a
    /// rejected send forces a resync.
    next: Option<u64>,
    /// Signed transaction whose send failed transiently.
    unsent: Option<SignedTx>,
}

#[derive(Debug, PartialEq, Eq)]
enum HeldTx {
    /// The node has the held transaction for this same call.
    Accepted(B256),
    /// Send the held bytes again.
    Resend(SignedTx),
    /// The held transaction was for another call; sign afresh.
    Superseded,
}

impl NonceState {
    /// Keep `signed` for the next submit; its nonce stays reserved.
    fn hold(&mut self, signed: SignedTx) {
        self.next = Some(signed.nonce);
        self.unsent = Some(signed);
    }

    /// Decide what to do with a held transaction when `to`/`input` is
    /// submitted, given whether the node already knows its hash.
    fn settle_held(&mut self, held: SignedTx, known: bool, to: Address, input: &Bytes) -> HeldTx {
        if known {
            self.next = Some(held.nonce + 1);
        }
        match (known, held.matches(to, input)) {
            (true, true) => HeldTx::Accepted(held.hash),
            (false, true) => HeldTx::Resend(held),
            (_, false) => HeldTx::Superseded,
        }
    }
}

fn sign_legacy(signer: &PrivateKeySigner, tx: TxLegacy) -> alloy::signers::Result<SignedTx> {
    let to = match tx.to {
        TxKind::Call(to) => to,
        TxKind::Create => Address::ZERO,
    };
    let input = tx.input.clone();
    let nonce = tx.nonce;

    let sig = signer.sign_hash_sync(&tx.signature_hash())?;
    let signed = tx.into_signed(sig);
    let hash = *signed.hash();
    let raw = Bytes::from(TxEnvelope::Legacy(signed).encoded_2718());

    Ok(SignedTx {
        to,
        input,
        nonce,
        raw,
        hash,
    })
}

fn buffered_gas_price(base_price: u128) -> u128 {
    std::cmp::max(base_price.saturating_mul(GAS_PRICE_BUFFER_PCT) / 100, 1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

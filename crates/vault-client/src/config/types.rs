use rust_decimal::Decimal;
use serde::Deserialize;

use crate::constants::{
    DEFAULT_APPROVE_GAS_LIMIT, DEFAULT_FALLBACK_GAS_LIMIT, DEFAULT_GAS_ESTIMATE_BUFFER,
    DEFAULT_LOG_FILE, DEFAULT_LOG_LEVEL, DEFAULT_MANUAL_APPROVE_AMOUNT, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_RECEIPT_POLL_FAILURES,
    DEFAULT_RECEIPT_POLL_INTERVAL_MS, DEFAULT_RETRY_DELAY_MS,
};

// ---------------------------------------------------------------------------
// Top-level aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub app: AppConfig,
    pub network: NetworkConfig,
    pub gateway: GatewayConfig,
    pub transactions: TransactionConfig,
}

// ---------------------------------------------------------------------------
// app.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Selects `networks/<active_network>.json`.
    pub active_network: u64,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
    /// Prefix of the daily-rolled JSON log files.
    #[serde(default = "default_log_file")]
    pub file_name: String,
    /// Level for this crate's own events. Dependencies stay at `warn`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".into(),
            file_name: default_log_file(),
            level: default_log_level(),
        }
    }
}

fn default_log_file() -> String {
    DEFAULT_LOG_FILE.into()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.into()
}

// ---------------------------------------------------------------------------
// networks/<id>.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc: RpcConfig,
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub vault: VaultConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub http_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    pub collateral_token: String,
    pub vault: String,
    pub price_feed: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub interest_accessor: InterestAccessor,
}

/// Which vault method reports accrued interest on this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestAccessor {
    /// `getVaultInfo(user).pendingInterest`
    #[default]
    VaultInfo,
    /// `getPendingInterest(user)`
    PendingInterest,
    /// `calculateInterest(user)`
    CalculateInterest,
}

impl InterestAccessor {
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::VaultInfo => "getVaultInfo",
            Self::PendingInterest => "getPendingInterest",
            Self::CalculateInterest => "calculateInterest",
        }
    }
}

// ---------------------------------------------------------------------------
// gateway.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_max_receipt_poll_failures")]
    pub max_receipt_poll_failures: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            receipt_poll_interval_ms: DEFAULT_RECEIPT_POLL_INTERVAL_MS,
            max_receipt_poll_failures: DEFAULT_MAX_RECEIPT_POLL_FAILURES,
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_receipt_poll_interval_ms() -> u64 {
    DEFAULT_RECEIPT_POLL_INTERVAL_MS
}

fn default_max_receipt_poll_failures() -> u32 {
    DEFAULT_MAX_RECEIPT_POLL_FAILURES
}

// ---------------------------------------------------------------------------
// transactions.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionConfig {
    /// Route remote calls through the retry policy. When off, every call
    /// gets exactly one attempt.
    pub resilient_mode: bool,
    pub fallback_gas_limit: u64,
    #[serde(with = "rust_decimal::serde::str")]
    pub gas_estimate_buffer: Decimal,
    pub approve_gas_limit: u64,
    #[serde(with = "rust_decimal::serde::str")]
    pub manual_approve_amount: Decimal,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            resilient_mode: true,
            fallback_gas_limit: DEFAULT_FALLBACK_GAS_LIMIT,
            gas_estimate_buffer: DEFAULT_GAS_ESTIMATE_BUFFER,
            approve_gas_limit: DEFAULT_APPROVE_GAS_LIMIT,
            manual_approve_amount: DEFAULT_MANUAL_APPROVE_AMOUNT,
        }
    }
}

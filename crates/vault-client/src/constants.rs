use alloy::primitives::{address, Address};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Numeric Constants
// ---------------------------------------------------------------------------

/// WAD: 1e18, the fixed-point scale of every amount and price crossing the
/// contract boundary.
pub const WAD: Decimal = dec!(1_000_000_000_000_000_000);

/// Number of fractional digits in a WAD value.
pub const WAD_DECIMALS: u32 = 18;

/// Collateral-to-debt multiplier at which a position becomes liquidatable.
pub const LIQUIDATION_THRESHOLD: Decimal = dec!(1.5);

/// Basis points per whole percent.
pub const BPS_PER_PERCENT: Decimal = dec!(100);

/// Decimal places used for every displayed metric.
pub const DISPLAY_DECIMALS: u32 = 2;

// ---------------------------------------------------------------------------
// Logging defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_LOG_FILE: &str = "vault-client.log";
pub const DEFAULT_LOG_LEVEL: &str = "info";

// ---------------------------------------------------------------------------
// Gateway defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RECEIPT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_MAX_RECEIPT_POLL_FAILURES: u32 = 5;

// ---------------------------------------------------------------------------
// Transaction defaults
// ---------------------------------------------------------------------------

/// Gas limit used for `borrow` when estimation fails.
pub const DEFAULT_FALLBACK_GAS_LIMIT: u64 = 500_000;

/// Multiplier applied on top of a successful gas estimate.
pub const DEFAULT_GAS_ESTIMATE_BUFFER: Decimal = dec!(1.2);

/// Explicit gas limit for the manual approve utility.
pub const DEFAULT_APPROVE_GAS_LIMIT: u64 = 100_000;

/// Collateral amount approved by the manual approve utility.
pub const DEFAULT_MANUAL_APPROVE_AMOUNT: Decimal = dec!(100);

// ---------------------------------------------------------------------------
// Known networks
// ---------------------------------------------------------------------------

/// Polygon Amoy public test network.
pub const AMOY_CHAIN_ID: u64 = 80_002;

/// Local development node (hardhat / anvil).
pub const LOCAL_DEV_CHAIN_ID: u64 = 31_337;

// ---------------------------------------------------------------------------
// Amoy deployment
// ---------------------------------------------------------------------------

pub const AMOY_COLLATERAL_TOKEN: Address = address!("96e64aA4ea2F6c04847dc9665f2d6Adddf490742");
pub const AMOY_VAULT: Address = address!("5942eD733d2bc9bDCBcBF505c45375209842dfa1");
pub const AMOY_PRICE_FEED: Address = address!("133Fd791668cCAE4cdF4e7d43B09445D2f33b4af");

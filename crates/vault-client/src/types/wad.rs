//! Newtype wrapper for on-chain 18-decimal fixed-point values.
//!
//! Amounts and prices cross the contract boundary as WAD-scaled `U256`
//! integers. They are converted to `Decimal` exactly once, here, and all
//! risk arithmetic runs on `Decimal` afterwards.

use alloy::primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::constants::{WAD, WAD_DECIMALS};
use crate::errors::{Precondition, VaultError};

/// WAD-scaled value (18 decimals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Wad(pub U256);

const ONE_WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

impl Wad {
    /// Convert on-chain WAD (U256) to off-chain `Decimal`.
    ///
    /// Exact whenever the raw value fits a `Decimal` mantissa. Larger values
    /// (e.g. unlimited allowances) keep their whole-unit part, and anything
    /// beyond `Decimal::MAX` saturates. Never collapses to zero.
    pub fn to_decimal(self) -> Decimal {
        if let Ok(raw) = i128::try_from(self.0) {
            if let Ok(exact) = Decimal::try_from_i128_with_scale(raw, WAD_DECIMALS) {
                return exact;
            }
        }
        let whole = self.0 / ONE_WAD;
        i128::try_from(whole)
            .ok()
            .and_then(|w| Decimal::try_from_i128_with_scale(w, 0).ok())
            .unwrap_or(Decimal::MAX)
    }

    /// Scale a `Decimal` amount to WAD.
    ///
    /// Rejects negative values and more than 18 fractional digits.
    pub fn from_decimal(amount: Decimal) -> Result<Self, VaultError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(invalid(format!("{amount} is negative")));
        }
        if amount.normalize().scale() > WAD_DECIMALS {
            return Err(invalid(format!(
                "{amount} has more than {WAD_DECIMALS} decimal places"
            )));
        }
        let scaled = amount
            .checked_mul(WAD)
            .ok_or_else(|| invalid(format!("{amount} is too large")))?;
        let raw = scaled
            .trunc()
            .to_u128()
            .ok_or_else(|| invalid(format!("{amount} is not representable")))?;
        Ok(Self(U256::from(raw)))
    }

    /// Inner `U256`.
    pub fn raw(self) -> U256 {
        self.0
    }
}

fn invalid(reason: String) -> VaultError {
    Precondition::InvalidAmount { reason }.into()
}

// ---------------------------------------------------------------------------
// Free-standing conversion helpers
// ---------------------------------------------------------------------------

/// Convert a raw U256 WAD value to `Decimal`. Convenience alias for `Wad::to_decimal`.
pub fn wad_to_decimal(wad: U256) -> Decimal {
    Wad(wad).to_decimal()
}

/// Convert a `Decimal` amount to a raw U256 WAD value.
pub fn decimal_to_wad(amount: Decimal) -> Result<U256, VaultError> {
    Wad::from_decimal(amount).map(Wad::raw)
}

/// Convert a basis-point rate to a percentage (`500` → `5`).
pub fn bps_to_percent(bps: u64) -> Decimal {
    Decimal::from(bps) / crate::constants::BPS_PER_PERCENT
}

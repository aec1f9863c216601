use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::Serialize;

use super::wad::wad_to_decimal;

/// Allowance granted by `owner` to `spender` on the collateral token.
///
/// Read fresh before every mutating workflow, never cached across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllowanceState {
    pub owner: Address,
    pub spender: Address,
    pub approved_amount: U256,
}

impl AllowanceState {
    /// Whether the allowance covers `amount` (raw WAD units).
    pub fn covers(&self, amount: U256) -> bool {
        self.approved_amount >= amount
    }

    /// Any non-zero allowance counts as "approved" for display.
    pub fn is_approved(&self) -> bool {
        !self.approved_amount.is_zero()
    }
}

/// Collateral token balance and vault allowance of the connected account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccountState {
    pub balance: U256,
    pub allowance: AllowanceState,
}

impl AccountState {
    pub fn balance_decimal(&self) -> Decimal {
        wad_to_decimal(self.balance)
    }
}

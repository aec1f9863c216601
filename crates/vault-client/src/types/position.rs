use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::VaultError;

/// Market price of one collateral unit, in liability units.
///
/// A zero or missing oracle answer is `Unpriced`, never a zero price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketPrice {
    Priced(#[serde(with = "rust_decimal::serde::str")] Decimal),
    Unpriced,
}

impl MarketPrice {
    /// Build from an oracle reading; non-positive values are unpriced.
    pub fn from_reading(value: Decimal) -> Self {
        if value > Decimal::ZERO {
            Self::Priced(value)
        } else {
            Self::Unpriced
        }
    }

    pub fn value(&self) -> Option<Decimal> {
        match self {
            Self::Priced(p) => Some(*p),
            Self::Unpriced => None,
        }
    }
}

/// Accrued interest as reported by the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingInterest {
    Reported(#[serde(with = "rust_decimal::serde::str")] Decimal),
    /// The read failed; the amount is taken as zero and the snapshot is degraded.
    Defaulted { reason: String },
}

impl PendingInterest {
    pub fn amount(&self) -> Decimal {
        match self {
            Self::Reported(v) => *v,
            Self::Defaulted { .. } => Decimal::ZERO,
        }
    }
}

/// Raw position values for one account, assembled from a single refresh.
///
/// Rebuilt on every refresh and owned by whoever requested it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub owner: Address,
    #[serde(with = "rust_decimal::serde::str")]
    pub collateral_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub debt_amount: Decimal,
    pub pending_interest: PendingInterest,
    pub borrow_rate_bps: u64,
    pub market_price: MarketPrice,
    pub as_of: DateTime<Utc>,
}

impl PositionSnapshot {
    /// A snapshot is degraded when the interest read fell back to its default.
    pub fn is_degraded(&self) -> bool {
        matches!(self.pending_interest, PendingInterest::Defaulted { .. })
    }

    /// The failed non-critical read behind a degraded snapshot.
    pub fn degraded_read(&self) -> Option<VaultError> {
        match &self.pending_interest {
            PendingInterest::Defaulted { reason } => Some(VaultError::DegradedRead {
                field: "pending_interest",
                reason: reason.clone(),
            }),
            PendingInterest::Reported(_) => None,
        }
    }

    /// Field-by-field change from `before` to `self`.
    pub fn diff(&self, before: &PositionSnapshot) -> PositionDiff {
        PositionDiff {
            collateral_delta: self.collateral_amount - before.collateral_amount,
            debt_delta: self.debt_amount - before.debt_amount,
            interest_delta: self.pending_interest.amount() - before.pending_interest.amount(),
        }
    }
}

/// Before/after comparison logged around state-mutating workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionDiff {
    #[serde(with = "rust_decimal::serde::str")]
    pub collateral_delta: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub debt_delta: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub interest_delta: Decimal,
}

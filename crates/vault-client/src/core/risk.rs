//! Risk metric calculator.
//!
//! Pure functions over a single [`PositionSnapshot`]. All five metrics are
//! derived together from one snapshot. With zero collateral or no market
//! price the ratio metrics are unavailable and both capacities are zero.
//! Arithmetic is checked: an overflow makes a metric unavailable (or a
//! capacity zero) instead of panicking.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::constants::{DISPLAY_DECIMALS, LIQUIDATION_THRESHOLD};
use crate::types::PositionSnapshot;

const PERCENT: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskMetrics {
    /// Debt as a percentage of collateral value.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub loan_to_value: Option<Decimal>,
    /// Price at which the position reaches the liquidation threshold.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub liquidation_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub net_value: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub available_to_withdraw: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub available_to_borrow: Decimal,
}

impl RiskMetrics {
    pub fn unavailable() -> Self {
        Self {
            loan_to_value: None,
            liquidation_price: None,
            net_value: None,
            available_to_withdraw: Decimal::ZERO,
            available_to_borrow: Decimal::ZERO,
        }
    }
}

/// Derive every risk metric from `snapshot`.
pub fn compute(snapshot: &PositionSnapshot) -> RiskMetrics {
    let collateral = snapshot.collateral_amount;
    let debt = snapshot.debt_amount;

    let price = match snapshot.market_price.value() {
        Some(price) if collateral > Decimal::ZERO && price > Decimal::ZERO => price,
        _ => return RiskMetrics::unavailable(),
    };

    let collateral_value = collateral_value(collateral, price);

    let loan_to_value = collateral_value
        .and_then(|value| debt.checked_div(value))
        .and_then(|ratio| ratio.checked_mul(PERCENT));

    let liquidation_price = if debt > Decimal::ZERO {
        debt.checked_mul(LIQUIDATION_THRESHOLD)
            .and_then(|d| d.checked_div(collateral))
    } else {
        None
    };

    let net_value = collateral_value.and_then(|value| value.checked_sub(debt));

    // Collateral that must stay locked to keep debt at the threshold.
    let available_to_withdraw = debt
        .checked_mul(LIQUIDATION_THRESHOLD)
        .and_then(|d| d.checked_div(price))
        .and_then(|locked| collateral.checked_sub(locked))
        .map(clamp_non_negative)
        .unwrap_or(Decimal::ZERO);

    let available_to_borrow = collateral_value
        .and_then(|value| value.checked_div(LIQUIDATION_THRESHOLD))
        .and_then(|capacity| capacity.checked_sub(debt))
        .map(clamp_non_negative)
        .unwrap_or(Decimal::ZERO);

    RiskMetrics {
        loan_to_value,
        liquidation_price,
        net_value,
        available_to_withdraw,
        available_to_borrow,
    }
}

/// `amount × price`, or `None` on overflow.
pub fn collateral_value(amount: Decimal, price: Decimal) -> Option<Decimal> {
    amount.checked_mul(price)
}

/// Round to the two display decimals (half away from zero), keeping
/// trailing zeros: `166.666…` → `"166.67"`, `0` → `"0.00"`.
pub fn format_display(value: Decimal) -> String {
    let mut rounded =
        value.round_dp_with_strategy(DISPLAY_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(DISPLAY_DECIMALS);
    rounded.to_string()
}

fn clamp_non_negative(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

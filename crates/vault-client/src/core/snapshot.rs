//! Position snapshot builder.
//!
//! Issues the five position reads concurrently through the gateway and
//! assembles a [`PositionSnapshot`]. Borrow rate, collateral and debt are
//! required. Pending interest degrades to zero on failure, and a failed or
//! zero price yields an unpriced snapshot. The builder never retries by
//! itself; all retry behaviour comes from the gateway.

use alloy::primitives::{Address, U256};
use chrono::Utc;
use tracing::{debug, warn};

use crate::core::gateway::Gateway;
use crate::errors::{Precondition, VaultError};
use crate::execution::VaultServices;
use crate::types::wad::wad_to_decimal;
use crate::types::{AccountState, AllowanceState, MarketPrice, PendingInterest, PositionSnapshot};

#[derive(Clone)]
pub struct SnapshotBuilder {
    services: VaultServices,
    gateway: Gateway,
}

impl SnapshotBuilder {
    pub fn new(services: VaultServices, gateway: Gateway) -> Self {
        Self { services, gateway }
    }

    /// Build a fresh snapshot for `owner`.
    pub async fn build(&self, owner: Option<Address>) -> Result<PositionSnapshot, VaultError> {
        let owner = owner.ok_or(Precondition::NoIdentity)?;
        let vault = &self.services.vault;

        let (rate, collateral, debt, interest, price) = tokio::join!(
            self.gateway.call("borrowRate", || vault.borrow_rate_bps()),
            self.gateway.call("getUserCollateral", || vault.user_collateral(owner)),
            self.gateway.call("getUserDebt", || vault.user_debt(owner)),
            self.gateway.call("pendingInterest", || vault.pending_interest(owner)),
            self.read_price(),
        );

        let borrow_rate_bps = rate?;
        let collateral = collateral?;
        let debt = debt?;

        let pending_interest = match interest {
            Ok(raw) => PendingInterest::Reported(wad_to_decimal(raw)),
            Err(e) => PendingInterest::Defaulted {
                reason: e.to_string(),
            },
        };

        let market_price = price.unwrap_or_else(|e| {
            warn!(%owner, error = %e, "price unavailable, snapshot is unpriced");
            MarketPrice::Unpriced
        });

        let snapshot = PositionSnapshot {
            owner,
            collateral_amount: wad_to_decimal(collateral),
            debt_amount: wad_to_decimal(debt),
            pending_interest,
            borrow_rate_bps,
            market_price,
            as_of: Utc::now(),
        };

        if let Some(degraded) = snapshot.degraded_read() {
            warn!(%owner, error = %degraded, "using zero pending interest");
        }
        debug!(
            %owner,
            collateral = %snapshot.collateral_amount,
            debt = %snapshot.debt_amount,
            interest = %snapshot.pending_interest.amount(),
            rate_bps = borrow_rate_bps,
            price = ?snapshot.market_price.value(),
            degraded = snapshot.is_degraded(),
            "position snapshot"
        );

        Ok(snapshot)
    }

    /// Read the oracle price. A zero reading is `Unpriced`, not an error.
    pub async fn read_price(&self) -> Result<MarketPrice, VaultError> {
        let oracle = &self.services.oracle;
        let raw: U256 = self.gateway.call("getPrice", || oracle.get_price()).await?;
        Ok(MarketPrice::from_reading(wad_to_decimal(raw)))
    }

    /// Fresh collateral balance and vault allowance for `owner`.
    pub async fn read_account(&self, owner: Address) -> Result<AccountState, VaultError> {
        let token = &self.services.token;
        let spender = self.services.vault.address();

        let (balance, allowance) = tokio::join!(
            self.gateway.call("balanceOf", || token.balance_of(owner)),
            self.gateway.call("allowance", || token.allowance(owner, spender)),
        );

        let account = AccountState {
            balance: balance?,
            allowance: AllowanceState {
                owner,
                spender,
                approved_amount: allowance?,
            },
        };
        debug!(
            %owner,
            balance = %account.balance_decimal(),
            approved = account.allowance.is_approved(),
            "account state"
        );
        Ok(account)
    }
}

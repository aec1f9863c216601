//! Session and identity manager.
//!
//! Owns the connected identity and the display state derived from it.
//! Every refresh recomputes the view from fresh reads, behind the network
//! guard. Disconnect and a change of identity replace the whole view in one
//! assignment so no stale metric survives them. Displayed metrics and the
//! displayed price always come from the same snapshot.

use std::str::FromStr;

use alloy::primitives::Address;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::constants::DISPLAY_DECIMALS;
use crate::core::gateway::{Gateway, RetryPolicy};
use crate::core::network_guard::NetworkGuard;
use crate::core::orchestrator::{Orchestrator, PostSettleRefresh, WorkflowOutcome};
use crate::core::risk::{self, format_display};
use crate::core::snapshot::SnapshotBuilder;
use crate::errors::{Precondition, VaultError};
use crate::execution::VaultServices;
use crate::types::wad::bps_to_percent;
use crate::types::{AccountState, MarketPrice, PositionSnapshot};

const UNAVAILABLE: &str = "N/A";

/// Display strings for the connected position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionView {
    pub account: String,
    /// Any non-zero allowance for the vault.
    pub approved: bool,
    pub collateral_balance: String,
    pub collateral_deposited: String,
    pub position_debt: String,
    pub pending_interest: String,
    /// Percent per year.
    pub borrow_rate: String,
    pub market_price: String,
    pub loan_to_value: String,
    pub liquidation_price: String,
    pub net_value: String,
    pub available_to_withdraw: String,
    pub available_to_borrow: String,
    pub deposit_amount: String,
    pub borrow_amount: String,
    pub error: Option<String>,
    pub degraded: bool,
}

impl Default for PositionView {
    fn default() -> Self {
        let zero = || "0.00".to_string();
        Self {
            account: String::new(),
            approved: false,
            collateral_balance: "0".into(),
            collateral_deposited: zero(),
            position_debt: zero(),
            pending_interest: zero(),
            borrow_rate: zero(),
            market_price: zero(),
            loan_to_value: zero(),
            liquidation_price: zero(),
            net_value: zero(),
            available_to_withdraw: zero(),
            available_to_borrow: zero(),
            deposit_amount: "0".into(),
            borrow_amount: "0".into(),
            error: None,
            degraded: false,
        }
    }
}

pub struct Session {
    services: VaultServices,
    guard: NetworkGuard,
    snapshots: SnapshotBuilder,
    orchestrator: Orchestrator,
    manual_approve_amount: Decimal,
    identity: Option<Address>,
    /// Snapshot behind the displayed metrics.
    snapshot: Option<PositionSnapshot>,
    price: MarketPrice,
    deposit_input: Decimal,
    borrow_input: Decimal,
    view: PositionView,
}

impl Session {
    pub fn new(config: &ClientConfig, services: VaultServices) -> Self {
        let gateway = Gateway::new(RetryPolicy::from_config(
            &config.gateway,
            &config.transactions,
        ));
        Self {
            guard: NetworkGuard::new(services.connectivity.clone(), config.network.chain_id),
            snapshots: SnapshotBuilder::new(services.clone(), gateway),
            orchestrator: Orchestrator::new(
                services.clone(),
                gateway,
                config.network.chain_id,
                config.transactions.clone(),
            ),
            services,
            manual_approve_amount: config.transactions.manual_approve_amount,
            identity: None,
            snapshot: None,
            price: MarketPrice::Unpriced,
            deposit_input: Decimal::ZERO,
            borrow_input: Decimal::ZERO,
            view: PositionView::default(),
        }
    }

    pub fn identity(&self) -> Option<Address> {
        self.identity
    }

    pub fn view(&self) -> &PositionView {
        &self.view
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Ask the wallet provider for an account and load its position.
    ///
    /// Fails only if no account is obtained. Refresh failures after that
    /// are reported in the view's `error` field.
    pub async fn connect(&mut self) -> Result<Address, VaultError> {
        let address = self
            .services
            .connectivity
            .request_account()
            .await
            .inspect_err(|e| warn!(error = %e, "connect failed"))?;
        info!(%address, "account connected");
        self.attach(address).await;
        Ok(address)
    }

    /// Load `address` without a wallet provider. Reads work; writes fail
    /// at signing.
    pub async fn observe(&mut self, address: Address) {
        info!(%address, "observing account (watch-only)");
        self.attach(address).await;
    }

    pub fn disconnect(&mut self) {
        if let Some(address) = self.identity {
            info!(%address, "account disconnected");
        }
        self.clear();
    }

    async fn attach(&mut self, address: Address) {
        if let Some(previous) = self.identity.filter(|p| *p != address) {
            info!(%previous, %address, "account changed");
            self.clear();
        }
        self.identity = Some(address);
        self.view.account = address.to_string();
        self.refresh_all().await;
    }

    /// Drop the identity and everything derived from it.
    fn clear(&mut self) {
        self.identity = None;
        self.snapshot = None;
        self.price = MarketPrice::Unpriced;
        self.deposit_input = Decimal::ZERO;
        self.borrow_input = Decimal::ZERO;
        self.view = PositionView::default();
    }

    /// Allowance and balance, then the snapshot, then the market price.
    /// Each step runs regardless of the previous one.
    pub async fn refresh_all(&mut self) {
        self.view.error = None;
        let _ = self.refresh_account().await;
        let _ = self.refresh_position().await;
        let _ = self.refresh_price().await;
    }

    // -----------------------------------------------------------------------
    // Refreshes
    // -----------------------------------------------------------------------

    pub async fn refresh_account(&mut self) -> Result<AccountState, VaultError> {
        let owner = self.checked_identity("load account balance").await?;
        match self.snapshots.read_account(owner).await {
            Ok(account) => {
                self.apply_account(&account);
                Ok(account)
            }
            Err(e) => Err(self.report("load account balance", e)),
        }
    }

    pub async fn refresh_position(&mut self) -> Result<PositionSnapshot, VaultError> {
        let owner = self.checked_identity("load position").await?;
        match self.snapshots.build(Some(owner)).await {
            Ok(snapshot) => {
                self.apply_snapshot(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => Err(self.report("load position", e)),
        }
    }

    /// Fresh market price. Metrics are recomputed from the current
    /// snapshot at the new price; on failure the view keeps the price its
    /// metrics were derived from.
    pub async fn refresh_price(&mut self) -> Result<MarketPrice, VaultError> {
        match self.snapshots.read_price().await {
            Ok(price) => {
                match self.snapshot.take() {
                    Some(mut snapshot) => {
                        snapshot.market_price = price;
                        self.apply_snapshot(snapshot);
                    }
                    None => self.apply_price(price),
                }
                Ok(price)
            }
            Err(e) => Err(self.report("load market price", e)),
        }
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    pub fn set_deposit_amount(&mut self, input: &str) -> Result<Decimal, VaultError> {
        let amount = parse_amount(input)?;
        self.deposit_input = amount;
        self.view.deposit_amount = amount.to_string();
        Ok(amount)
    }

    pub fn set_borrow_amount(&mut self, input: &str) -> Result<Decimal, VaultError> {
        let amount = parse_amount(input)?;
        self.borrow_input = amount;
        self.view.borrow_amount = amount.to_string();
        Ok(amount)
    }

    /// Value of the deposit input at the last known price, to two decimals.
    pub fn deposit_value_estimate(&self) -> Option<Decimal> {
        let price = self.price.value()?;
        risk::collateral_value(self.deposit_input, price).map(|value| {
            value.round_dp_with_strategy(DISPLAY_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
        })
    }

    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    pub async fn deposit(&mut self) -> Result<WorkflowOutcome, VaultError> {
        let result = self
            .orchestrator
            .deposit(self.deposit_input, self.identity)
            .await;
        match &result {
            Ok(outcome) => {
                self.deposit_input = Decimal::ZERO;
                self.view.deposit_amount = "0".into();
                self.settle(outcome);
            }
            Err(e) => self.view.error = Some(e.user_message("deposit")),
        }
        result
    }

    pub async fn borrow(&mut self) -> Result<WorkflowOutcome, VaultError> {
        let result = self
            .orchestrator
            .borrow(self.borrow_input, self.identity)
            .await;
        match &result {
            Ok(outcome) => {
                self.borrow_input = Decimal::ZERO;
                self.view.borrow_amount = "0".into();
                self.settle(outcome);
            }
            Err(e) => self.view.error = Some(e.user_message("borrow")),
        }
        result
    }

    /// Manual approval of `amount`, or the configured default.
    pub async fn approve(&mut self, amount: Option<Decimal>) -> Result<WorkflowOutcome, VaultError> {
        let amount = amount.unwrap_or(self.manual_approve_amount);
        let result = self.orchestrator.approve(amount, self.identity).await;
        match &result {
            Ok(_) => {
                self.view.error = None;
                self.view.approved = true;
            }
            Err(e) => self.view.error = Some(e.user_message("approve")),
        }
        result
    }

    fn settle(&mut self, outcome: &WorkflowOutcome) {
        self.view.error = None;
        let Some(PostSettleRefresh { account, snapshot }) = &outcome.refresh else {
            return;
        };
        match account {
            Ok(account) => self.apply_account(account),
            Err(e) => {
                let message = e.user_message("load account balance");
                self.view.error.get_or_insert(message);
            }
        }
        match snapshot {
            Ok(snapshot) => self.apply_snapshot(snapshot.clone()),
            Err(e) => {
                let message = e.user_message("load position");
                self.view.error.get_or_insert(message);
            }
        }
    }

    // -----------------------------------------------------------------------
    // View updates
    // -----------------------------------------------------------------------

    fn apply_account(&mut self, account: &AccountState) {
        self.view.collateral_balance = format_display(account.balance_decimal());
        self.view.approved = account.allowance.is_approved();
    }

    fn apply_snapshot(&mut self, snapshot: PositionSnapshot) {
        let metrics = risk::compute(&snapshot);
        let degraded = snapshot.degraded_read().is_some();
        let view = &mut self.view;
        view.collateral_deposited = format_display(snapshot.collateral_amount);
        view.position_debt = format_display(snapshot.debt_amount);
        view.pending_interest = if degraded {
            UNAVAILABLE.to_string()
        } else {
            format_display(snapshot.pending_interest.amount())
        };
        view.borrow_rate = format_display(bps_to_percent(snapshot.borrow_rate_bps));
        view.loan_to_value = display_or_unavailable(metrics.loan_to_value);
        view.liquidation_price = display_or_unavailable(metrics.liquidation_price);
        view.net_value = display_or_unavailable(metrics.net_value);
        view.available_to_withdraw = format_display(metrics.available_to_withdraw);
        view.available_to_borrow = format_display(metrics.available_to_borrow);
        view.degraded = degraded;
        self.apply_price(snapshot.market_price);
        self.snapshot = Some(snapshot);
    }

    fn apply_price(&mut self, price: MarketPrice) {
        self.price = price;
        self.view.market_price = display_or_unavailable(price.value());
    }

    /// Run the network guard for the current identity, reporting a miss.
    async fn checked_identity(&mut self, action: &str) -> Result<Address, VaultError> {
        match self.guard.assert_ready(self.identity).await {
            Ok(owner) => Ok(owner),
            Err(e) => Err(self.report(action, e)),
        }
    }

    /// Record the first failure of a refresh round in the view.
    fn report(&mut self, action: &str, err: VaultError) -> VaultError {
        warn!(action, error = %err, "refresh failed");
        self.view.error.get_or_insert_with(|| err.user_message(action));
        err
    }
}

fn display_or_unavailable(value: Option<Decimal>) -> String {
    value.map_or_else(|| UNAVAILABLE.to_string(), format_display)
}

fn parse_amount(input: &str) -> Result<Decimal, VaultError> {
    Decimal::from_str(input.trim()).map_err(|e| {
        Precondition::InvalidAmount {
            reason: format!("'{input}' is not a number: {e}"),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::LOCAL_DEV_CHAIN_ID;
    use crate::test_support::{test_config, wad, ChainState, Fault, MockChain, USER};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn funded_chain() -> Arc<MockChain> {
        MockChain::new(ChainState {
            balance: wad(dec!(50)),
            allowance: wad(dec!(10)),
            collateral: wad(dec!(1000)),
            debt: wad(dec!(100)),
            interest: wad(dec!(1.25)),
            ..ChainState::default()
        })
    }

    fn session(chain: &Arc<MockChain>) -> Session {
        Session::new(&test_config(), chain.services())
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_populates_view() {
        let chain = funded_chain();
        let mut s = session(&chain);
        assert_eq!(s.connect().await.unwrap(), USER);

        let view = s.view();
        assert_eq!(view.account, USER.to_string());
        assert!(view.approved);
        assert_eq!(view.collateral_balance, "50.00");
        assert_eq!(view.collateral_deposited, "1000.00");
        assert_eq!(view.position_debt, "100.00");
        assert_eq!(view.pending_interest, "1.25");
        assert_eq!(view.borrow_rate, "5.00");
        assert_eq!(view.market_price, "0.40");
        assert_eq!(view.loan_to_value, "25.00");
        assert_eq!(view.liquidation_price, "0.15");
        assert_eq!(view.net_value, "300.00");
        assert_eq!(view.available_to_withdraw, "625.00");
        assert_eq!(view.available_to_borrow, "166.67");
        assert_eq!(view.error, None);
        assert!(!view.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_wallet_provider() {
        let chain = MockChain::new(ChainState {
            account: None,
            ..ChainState::default()
        });
        let mut s = session(&chain);
        let err = s.connect().await.unwrap_err();
        assert!(matches!(
            err,
            VaultError::Precondition(Precondition::NoWalletProvider)
        ));
        assert_eq!(s.identity(), None);
        assert_eq!(s.view(), &PositionView::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_clears_every_display_value() {
        let chain = funded_chain();
        let mut s = session(&chain);
        s.connect().await.unwrap();
        s.set_deposit_amount("12").unwrap();
        s.disconnect();

        assert_eq!(s.identity(), None);
        let view = s.view();
        assert_eq!(view, &PositionView::default());
        assert_eq!(view.account, "");
        assert_eq!(view.collateral_balance, "0");
        assert_eq!(view.net_value, "0.00");
        assert_eq!(view.deposit_amount, "0");
        assert_eq!(s.deposit_value_estimate(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpriced_connect_shows_unavailable_metrics() {
        let chain = funded_chain();
        chain.fail_always("get_price", Fault::Transient);
        let mut s = session(&chain);
        s.connect().await.unwrap();

        let view = s.view();
        assert_eq!(view.market_price, UNAVAILABLE);
        assert_eq!(view.loan_to_value, UNAVAILABLE);
        assert_eq!(view.net_value, UNAVAILABLE);
        assert_eq!(view.available_to_borrow, "0.00");
        // Snapshot degrades to unpriced; the separate price refresh reports.
        assert_eq!(
            view.error.as_deref(),
            Some("Failed to load market price: Network connection issue. Please try again.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_snapshot_is_reported_after_connect() {
        let chain = funded_chain();
        chain.fail_always("user_debt", Fault::Rejected);
        let mut s = session(&chain);
        assert_eq!(s.connect().await.unwrap(), USER);

        let view = s.view();
        assert!(view.error.as_deref().unwrap().starts_with("Failed to load position"));
        assert_eq!(view.collateral_balance, "50.00");
        assert_eq!(view.collateral_deposited, "0.00");
        assert_eq!(view.market_price, "0.40");
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_interest_is_flagged() {
        let chain = funded_chain();
        chain.fail_always("pending_interest", Fault::Rejected);
        let mut s = session(&chain);
        s.connect().await.unwrap();
        assert!(s.view().degraded);
        assert_eq!(s.view().pending_interest, UNAVAILABLE);
        assert_eq!(s.view().error, None);
        // Debt and metrics still come from the zero-interest fallback.
        assert_eq!(s.view().position_debt, "100.00");
        assert_eq!(s.view().net_value, "300.00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_switch_drops_previous_position() {
        let chain = funded_chain();
        let mut s = session(&chain);
        s.connect().await.unwrap();
        s.set_deposit_amount("12").unwrap();
        assert_eq!(s.view().collateral_deposited, "1000.00");

        let other = Address::repeat_byte(0xBB);
        chain.update(|state| state.account = Some(other));
        chain.fail_always("user_debt", Fault::Rejected);
        chain.fail_always("balance_of", Fault::Rejected);
        assert_eq!(s.connect().await.unwrap(), other);

        let view = s.view();
        assert_eq!(view.account, other.to_string());
        assert_eq!(view.collateral_balance, "0");
        assert_eq!(view.collateral_deposited, "0.00");
        assert_eq!(view.position_debt, "0.00");
        assert_eq!(view.net_value, "0.00");
        assert_eq!(view.deposit_amount, "0");
        assert!(!view.approved);
        assert!(view.error.is_some());
        assert_eq!(s.deposit_value_estimate(), Some(dec!(0.00)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_same_account_keeps_input() {
        let chain = funded_chain();
        let mut s = session(&chain);
        s.connect().await.unwrap();
        s.set_deposit_amount("12").unwrap();
        s.connect().await.unwrap();
        assert_eq!(s.view().deposit_amount, "12");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_network_blocks_position_reads() {
        let chain = funded_chain();
        chain.update(|state| state.network_id = LOCAL_DEV_CHAIN_ID);
        let mut s = session(&chain);
        assert_eq!(s.connect().await.unwrap(), USER);

        assert!(chain.calls("network_id") > 0);
        assert_eq!(chain.calls("user_collateral"), 0);
        assert_eq!(chain.calls("balance_of"), 0);
        let view = s.view();
        assert_eq!(view.collateral_deposited, "0.00");
        assert_eq!(view.net_value, "0.00");
        assert!(view.error.as_deref().unwrap().contains("wrong network"));

        let err = s.refresh_position().await.unwrap_err();
        assert!(matches!(
            err,
            VaultError::Precondition(Precondition::WrongNetwork { actual: LOCAL_DEV_CHAIN_ID, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_price_refresh_failure_keeps_snapshot_metrics() {
        let chain = funded_chain();
        let mut s = session(&chain);
        s.connect().await.unwrap();

        chain.fail("get_price", Fault::Rejected, 1);
        assert!(s.refresh_price().await.is_err());
        let view = s.view();
        assert_eq!(view.market_price, "0.40");
        assert_eq!(view.loan_to_value, "25.00");
        assert_eq!(view.net_value, "300.00");
        assert!(view.error.as_deref().unwrap().starts_with("Failed to load market price"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_price_refresh_recomputes_metrics() {
        let chain = funded_chain();
        let mut s = session(&chain);
        s.connect().await.unwrap();

        chain.update(|state| state.price = wad(dec!(0.80)));
        s.refresh_price().await.unwrap();
        let view = s.view();
        assert_eq!(view.market_price, "0.80");
        assert_eq!(view.loan_to_value, "12.50");
        assert_eq!(view.net_value, "700.00");
        // No position reads behind the new price.
        assert_eq!(chain.calls("user_collateral"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deposit_resets_input_and_refreshes_view() {
        let chain = MockChain::new(ChainState {
            balance: wad(dec!(100)),
            ..ChainState::default()
        });
        let mut s = session(&chain);
        s.connect().await.unwrap();
        s.set_deposit_amount("40").unwrap();
        assert_eq!(s.deposit_value_estimate(), Some(dec!(16.00)));

        let outcome = s.deposit().await.unwrap();
        assert!(outcome.approval.is_some());
        let view = s.view();
        assert_eq!(view.deposit_amount, "0");
        assert_eq!(view.collateral_deposited, "40.00");
        assert_eq!(view.collateral_balance, "60.00");
        assert_eq!(view.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_borrow_keeps_input() {
        let chain = funded_chain();
        chain.fail_always("borrow", Fault::Declined);
        let mut s = session(&chain);
        s.connect().await.unwrap();
        s.set_borrow_amount("25").unwrap();

        assert!(s.borrow().await.is_err());
        let view = s.view();
        assert_eq!(view.borrow_amount, "25");
        assert_eq!(
            view.error.as_deref(),
            Some("Failed to borrow: Transaction was rejected.")
        );
        assert_eq!(view.position_debt, "100.00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_borrow_updates_metrics() {
        let chain = funded_chain();
        let mut s = session(&chain);
        s.connect().await.unwrap();
        s.set_borrow_amount("50").unwrap();
        s.borrow().await.unwrap();

        let view = s.view();
        assert_eq!(view.borrow_amount, "0");
        assert_eq!(view.position_debt, "150.00");
        assert_eq!(view.net_value, "250.00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_approve_uses_default_amount() {
        let chain = MockChain::new(ChainState::default());
        let mut s = session(&chain);
        s.connect().await.unwrap();
        assert!(!s.view().approved);

        s.approve(None).await.unwrap();
        assert!(s.view().approved);
        assert_eq!(chain.state().allowance, wad(dec!(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_workflow_without_identity() {
        let chain = funded_chain();
        let mut s = session(&chain);
        s.set_borrow_amount("1").unwrap();
        let err = s.borrow().await.unwrap_err();
        assert!(matches!(err, VaultError::Precondition(Precondition::NoIdentity)));
        assert_eq!(chain.calls("borrow"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_loads_position_without_wallet() {
        let chain = MockChain::new(ChainState {
            account: None,
            collateral: wad(dec!(1000)),
            debt: wad(dec!(100)),
            ..ChainState::default()
        });
        let mut s = session(&chain);
        s.observe(USER).await;
        assert_eq!(s.identity(), Some(USER));
        assert_eq!(s.view().net_value, "300.00");
        assert_eq!(chain.calls("request_account"), 0);
    }

    #[test]
    fn test_invalid_amount_input() {
        let chain = funded_chain();
        let mut s = session(&chain);
        let err = s.set_deposit_amount("ten").unwrap_err();
        assert!(matches!(
            err,
            VaultError::Precondition(Precondition::InvalidAmount { .. })
        ));
        assert_eq!(s.view().deposit_amount, "0");
        assert_eq!(s.set_borrow_amount(" 2.5 ").unwrap(), dec!(2.5));
    }

    #[test]
    fn test_view_serializes() {
        let json = serde_json::to_value(PositionView::default()).unwrap();
        assert_eq!(json["collateral_balance"], "0");
        assert_eq!(json["loan_to_value"], "0.00");
        assert!(json["error"].is_null());
    }
}

//! Transaction orchestrator: Deposit, Borrow and Approve workflows.
//!
//! Each workflow walks `Idle → Validating → (Approving) → Submitting →
//! Confirming → Settled | Failed`, logging every transition. Steps inside a
//! workflow are strictly sequential: an approval is confirmed before the
//! deposit that depends on it is submitted.
//!
//! One workflow of each kind may be in flight at a time. The flag is held by
//! a scoped guard, so every exit path (success, failure, guard rejection)
//! releases it.

use std::sync::atomic::{AtomicBool, Ordering};

use alloy::primitives::{Address, U256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::TransactionConfig;
use crate::core::gateway::Gateway;
use crate::core::network_guard::NetworkGuard;
use crate::core::snapshot::SnapshotBuilder;
use crate::errors::{Precondition, VaultError};
use crate::execution::{Confirmation, VaultServices};
use crate::types::wad::{decimal_to_wad, wad_to_decimal};
use crate::types::{AccountState, PositionDiff, PositionSnapshot};

// ---------------------------------------------------------------------------
// Intents and states
// ---------------------------------------------------------------------------

/// One user action. Created per request and dropped once it settles or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionIntent {
    Deposit(#[serde(with = "rust_decimal::serde::str")] Decimal),
    Borrow(#[serde(with = "rust_decimal::serde::str")] Decimal),
    Approve(#[serde(with = "rust_decimal::serde::str")] Decimal),
}

impl TransactionIntent {
    pub fn amount(&self) -> Decimal {
        match self {
            Self::Deposit(a) | Self::Borrow(a) | Self::Approve(a) => *a,
        }
    }

    pub fn kind(&self) -> WorkflowKind {
        match self {
            Self::Deposit(_) => WorkflowKind::Deposit,
            Self::Borrow(_) => WorkflowKind::Borrow,
            Self::Approve(_) => WorkflowKind::Approve,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Deposit,
    Borrow,
    Approve,
}

impl WorkflowKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Borrow => "borrow",
            Self::Approve => "approve",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    Validating,
    Approving,
    Submitting,
    Confirming,
    Settled,
    Failed,
}

/// Refresh run after a settled Deposit or Borrow. Failures are reported
/// here; the write itself is already final.
#[derive(Debug)]
pub struct PostSettleRefresh {
    pub account: Result<AccountState, VaultError>,
    pub snapshot: Result<PositionSnapshot, VaultError>,
}

#[derive(Debug)]
pub struct WorkflowOutcome {
    pub intent: TransactionIntent,
    /// States visited, `Idle` through `Settled`.
    pub states: Vec<WorkflowState>,
    pub confirmation: Confirmation,
    /// Confirmation of the approval a deposit had to send first.
    pub approval: Option<Confirmation>,
    /// Gas limit the primary write was sent with, when set explicitly.
    pub gas_limit: Option<u64>,
    /// `None` for Approve, which skips the refresh.
    pub refresh: Option<PostSettleRefresh>,
    pub diff: Option<PositionDiff>,
}

// ---------------------------------------------------------------------------
// In-flight flags
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct InFlight {
    deposit: AtomicBool,
    borrow: AtomicBool,
    approve: AtomicBool,
}

impl InFlight {
    fn flag(&self, kind: WorkflowKind) -> &AtomicBool {
        match kind {
            WorkflowKind::Deposit => &self.deposit,
            WorkflowKind::Borrow => &self.borrow,
            WorkflowKind::Approve => &self.approve,
        }
    }

    fn acquire(&self, kind: WorkflowKind) -> Result<InFlightGuard<'_>, VaultError> {
        let flag = self.flag(kind);
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Precondition::WorkflowInFlight {
                workflow: kind.name(),
            })?;
        Ok(InFlightGuard { flag })
    }
}

/// Clears its in-flight flag on drop.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Transition log
// ---------------------------------------------------------------------------

struct Transitions {
    kind: WorkflowKind,
    states: Vec<WorkflowState>,
}

impl Transitions {
    fn start(kind: WorkflowKind) -> Self {
        Self {
            kind,
            states: vec![WorkflowState::Idle],
        }
    }

    fn current(&self) -> WorkflowState {
        self.states.last().copied().unwrap_or(WorkflowState::Idle)
    }

    fn advance(&mut self, to: WorkflowState) {
        info!(
            workflow = self.kind.name(),
            from = ?self.current(),
            to = ?to,
            "workflow transition"
        );
        self.states.push(to);
    }

    fn fail(&mut self, err: &VaultError) {
        warn!(
            workflow = self.kind.name(),
            from = ?self.current(),
            to = ?WorkflowState::Failed,
            kind = ?err.kind(),
            error = %err,
            "workflow failed"
        );
        self.states.push(WorkflowState::Failed);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    services: VaultServices,
    gateway: Gateway,
    guard: NetworkGuard,
    snapshots: SnapshotBuilder,
    config: TransactionConfig,
    in_flight: InFlight,
}

impl Orchestrator {
    pub fn new(
        services: VaultServices,
        gateway: Gateway,
        expected_network: u64,
        config: TransactionConfig,
    ) -> Self {
        Self {
            guard: NetworkGuard::new(services.connectivity.clone(), expected_network),
            snapshots: SnapshotBuilder::new(services.clone(), gateway),
            services,
            gateway,
            config,
            in_flight: InFlight::default(),
        }
    }

    pub fn is_in_flight(&self, kind: WorkflowKind) -> bool {
        self.in_flight.flag(kind).load(Ordering::Acquire)
    }

    /// Run `intent` for `identity` to a terminal state.
    pub async fn execute(
        &self,
        intent: TransactionIntent,
        identity: Option<Address>,
    ) -> Result<WorkflowOutcome, VaultError> {
        let kind = intent.kind();
        let _in_flight = self.in_flight.acquire(kind).inspect_err(|e| {
            warn!(workflow = kind.name(), error = %e, "workflow rejected");
        })?;

        let mut transitions = Transitions::start(kind);
        let result = match intent {
            TransactionIntent::Deposit(amount) => {
                self.run_deposit(&mut transitions, identity, amount).await
            }
            TransactionIntent::Borrow(amount) => {
                self.run_borrow(&mut transitions, identity, amount).await
            }
            TransactionIntent::Approve(amount) => {
                self.run_approve(&mut transitions, identity, amount).await
            }
        };

        match result {
            Ok(mut outcome) => {
                outcome.intent = intent;
                outcome.states = transitions.states;
                Ok(outcome)
            }
            Err(e) => {
                transitions.fail(&e);
                Err(e)
            }
        }
    }

    pub async fn deposit(
        &self,
        amount: Decimal,
        identity: Option<Address>,
    ) -> Result<WorkflowOutcome, VaultError> {
        self.execute(TransactionIntent::Deposit(amount), identity).await
    }

    pub async fn borrow(
        &self,
        amount: Decimal,
        identity: Option<Address>,
    ) -> Result<WorkflowOutcome, VaultError> {
        self.execute(TransactionIntent::Borrow(amount), identity).await
    }

    pub async fn approve(
        &self,
        amount: Decimal,
        identity: Option<Address>,
    ) -> Result<WorkflowOutcome, VaultError> {
        self.execute(TransactionIntent::Approve(amount), identity).await
    }

    // -----------------------------------------------------------------------
    // Deposit
    // -----------------------------------------------------------------------

    async fn run_deposit(
        &self,
        transitions: &mut Transitions,
        identity: Option<Address>,
        amount: Decimal,
    ) -> Result<WorkflowOutcome, VaultError> {
        transitions.advance(WorkflowState::Validating);
        let owner = self.guard.assert_ready(identity).await?;
        let raw = validate_amount(amount)?;

        let account = self.snapshots.read_account(owner).await?;
        if account.balance < raw {
            return Err(Precondition::InsufficientBalance {
                available: wad_to_decimal(account.balance),
                required: amount,
            }
            .into());
        }

        let vault_addr = self.services.vault.address();
        let approval = if account.allowance.covers(raw) {
            None
        } else {
            transitions.advance(WorkflowState::Approving);
            info!(
                %owner,
                allowance = %wad_to_decimal(account.allowance.approved_amount),
                %amount,
                "allowance below deposit amount, approving"
            );
            let token = &self.services.token;
            let handle = self
                .gateway
                .call("approve", || token.approve(vault_addr, raw, None))
                .await?;
            Some(self.services.connectivity.confirm(handle).await?)
        };

        transitions.advance(WorkflowState::Submitting);
        let vault = &self.services.vault;
        let handle = self.gateway.call("deposit", || vault.deposit(raw)).await?;

        transitions.advance(WorkflowState::Confirming);
        let confirmation = self.services.connectivity.confirm(handle).await?;

        transitions.advance(WorkflowState::Settled);
        let (account, snapshot) = tokio::join!(
            self.snapshots.read_account(owner),
            self.snapshots.build(Some(owner)),
        );

        Ok(WorkflowOutcome {
            intent: TransactionIntent::Deposit(amount),
            states: Vec::new(),
            confirmation,
            approval,
            gas_limit: None,
            refresh: Some(PostSettleRefresh { account, snapshot }),
            diff: None,
        })
    }

    // -----------------------------------------------------------------------
    // Borrow
    // -----------------------------------------------------------------------

    async fn run_borrow(
        &self,
        transitions: &mut Transitions,
        identity: Option<Address>,
        amount: Decimal,
    ) -> Result<WorkflowOutcome, VaultError> {
        transitions.advance(WorkflowState::Validating);
        let owner = self.guard.assert_ready(identity).await?;
        let raw = validate_amount(amount)?;

        // Diagnostic only; the vault decides eligibility.
        let before = match self.snapshots.build(Some(owner)).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(%owner, error = %e, "pre-borrow snapshot unavailable");
                None
            }
        };

        let vault = &self.services.vault;
        let gas_limit = match self
            .gateway
            .call("estimateGas(borrow)", || vault.estimate_borrow(raw))
            .await
        {
            Ok(estimate) => buffered_gas_limit(
                estimate,
                self.config.gas_estimate_buffer,
                self.config.fallback_gas_limit,
            ),
            Err(e) => {
                warn!(
                    error = %e,
                    fallback = self.config.fallback_gas_limit,
                    "gas estimation failed, using fallback limit"
                );
                self.config.fallback_gas_limit
            }
        };

        transitions.advance(WorkflowState::Submitting);
        let handle = self
            .gateway
            .call("borrow", || vault.borrow(raw, gas_limit))
            .await?;

        transitions.advance(WorkflowState::Confirming);
        let confirmation = self.services.connectivity.confirm(handle).await?;

        transitions.advance(WorkflowState::Settled);
        let (account, snapshot) = tokio::join!(
            self.snapshots.read_account(owner),
            self.snapshots.build(Some(owner)),
        );

        let diff = match (&before, &snapshot) {
            (Some(before), Ok(after)) => {
                let diff = after.diff(before);
                info!(
                    %owner,
                    collateral_delta = %diff.collateral_delta,
                    debt_delta = %diff.debt_delta,
                    interest_delta = %diff.interest_delta,
                    "position change after borrow"
                );
                Some(diff)
            }
            _ => None,
        };

        Ok(WorkflowOutcome {
            intent: TransactionIntent::Borrow(amount),
            states: Vec::new(),
            confirmation,
            approval: None,
            gas_limit: Some(gas_limit),
            refresh: Some(PostSettleRefresh { account, snapshot }),
            diff,
        })
    }

    // -----------------------------------------------------------------------
    // Approve
    // -----------------------------------------------------------------------

    async fn run_approve(
        &self,
        transitions: &mut Transitions,
        identity: Option<Address>,
        amount: Decimal,
    ) -> Result<WorkflowOutcome, VaultError> {
        transitions.advance(WorkflowState::Validating);
        self.guard.assert_ready(identity).await?;
        let raw = validate_amount(amount)?;

        transitions.advance(WorkflowState::Submitting);
        let token = &self.services.token;
        let spender = self.services.vault.address();
        let gas_limit = self.config.approve_gas_limit;
        let handle = self
            .gateway
            .call("approve", || token.approve(spender, raw, Some(gas_limit)))
            .await?;

        transitions.advance(WorkflowState::Confirming);
        let confirmation = self.services.connectivity.confirm(handle).await?;

        transitions.advance(WorkflowState::Settled);
        Ok(WorkflowOutcome {
            intent: TransactionIntent::Approve(amount),
            states: Vec::new(),
            confirmation,
            approval: None,
            gas_limit: Some(gas_limit),
            refresh: None,
            diff: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Require a positive amount and scale it to WAD.
fn validate_amount(amount: Decimal) -> Result<U256, VaultError> {
    if amount <= Decimal::ZERO {
        return Err(Precondition::InvalidAmount {
            reason: format!("amount must be greater than zero, got {amount}"),
        }
        .into());
    }
    decimal_to_wad(amount)
}

/// `floor(estimate × buffer)`, or `fallback` if that does not fit a `u64`.
fn buffered_gas_limit(estimate: u64, buffer: Decimal, fallback: u64) -> u64 {
    Decimal::from(estimate)
        .checked_mul(buffer)
        .and_then(|limit| limit.floor().to_u64())
        .unwrap_or(fallback)
}

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Typed error hierarchy for the vault client.
///
/// Every collaborator adapter tags its failures with one of these variants at
/// the point of failure. Downstream code branches on the variant (via
/// [`VaultError::kind`] / [`VaultError::failure_class`]) and never inspects
/// message text.
#[derive(Error, Debug)]
pub enum VaultError {
    // -- Remote channel -----------------------------------------------------
    #[error("transient network error during {operation}: {reason}")]
    TransientNetwork { operation: String, reason: String },

    #[error("{operation} still failing after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<VaultError>,
    },

    // -- Remote rejections --------------------------------------------------
    #[error("{operation} rejected by remote service: {reason}")]
    Rejected { operation: String, reason: String },

    #[error("insufficient funds for fees: {reason}")]
    InsufficientFunds { reason: String },

    #[error("transaction reverted: {reason} (tx: {tx_hash})")]
    TxReverted { tx_hash: String, reason: String },

    #[error("request declined by user: {reason}")]
    UserDeclined { reason: String },

    // -- Local validation ---------------------------------------------------
    #[error("precondition failed: {0}")]
    Precondition(#[from] Precondition),

    #[error("degraded read: {field} unavailable ({reason})")]
    DegradedRead { field: &'static str, reason: String },

    // -- Configuration ------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}

/// Reasons a workflow is refused before any remote write is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    #[error("no connected account")]
    NoIdentity,

    #[error("no wallet provider available to sign requests")]
    NoWalletProvider,

    #[error("wrong network: connected to chain {actual}, expected {expected}")]
    WrongNetwork { expected: u64, actual: u64 },

    #[error("remote service unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("insufficient collateral balance: have {available}, need {required}")]
    InsufficientBalance {
        available: Decimal,
        required: Decimal,
    },

    #[error("a {workflow} workflow is already in flight")]
    WorkflowInFlight { workflow: &'static str },
}

/// Error taxonomy shared by all components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransientNetwork,
    /// Transient failures outlasted the retry bound.
    TransientExhausted,
    DeterministicRemoteRejection,
    PreconditionFailure,
    DegradedRead,
    UserDeclined,
    Configuration,
}

/// Coarse grouping used for user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Connectivity,
    InsufficientFunds,
    UserDeclined,
    Other,
}

impl VaultError {
    pub fn transient(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransientNetwork {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TransientNetwork { .. } => ErrorKind::TransientNetwork,
            Self::RetriesExhausted { .. } => ErrorKind::TransientExhausted,
            Self::Rejected { .. } | Self::InsufficientFunds { .. } | Self::TxReverted { .. } => {
                ErrorKind::DeterministicRemoteRejection
            }
            Self::UserDeclined { .. } => ErrorKind::UserDeclined,
            Self::Precondition(_) => ErrorKind::PreconditionFailure,
            Self::DegradedRead { .. } => ErrorKind::DegradedRead,
            Self::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Only transient failures are eligible for retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }

    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::TransientNetwork { .. } | Self::RetriesExhausted { .. } => {
                FailureClass::Connectivity
            }
            Self::Precondition(Precondition::Unreachable { .. }) => FailureClass::Connectivity,
            Self::InsufficientFunds { .. } => FailureClass::InsufficientFunds,
            Self::UserDeclined { .. } => FailureClass::UserDeclined,
            _ => FailureClass::Other,
        }
    }

    /// Human-readable message for a failed `action` (e.g. "borrow").
    pub fn user_message(&self, action: &str) -> String {
        let detail = match self.failure_class() {
            FailureClass::Connectivity => "Network connection issue. Please try again.".to_string(),
            FailureClass::InsufficientFunds => {
                "Insufficient funds for gas. Please check your wallet balance.".to_string()
            }
            FailureClass::UserDeclined => "Transaction was rejected.".to_string(),
            FailureClass::Other => self.to_string(),
        };
        format!("Failed to {action}: {detail}")
    }
}

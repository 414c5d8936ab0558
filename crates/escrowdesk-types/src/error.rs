//! Error types for the EscrowDesk escrow engine.
//!
//! All errors use the `ESC_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors (bad input, no state change)
//! - 2xx: Authorization errors
//! - 3xx: Concurrency errors (transient, caller may retry)
//! - 4xx: Ledger errors (deal state unchanged, retryable by an admin)
//! - 5xx: Deal state errors
//! - 6xx: Webhook errors
//! - 9xx: Storage / general / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{DealId, DealStatus, Handle, OrderSide};

/// Coarse classification of an [`EscrowError`], used by front ends to decide
/// how to phrase a reply and whether to suggest a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Authorization,
    Concurrency,
    Ledger,
    State,
    Internal,
}

/// Central error enum for all EscrowDesk operations.
#[derive(Debug, Error)]
pub enum EscrowError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// The amount could not be parsed or is not positive.
    #[error("ESC_ERR_100: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// The amount lies outside the configured transaction bounds.
    #[error("ESC_ERR_101: Amount {amount} outside allowed range [{min}, {max}]")]
    AmountOutOfRange {
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },

    /// The wallet address failed format validation.
    #[error("ESC_ERR_102: Invalid wallet address: {0}")]
    InvalidAddress(String),

    /// A command received the wrong number of arguments.
    #[error("ESC_ERR_103: Usage: {usage}")]
    WrongArgumentCount { usage: &'static str },

    /// The command name is not recognised.
    #[error("ESC_ERR_104: Unknown command: {0}")]
    UnknownCommand(String),

    /// A deal identifier could not be parsed.
    #[error("ESC_ERR_105: Invalid deal id: {0}")]
    InvalidDealId(String),

    /// The user has no registered payout wallet.
    #[error("ESC_ERR_106: No wallet registered for {0}")]
    WalletNotRegistered(Handle),

    /// Buyer and seller are the same handle.
    #[error("ESC_ERR_107: Buyer and seller must differ")]
    SelfDeal,

    // =================================================================
    // Authorization Errors (2xx)
    // =================================================================
    /// A non-admin invoked an admin command.
    #[error("ESC_ERR_200: {0} is not an administrator")]
    NotAdmin(Handle),

    /// A blacklisted user tried to trade.
    #[error("ESC_ERR_201: {0} is blacklisted")]
    Blacklisted(Handle),

    /// The actor is not the party allowed to perform this step.
    #[error("ESC_ERR_202: {actor} is not the {role} of deal {deal_id}")]
    NotAParty {
        actor: Handle,
        role: &'static str,
        deal_id: DealId,
    },

    /// The command came from a channel other than the configured group.
    #[error("ESC_ERR_203: Commands are only accepted in the escrow group")]
    WrongChannel,

    // =================================================================
    // Concurrency Errors (3xx)
    // =================================================================
    /// An identical active order already exists for this user.
    #[error("ESC_ERR_300: Duplicate {side} order of {amount} for {owner}")]
    DuplicateOrder {
        owner: Handle,
        side: OrderSide,
        amount: Decimal,
    },

    /// Another deal is already in flight (system-wide one-deal invariant).
    #[error("ESC_ERR_301: Deal {0} is already in progress; try again later")]
    DealInFlight(DealId),

    /// The payment was already claimed by another reconciliation pass.
    #[error("ESC_ERR_302: Payment for deal {deal_id} of {amount} already claimed")]
    PaymentAlreadyClaimed { deal_id: DealId, amount: Decimal },

    /// Rate limit exceeded for this user.
    #[error("ESC_ERR_303: Rate limit exceeded: {reason}")]
    RateLimited { reason: String },

    // =================================================================
    // Ledger Errors (4xx)
    // =================================================================
    /// The custodial wallet lacks the native gas reserve for a transfer.
    #[error("ESC_ERR_400: Insufficient gas: need {needed}, have {available}")]
    InsufficientGas { needed: Decimal, available: Decimal },

    /// Transfer submission failed (network error, nonce conflict, ...).
    #[error("ESC_ERR_401: Transfer submission failed: {reason}")]
    SubmissionFailed { reason: String },

    /// Balance read failed.
    #[error("ESC_ERR_402: Balance read failed: {reason}")]
    BalanceUnavailable { reason: String },

    // =================================================================
    // Deal State Errors (5xx)
    // =================================================================
    /// No deal with this identifier exists.
    #[error("ESC_ERR_500: Deal not found: {0}")]
    DealNotFound(DealId),

    /// The deal is not in a status that permits this operation.
    #[error("ESC_ERR_501: Deal {deal_id} is {actual}, cannot {action}")]
    InvalidTransition {
        deal_id: DealId,
        actual: DealStatus,
        action: &'static str,
    },

    /// The user already has nothing to cancel.
    #[error("ESC_ERR_502: Nothing to cancel for {0}")]
    NothingToCancel(Handle),

    /// The handle is already on the blacklist.
    #[error("ESC_ERR_503: {0} is already blacklisted")]
    AlreadyBlacklisted(Handle),

    // =================================================================
    // Webhook Errors (6xx)
    // =================================================================
    /// The webhook signature did not verify.
    #[error("ESC_ERR_600: Webhook signature invalid")]
    InvalidSignature,

    /// The webhook capability is not configured.
    #[error("ESC_ERR_601: Payment forwarding is not enabled")]
    ForwardingDisabled,

    /// The webhook body could not be understood.
    #[error("ESC_ERR_602: Malformed webhook payload: {0}")]
    MalformedWebhook(String),

    // =================================================================
    // Storage / General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("ESC_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("ESC_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("ESC_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("ESC_ERR_903: I/O error: {0}")]
    Io(String),
}

impl EscrowError {
    /// Classify this error according to the escrow error taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount { .. }
            | Self::AmountOutOfRange { .. }
            | Self::InvalidAddress(_)
            | Self::WrongArgumentCount { .. }
            | Self::UnknownCommand(_)
            | Self::InvalidDealId(_)
            | Self::WalletNotRegistered(_)
            | Self::SelfDeal
            | Self::MalformedWebhook(_) => ErrorKind::Validation,
            Self::NotAdmin(_)
            | Self::Blacklisted(_)
            | Self::NotAParty { .. }
            | Self::WrongChannel
            | Self::InvalidSignature
            | Self::ForwardingDisabled => ErrorKind::Authorization,
            Self::DuplicateOrder { .. }
            | Self::DealInFlight(_)
            | Self::PaymentAlreadyClaimed { .. }
            | Self::RateLimited { .. } => ErrorKind::Concurrency,
            Self::InsufficientGas { .. }
            | Self::SubmissionFailed { .. }
            | Self::BalanceUnavailable { .. } => ErrorKind::Ledger,
            Self::DealNotFound(_)
            | Self::InvalidTransition { .. }
            | Self::NothingToCancel(_)
            | Self::AlreadyBlacklisted(_) => ErrorKind::State,
            Self::Internal(_) | Self::Serialization(_) | Self::Configuration(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Transient conditions the caller may simply retry later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Concurrency | ErrorKind::Ledger)
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, EscrowError>;

impl From<std::io::Error> for EscrowError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for EscrowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

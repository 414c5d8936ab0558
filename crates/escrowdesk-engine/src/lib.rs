//! # escrowdesk-engine
//!
//! The escrow core: matches fixed-amount buy and sell orders, holds the
//! seller's tokens in a custodial wallet, and releases them to the buyer
//! once both parties confirm the off-chain fiat payment.
//!
//! ## Flow
//!
//! ```text
//! place_order ─▶ OrderBook ─(match)─▶ Deal WAITING_DEPOSIT
//!                                          │ reconcile_once / handle_webhook
//!                                          ▼
//!                                      DEPOSITED ─ confirm_fiat_sent ─▶ FIAT_SENT
//!                                                                          │ confirm_fiat_received
//!                                                                          ▼
//!                                              ReleaseExecutor ─▶ LedgerClient ─▶ RELEASED
//! ```
//!
//! ## Components
//!
//! - [`EscrowDesk`]: coordinator owning the ports and the single repository lock
//! - [`book`]: exact-amount order matching
//! - [`lifecycle`]: party checks and deal transitions
//! - [`reconcile`]: balance-delta deposit detection and expiry sweep
//! - [`release`]: gas pre-check and token transfer out of custody
//! - [`webhook`]: signed forwarding-provider deposits
//! - [`commands`]: chat command parsing and dispatch
//! - [`ports`] / [`clock`]: the boundaries to the ledger, messaging and time
//!
//! Only one deal may be in flight across the whole system; see
//! [`escrowdesk_types::DealBook::in_flight`].

pub mod admin;
pub mod book;
pub mod clock;
pub mod commands;
pub mod desk;
pub mod lifecycle;
pub mod ports;
pub mod reconcile;
pub mod release;
pub mod settlement;
pub mod task;
pub mod trading;
pub mod units;
pub mod webhook;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use book::{BookSnapshot, OrderBook, Placement};
pub use clock::{Clock, SystemClock};
pub use commands::{Command, InboundCommand, Reply};
pub use desk::EscrowDesk;
pub use ports::{ForwardingProvider, LedgerClient, Notifier, TransferRequest};
pub use reconcile::{
    AcceptRegisteredSender, CycleReport, DepositMatch, DepositOutcome, ObservedDeposit,
    SenderVerifier,
};
pub use release::{GasCheck, ReleaseExecutor};
pub use task::spawn_reconciliation;
pub use trading::{CancelSummary, OrderOutcome};
pub use webhook::{WebhookEvent, WebhookOutcome, verify_signature};

#[cfg(any(test, feature = "test-helpers"))]
pub use clock::ManualClock;

//! # escrowdesk-types
//!
//! Shared types, errors, and configuration for the **EscrowDesk** escrow engine.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`DealId`], [`OrderId`], [`Handle`], [`ChannelId`], [`TransferReference`]
//! - **Wallets**: [`WalletAddress`], [`SellerWallet`], [`WalletRegistry`]
//! - **Order model**: [`Order`], [`OrderSide`], [`OrderStatus`], [`OrderBookState`]
//! - **Deal model**: [`Deal`], [`DealStatus`], [`DealBook`]
//! - **Blacklist**: [`Blacklist`]
//! - **Notifications**: [`Notification`], [`AlertReason`]
//! - **Configuration**: [`EscrowConfig`], [`RateLimitConfig`], [`ForwardingConfig`]
//! - **Errors**: [`EscrowError`] with `ESC_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod blacklist;
pub mod config;
pub mod constants;
pub mod deal;
pub mod error;
pub mod ids;
pub mod notification;
pub mod order;
pub mod wallet;

// Re-export all primary types at crate root for ergonomic imports:
//   use escrowdesk_types::{Deal, DealStatus, Order, OrderSide, ...};

pub use blacklist::*;
pub use config::*;
pub use deal::*;
pub use error::*;
pub use ids::*;
pub use notification::*;
pub use order::*;
pub use wallet::*;

// Constants are accessed via `escrowdesk_types::constants::FOO`
// (not re-exported to avoid name collisions).

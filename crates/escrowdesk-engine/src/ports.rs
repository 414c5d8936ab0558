//! Outbound ports: the ledger, the messaging gateway, the optional
//! payment-forwarding provider.
//!
//! Implementations live outside this crate. Private key material belongs to
//! the [`LedgerClient`] implementation and never crosses this boundary.

use async_trait::async_trait;
use escrowdesk_types::{ChannelId, Deal, Notification, Result, TransferReference, WalletAddress};
use rust_decimal::Decimal;

/// A token transfer out of the custodial wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub from: WalletAddress,
    pub to: WalletAddress,
    pub token_id: String,
    /// Amount in the token's smallest unit.
    pub amount_units: u128,
}

/// Read balances and submit transfers on the token ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Number of decimals the token uses for its base unit.
    fn token_decimals(&self) -> u32;

    /// Token balance of `address`, in base units.
    async fn token_balance(&self, address: &WalletAddress, token_id: &str) -> Result<u128>;

    /// Native (gas) balance of `address`, in whole coins.
    async fn native_balance(&self, address: &WalletAddress) -> Result<Decimal>;

    /// Sign and broadcast a transfer. Returns the transaction reference.
    async fn submit_transfer(&self, request: &TransferRequest) -> Result<TransferReference>;
}

/// Delivers structured notifications to a chat channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: ChannelId, notification: &Notification) -> Result<()>;
}

/// Issues a per-deal deposit address that forwards into custody.
#[async_trait]
pub trait ForwardingProvider: Send + Sync {
    async fn create_forwarding_address(&self, deal: &Deal) -> Result<String>;
}

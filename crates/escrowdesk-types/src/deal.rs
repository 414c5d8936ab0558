//! # Deal: one escrow transaction between a matched buyer and seller
//!
//! ## State Machine
//!
//! ```text
//!                 reconciliation          buyer             seller (both flags)
//!  ┌─────────────────┐   ┌───────────┐  "sent"  ┌───────────┐ "received" ┌──────────┐
//!  │ WAITING_DEPOSIT ├──▶│ DEPOSITED ├─────────▶│ FIAT_SENT ├───────────▶│ RELEASED │
//!  └──┬──────────────┘   └─────┬─────┘          └─────┬─────┘            └──────────┘
//!     │ wrong amount/sender     │ dispute              │ "not received"        ▲
//!     ▼                         ▼                      ▼                       │ admin
//!  CANCELLED_WRONG_*        ┌──────────┐◀──────────────┘                       │
//!                           │ DISPUTED ├───────────────────────────────────────┘
//!                           └──────────┘
//! ```
//!
//! User cancellation is possible from `WAITING_DEPOSIT` and `DEPOSITED` only.
//! Administrative emergency release / refund can unwind any deal that may
//! hold funds. Expiry is a deletion, not a status.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{DealId, EscrowError, Handle, Result, SellerWallet, TransferReference, WalletAddress};

/// The lifecycle status of a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    /// Matched; waiting for the seller's tokens to reach the custodial wallet.
    WaitingDeposit,
    /// Tokens observed in custody. Buyer should now pay fiat.
    Deposited,
    /// Buyer says fiat was sent. Waiting for the seller.
    FiatSent,
    /// Seller reported non-receipt (or a party raised a dispute).
    Disputed,
    /// Tokens delivered to the buyer.
    Released,
    /// Observed deposit did not match the expected amount.
    CancelledWrongAmount,
    /// Deposit did not come from the seller's authorized wallet.
    CancelledWrongSender,
    /// A party cancelled before fiat was committed.
    CancelledByUser,
    /// Admin override: tokens sent to the buyer.
    EmergencyReleased,
    /// Admin override: tokens returned to an admin-chosen address.
    EmergencyRefunded,
}

impl DealStatus {
    /// Statuses that count against the system-wide one-deal limit.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::WaitingDeposit | Self::Deposited | Self::FiatSent | Self::Disputed
        )
    }

    /// No further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Released | Self::CancelledByUser | Self::EmergencyReleased | Self::EmergencyRefunded
        )
    }

    /// Can this deal move to `target`?
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        use DealStatus::{
            CancelledByUser, CancelledWrongAmount, CancelledWrongSender, Deposited, Disputed,
            EmergencyRefunded, EmergencyReleased, FiatSent, Released, WaitingDeposit,
        };
        matches!(
            (self, target),
            (
                WaitingDeposit,
                Deposited | CancelledWrongAmount | CancelledWrongSender | CancelledByUser
            ) | (Deposited, FiatSent | Disputed | CancelledByUser)
                | (FiatSent, Released | Disputed)
                | (Disputed, Released)
                | (
                    WaitingDeposit | Deposited | FiatSent | Disputed,
                    EmergencyReleased | EmergencyRefunded
                )
                | (CancelledWrongAmount | CancelledWrongSender, EmergencyRefunded)
        )
    }
}

impl std::fmt::Display for DealStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::WaitingDeposit => "waiting_deposit",
            Self::Deposited => "deposited",
            Self::FiatSent => "fiat_sent",
            Self::Disputed => "disputed",
            Self::Released => "released",
            Self::CancelledWrongAmount => "cancelled_wrong_amount",
            Self::CancelledWrongSender => "cancelled_wrong_sender",
            Self::CancelledByUser => "cancelled_by_user",
            Self::EmergencyReleased => "emergency_released",
            Self::EmergencyRefunded => "emergency_refunded",
        };
        f.write_str(s)
    }
}

/// A single escrow transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub buyer: Handle,
    pub seller: Handle,
    /// Expected deposit, in whole tokens.
    pub amount: Decimal,
    /// Where released tokens are sent.
    pub buyer_wallet: WalletAddress,
    /// Wallet the seller is expected to deposit from.
    pub seller_wallet: SellerWallet,
    pub status: DealStatus,
    pub buyer_confirmed: bool,
    pub seller_confirmed: bool,
    pub created_at: DateTime<Utc>,
    /// Forwarding address issued for this deal, when a provider is configured.
    pub deposit_address: Option<String>,
    pub dispute_reason: Option<String>,
    pub cancel_reason: Option<String>,
    /// Provider transaction id of the deposit (webhook path only).
    pub deposit_reference: Option<TransferReference>,
    /// Outbound transfer (release or refund).
    pub transfer_reference: Option<TransferReference>,
    /// Recorded when the observed deposit diverged from `amount`.
    pub received_amount: Option<Decimal>,
}

impl Deal {
    #[must_use]
    pub fn new(
        buyer: Handle,
        seller: Handle,
        amount: Decimal,
        buyer_wallet: WalletAddress,
        seller_wallet: SellerWallet,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DealId::new(),
            buyer,
            seller,
            amount,
            buyer_wallet,
            seller_wallet,
            status: DealStatus::WaitingDeposit,
            buyer_confirmed: false,
            seller_confirmed: false,
            created_at,
            deposit_address: None,
            dispute_reason: None,
            cancel_reason: None,
            deposit_reference: None,
            transfer_reference: None,
            received_amount: None,
        }
    }

    /// Move to `target`, refusing transitions the state machine forbids.
    ///
    /// # Errors
    /// Returns `InvalidTransition` naming `action` when the move is illegal.
    pub fn transition(&mut self, target: DealStatus, action: &'static str) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(EscrowError::InvalidTransition {
                deal_id: self.id,
                actual: self.status,
                action,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Require the deal to currently be in one of `allowed`.
    pub fn expect_status(&self, allowed: &[DealStatus], action: &'static str) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(EscrowError::InvalidTransition {
                deal_id: self.id,
                actual: self.status,
                action,
            })
        }
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.status.is_in_flight()
    }

    #[must_use]
    pub fn is_party(&self, handle: &Handle) -> bool {
        &self.buyer == handle || &self.seller == handle
    }

    /// The other party of the deal, if `handle` is one of them.
    #[must_use]
    pub fn counterparty(&self, handle: &Handle) -> Option<&Handle> {
        if &self.buyer == handle {
            Some(&self.seller)
        } else if &self.seller == handle {
            Some(&self.buyer)
        } else {
            None
        }
    }

    /// An in-flight deal older than `ttl` at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.is_in_flight() && now - self.created_at > ttl
    }

    #[must_use]
    pub fn both_confirmed(&self) -> bool {
        self.buyer_confirmed && self.seller_confirmed
    }
}

/// The persisted deal family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealBook {
    deals: BTreeMap<DealId, Deal>,
}

impl DealBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, deal: Deal) {
        self.deals.insert(deal.id, deal);
    }

    #[must_use]
    pub fn get(&self, id: &DealId) -> Option<&Deal> {
        self.deals.get(id)
    }

    /// # Errors
    /// Returns `DealNotFound` if no deal has this id.
    pub fn get_mut(&mut self, id: &DealId) -> Result<&mut Deal> {
        self.deals.get_mut(id).ok_or(EscrowError::DealNotFound(*id))
    }

    pub fn remove(&mut self, id: &DealId) -> Option<Deal> {
        self.deals.remove(id)
    }

    /// The deal currently holding the in-flight slot, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<&Deal> {
        self.deals.values().find(|d| d.is_in_flight())
    }

    /// Deals awaiting deposit, oldest first.
    pub fn waiting_deposit(&self) -> impl Iterator<Item = &Deal> {
        self.deals
            .values()
            .filter(|d| d.status == DealStatus::WaitingDeposit)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Deal> {
        self.deals.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Deal> {
        self.deals.values_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deals.is_empty()
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Deal {
    pub fn dummy(amount: Decimal) -> Self {
        Self::new(
            Handle::new("@buyer"),
            Handle::new("@seller"),
            amount,
            WalletAddress::parse("0x1111111111111111111111111111111111111111")
                .expect("static address is valid"),
            SellerWallet::Unset,
            Utc::now(),
        )
    }
}

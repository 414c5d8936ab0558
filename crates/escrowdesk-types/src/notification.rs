//! Structured notifications pushed to the messaging gateway.
//!
//! The engine never formats chat text; it emits these events and the
//! gateway renders them for the group channel.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Deal, DealId, Handle, TransferReference, WalletAddress};

/// Why administrators are being paged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AlertReason {
    /// Deposit larger or smaller than the deal amount; needs a manual refund.
    WrongAmount { expected: Decimal, received: Decimal },
    /// Deposit could not be attributed to the seller's registered wallet.
    WrongSender { expected_wallet: String },
    /// A release or refund transfer failed; needs an admin force retry.
    TransferFailed { error: String },
    /// A handle was added to the blacklist.
    ScammerMarked { handle: Handle },
    /// A deal holding funds was cancelled by a party.
    CancelledWithFunds { cancelled_by: Handle },
}

/// Outbound event addressed to the escrow group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum Notification {
    DealCreated {
        deal: Box<Deal>,
        /// Address the seller must deposit to.
        deposit_to: String,
    },
    DepositConfirmed {
        deal_id: DealId,
        buyer: Handle,
        seller: Handle,
        amount: Decimal,
    },
    FiatSent {
        deal_id: DealId,
        seller: Handle,
    },
    DisputeOpened {
        deal_id: DealId,
        raised_by: Handle,
        reason: String,
    },
    DealCompleted {
        deal_id: DealId,
        buyer: Handle,
        amount: Decimal,
        transfer: TransferReference,
    },
    DealCancelled {
        deal_id: DealId,
        cancelled_by: Handle,
        counterparty: Handle,
    },
    DealExpired {
        deal_id: DealId,
        buyer: Handle,
        seller: Handle,
    },
    EmergencyReleased {
        deal_id: DealId,
        to: WalletAddress,
        amount: Decimal,
        transfer: TransferReference,
    },
    Refunded {
        deal_id: DealId,
        to: WalletAddress,
        amount: Decimal,
        transfer: TransferReference,
    },
    SecurityAlert {
        deal_id: Option<DealId>,
        reason: AlertReason,
    },
}

impl Notification {
    /// The deal this event concerns, if any.
    #[must_use]
    pub fn deal_id(&self) -> Option<DealId> {
        match self {
            Self::DealCreated { deal, .. } => Some(deal.id),
            Self::DepositConfirmed { deal_id, .. }
            | Self::FiatSent { deal_id, .. }
            | Self::DisputeOpened { deal_id, .. }
            | Self::DealCompleted { deal_id, .. }
            | Self::DealCancelled { deal_id, .. }
            | Self::DealExpired { deal_id, .. }
            | Self::EmergencyReleased { deal_id, .. }
            | Self::Refunded { deal_id, .. } => Some(*deal_id),
            Self::SecurityAlert { deal_id, .. } => *deal_id,
        }
    }

    /// Security alerts are the events administrators must act on.
    #[must_use]
    pub fn is_alert(&self) -> bool {
        matches!(self, Self::SecurityAlert { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_serializes_with_tags() {
        let alert = Notification::SecurityAlert {
            deal_id: None,
            reason: AlertReason::WrongAmount {
                expected: Decimal::TEN,
                received: Decimal::new(15, 0),
            },
        };
        let json = serde_json::to_string(&alert).unwrap();
        assert!(json.contains("\"event\":\"security_alert\""), "{json}");
        assert!(json.contains("\"kind\":\"wrong_amount\""), "{json}");
        assert!(alert.is_alert());
    }

    #[test]
    fn deal_id_extraction() {
        let id = DealId::new();
        let n = Notification::FiatSent {
            deal_id: id,
            seller: Handle::new("@s"),
        };
        assert_eq!(n.deal_id(), Some(id));
        assert!(!n.is_alert());
    }
}

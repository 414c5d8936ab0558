//! Deal state machine: party checks and the user-driven transitions.
//!
//! These functions only mutate the in-memory [`Deal`]. Persistence,
//! notifications and fund movement are the coordinator's job.

use escrowdesk_types::{Deal, DealStatus, EscrowError, Handle, Result};

/// Statuses from which an admin may release to the buyer.
pub const RELEASABLE: &[DealStatus] = &[DealStatus::FiatSent, DealStatus::Disputed];

/// Statuses from which an emergency release may run.
pub const EMERGENCY_RELEASABLE: &[DealStatus] = &[
    DealStatus::WaitingDeposit,
    DealStatus::Deposited,
    DealStatus::FiatSent,
    DealStatus::Disputed,
];

/// Statuses from which custody may be refunded to an admin-chosen address.
pub const REFUNDABLE: &[DealStatus] = &[
    DealStatus::WaitingDeposit,
    DealStatus::Deposited,
    DealStatus::FiatSent,
    DealStatus::Disputed,
    DealStatus::CancelledWrongAmount,
    DealStatus::CancelledWrongSender,
];

/// Statuses a party may cancel from.
pub const CANCELLABLE: &[DealStatus] = &[DealStatus::WaitingDeposit, DealStatus::Deposited];

fn require_buyer(deal: &Deal, actor: &Handle) -> Result<()> {
    if &deal.buyer == actor {
        Ok(())
    } else {
        Err(EscrowError::NotAParty {
            actor: actor.clone(),
            role: "buyer",
            deal_id: deal.id,
        })
    }
}

fn require_seller(deal: &Deal, actor: &Handle) -> Result<()> {
    if &deal.seller == actor {
        Ok(())
    } else {
        Err(EscrowError::NotAParty {
            actor: actor.clone(),
            role: "seller",
            deal_id: deal.id,
        })
    }
}

fn require_party(deal: &Deal, actor: &Handle) -> Result<()> {
    if deal.is_party(actor) {
        Ok(())
    } else {
        Err(EscrowError::NotAParty {
            actor: actor.clone(),
            role: "party",
            deal_id: deal.id,
        })
    }
}

/// Buyer declares fiat sent: `Deposited → FiatSent`.
pub fn mark_fiat_sent(deal: &mut Deal, actor: &Handle) -> Result<()> {
    require_buyer(deal, actor)?;
    deal.expect_status(&[DealStatus::Deposited], "confirm fiat sent")?;
    deal.transition(DealStatus::FiatSent, "confirm fiat sent")?;
    deal.buyer_confirmed = true;
    Ok(())
}

/// Seller acknowledges fiat. Returns `true` when both parties have now
/// confirmed and the deal is ready for release. The status is unchanged
/// until the transfer succeeds.
pub fn mark_fiat_received(deal: &mut Deal, actor: &Handle) -> Result<bool> {
    require_seller(deal, actor)?;
    deal.expect_status(&[DealStatus::FiatSent], "confirm fiat received")?;
    deal.seller_confirmed = true;
    Ok(deal.both_confirmed())
}

/// Seller disputes receipt: `FiatSent → Disputed`.
pub fn mark_not_received(deal: &mut Deal, actor: &Handle) -> Result<()> {
    require_seller(deal, actor)?;
    deal.expect_status(&[DealStatus::FiatSent], "report not received")?;
    deal.transition(DealStatus::Disputed, "report not received")?;
    deal.dispute_reason = Some(format!("{actor} reports fiat not received"));
    Ok(())
}

/// Either party disputes a funded deal: `Deposited | FiatSent → Disputed`.
pub fn open_dispute(deal: &mut Deal, actor: &Handle, reason: &str) -> Result<()> {
    require_party(deal, actor)?;
    deal.expect_status(&[DealStatus::Deposited, DealStatus::FiatSent], "open dispute")?;
    deal.transition(DealStatus::Disputed, "open dispute")?;
    let reason = reason.trim();
    deal.dispute_reason = Some(if reason.is_empty() {
        format!("dispute opened by {actor}")
    } else {
        reason.to_string()
    });
    Ok(())
}

/// A party withdraws before fiat is committed.
pub fn cancel_by(deal: &mut Deal, actor: &Handle) -> Result<()> {
    require_party(deal, actor)?;
    deal.expect_status(CANCELLABLE, "cancel")?;
    deal.transition(DealStatus::CancelledByUser, "cancel")?;
    deal.cancel_reason = Some(format!("cancelled by {actor}"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn buyer() -> Handle {
        Handle::new("@buyer")
    }

    fn seller() -> Handle {
        Handle::new("@seller")
    }

    fn deposited() -> Deal {
        let mut deal = Deal::dummy(Decimal::TEN);
        deal.transition(DealStatus::Deposited, "deposit").unwrap();
        deal
    }

    #[test]
    fn dual_confirmation_path() {
        let mut deal = deposited();
        mark_fiat_sent(&mut deal, &buyer()).unwrap();
        assert_eq!(deal.status, DealStatus::FiatSent);
        assert!(deal.buyer_confirmed);
        assert!(!deal.both_confirmed());

        assert!(mark_fiat_received(&mut deal, &seller()).unwrap());
        // Release has not happened yet.
        assert_eq!(deal.status, DealStatus::FiatSent);
    }

    #[test]
    fn only_buyer_marks_sent() {
        let mut deal = deposited();
        let err = mark_fiat_sent(&mut deal, &seller()).unwrap_err();
        assert!(matches!(err, EscrowError::NotAParty { role: "buyer", .. }));
        assert_eq!(deal.status, DealStatus::Deposited);
    }

    #[test]
    fn only_seller_marks_received() {
        let mut deal = deposited();
        mark_fiat_sent(&mut deal, &buyer()).unwrap();
        let err = mark_fiat_received(&mut deal, &buyer()).unwrap_err();
        assert!(matches!(err, EscrowError::NotAParty { role: "seller", .. }));
        assert!(!deal.seller_confirmed);
    }

    #[test]
    fn sent_before_deposit_rejected() {
        let mut deal = Deal::dummy(Decimal::TEN);
        let err = mark_fiat_sent(&mut deal, &buyer()).unwrap_err();
        assert!(matches!(
            err,
            EscrowError::InvalidTransition { actual: DealStatus::WaitingDeposit, .. }
        ));
        assert!(!deal.buyer_confirmed);
    }

    #[test]
    fn not_received_disputes() {
        let mut deal = deposited();
        mark_fiat_sent(&mut deal, &buyer()).unwrap();
        mark_not_received(&mut deal, &seller()).unwrap();
        assert_eq!(deal.status, DealStatus::Disputed);
        assert!(deal.dispute_reason.is_some());
    }

    #[test]
    fn dispute_needs_funded_deal() {
        let mut deal = Deal::dummy(Decimal::TEN);
        assert!(open_dispute(&mut deal, &buyer(), "no show").is_err());

        let mut deal = deposited();
        open_dispute(&mut deal, &seller(), "  ").unwrap();
        assert_eq!(deal.status, DealStatus::Disputed);
        assert_eq!(deal.dispute_reason.as_deref(), Some("dispute opened by @seller"));
    }

    #[test]
    fn outsider_cannot_cancel() {
        let mut deal = Deal::dummy(Decimal::TEN);
        let err = cancel_by(&mut deal, &Handle::new("@mallory")).unwrap_err();
        assert!(matches!(err, EscrowError::NotAParty { .. }));
    }

    #[test]
    fn cancel_blocked_once_fiat_sent() {
        let mut deal = deposited();
        mark_fiat_sent(&mut deal, &buyer()).unwrap();
        assert!(cancel_by(&mut deal, &buyer()).is_err());
        assert_eq!(deal.status, DealStatus::FiatSent);
    }
}

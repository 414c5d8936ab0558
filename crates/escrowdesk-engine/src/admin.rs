//! Administrative overrides. Every entry point checks the caller against
//! the configured admin list before touching state.

use escrowdesk_types::{
    AlertReason, Deal, DealId, DealStatus, EscrowError, Handle, Notification, Order, Result,
    WalletAddress,
};

use crate::book::OrderBook;
use crate::desk::EscrowDesk;
use crate::lifecycle;
use crate::release::GasCheck;
use crate::settlement::Payout;

impl EscrowDesk {
    /// Release a `FiatSent` or `Disputed` deal to the buyer, regardless of
    /// confirmation flags.
    ///
    /// # Errors
    /// `NotAdmin`, `DealNotFound`, `InvalidTransition`, or the release error.
    pub async fn admin_release(&self, admin: &Handle, deal_id: DealId) -> Result<Deal> {
        self.release_as_admin(admin, deal_id, GasCheck::Required).await
    }

    /// As [`EscrowDesk::admin_release`] but without the gas pre-check, for
    /// retrying after a transfer failure.
    pub async fn admin_force_release(&self, admin: &Handle, deal_id: DealId) -> Result<Deal> {
        self.release_as_admin(admin, deal_id, GasCheck::Skip).await
    }

    async fn release_as_admin(&self, admin: &Handle, deal_id: DealId, gas: GasCheck) -> Result<Deal> {
        self.ensure_admin(admin)?;
        let guard = self.state.lock().await;
        let mut deals = self.repo.load_deals()?;
        let deal = deals.get_mut(&deal_id)?;
        deal.expect_status(lifecycle::RELEASABLE, "admin release")?;
        tracing::warn!(deal_id = %deal_id, admin = %admin, force = gas == GasCheck::Skip, "admin release");

        let outcome = self
            .pay_out(
                deal,
                Payout::ToBuyer {
                    target: DealStatus::Released,
                },
                gas,
            )
            .await;
        self.finish_payout(guard, &deals, deal_id, outcome, false).await
    }

    /// Send the escrowed amount to the buyer from any in-flight status.
    pub async fn admin_emergency_release(&self, admin: &Handle, deal_id: DealId) -> Result<Deal> {
        self.ensure_admin(admin)?;
        let guard = self.state.lock().await;
        let mut deals = self.repo.load_deals()?;
        let deal = deals.get_mut(&deal_id)?;
        deal.expect_status(lifecycle::EMERGENCY_RELEASABLE, "emergency release")?;
        tracing::warn!(deal_id = %deal_id, admin = %admin, status = %deal.status, "emergency release");

        let outcome = self
            .pay_out(
                deal,
                Payout::ToBuyer {
                    target: DealStatus::EmergencyReleased,
                },
                GasCheck::Required,
            )
            .await;
        self.finish_payout(guard, &deals, deal_id, outcome, false).await
    }

    /// Return held funds to `to`. Sends the recorded received amount when
    /// the deposit diverged, otherwise the deal amount.
    ///
    /// # Errors
    /// `NotAdmin`, `InvalidAddress`, `DealNotFound`, `InvalidTransition`
    /// for settled deals, or the transfer error.
    pub async fn admin_emergency_refund(
        &self,
        admin: &Handle,
        deal_id: DealId,
        to: &str,
    ) -> Result<Deal> {
        self.ensure_admin(admin)?;
        let to = WalletAddress::parse(to)?;
        let guard = self.state.lock().await;
        let mut deals = self.repo.load_deals()?;
        let deal = deals.get_mut(&deal_id)?;
        deal.expect_status(lifecycle::REFUNDABLE, "emergency refund")?;
        tracing::warn!(deal_id = %deal_id, admin = %admin, to = %to, "emergency refund");

        let outcome = self
            .pay_out(deal, Payout::Refund { to }, GasCheck::Required)
            .await;
        self.finish_payout(guard, &deals, deal_id, outcome, false).await
    }

    /// Blacklist `target` and drop their resting orders. Returns the
    /// removed orders.
    ///
    /// # Errors
    /// `NotAdmin` or `AlreadyBlacklisted`.
    pub async fn admin_mark_scammer(&self, admin: &Handle, target: &Handle) -> Result<Vec<Order>> {
        self.ensure_admin(admin)?;
        let guard = self.state.lock().await;

        let mut blacklist = self.repo.load_blacklist()?;
        if !blacklist.add(target.clone()) {
            return Err(EscrowError::AlreadyBlacklisted(target.clone()));
        }
        self.repo.replace_blacklist(&blacklist)?;

        let mut book = OrderBook::from_state(self.repo.load_orders()?);
        let removed = book.remove_owned(target);
        if !removed.is_empty() {
            self.repo.replace_orders(book.state())?;
        }
        drop(guard);

        tracing::warn!(user = %target, admin = %admin, orders_removed = removed.len(), "user blacklisted");
        self.publish(vec![Notification::SecurityAlert {
            deal_id: None,
            reason: AlertReason::ScammerMarked {
                handle: target.clone(),
            },
        }])
        .await;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use escrowdesk_store::{MemoryRepository, Repository};
    use escrowdesk_types::{DealBook, EscrowConfig, OrderSide};
    use rust_decimal::Decimal;

    use super::*;
    use crate::testing::{MockLedger, RecordingNotifier};

    const REFUND_TO: &str = "0x9999999999999999999999999999999999999999";

    fn admin() -> Handle {
        Handle::new("@admin")
    }

    fn setup(status: DealStatus) -> (EscrowDesk, Arc<MockLedger>, Arc<RecordingNotifier>, DealId) {
        let repo = Arc::new(MemoryRepository::new());
        let ledger = Arc::new(MockLedger::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let mut deal = Deal::dummy(Decimal::TEN);
        deal.status = status;
        let id = deal.id;
        let mut deals = DealBook::new();
        deals.insert(deal);
        repo.replace_deals(&deals).unwrap();
        let desk = EscrowDesk::new(EscrowConfig::for_tests(), repo, ledger.clone(), notifier.clone())
            .unwrap();
        (desk, ledger, notifier, id)
    }

    #[tokio::test]
    async fn non_admin_rejected_everywhere() {
        let (desk, ledger, _, id) = setup(DealStatus::Disputed);
        let mallory = Handle::new("@mallory");
        assert!(matches!(desk.admin_release(&mallory, id).await, Err(EscrowError::NotAdmin(_))));
        assert!(matches!(desk.admin_force_release(&mallory, id).await, Err(EscrowError::NotAdmin(_))));
        assert!(matches!(
            desk.admin_emergency_refund(&mallory, id, REFUND_TO).await,
            Err(EscrowError::NotAdmin(_))
        ));
        assert!(matches!(
            desk.admin_mark_scammer(&mallory, &Handle::new("bob")).await,
            Err(EscrowError::NotAdmin(_))
        ));
        assert!(ledger.transfers().is_empty());
    }

    #[tokio::test]
    async fn release_from_dispute() {
        let (desk, ledger, _, id) = setup(DealStatus::Disputed);
        let deal = desk.admin_release(&admin(), id).await.unwrap();
        assert_eq!(deal.status, DealStatus::Released);
        assert_eq!(ledger.transfers().len(), 1);
    }

    #[tokio::test]
    async fn release_requires_fiat_stage() {
        let (desk, ledger, _, id) = setup(DealStatus::Deposited);
        let err = desk.admin_release(&admin(), id).await.unwrap_err();
        assert!(matches!(err, EscrowError::InvalidTransition { .. }));
        assert!(ledger.transfers().is_empty());
    }

    #[tokio::test]
    async fn force_release_ignores_gas() {
        let (desk, ledger, _, id) = setup(DealStatus::FiatSent);
        ledger.set_native_balance(Decimal::ZERO);
        assert!(matches!(
            desk.admin_release(&admin(), id).await,
            Err(EscrowError::InsufficientGas { .. })
        ));
        assert_eq!(desk.deal(id).unwrap().status, DealStatus::FiatSent);

        let deal = desk.admin_force_release(&admin(), id).await.unwrap();
        assert_eq!(deal.status, DealStatus::Released);
    }

    #[tokio::test]
    async fn refund_sends_received_amount() {
        let (desk, ledger, notifier, id) = setup(DealStatus::CancelledWrongAmount);
        {
            // Record the overpayment the reconciler would have stored.
            let mut deals = desk.repo.load_deals().unwrap();
            deals.get_mut(&id).unwrap().received_amount = Some(Decimal::new(15, 0));
            desk.repo.replace_deals(&deals).unwrap();
        }
        let deal = desk.admin_emergency_refund(&admin(), id, REFUND_TO).await.unwrap();
        assert_eq!(deal.status, DealStatus::EmergencyRefunded);
        let sent = ledger.transfers();
        assert_eq!(sent[0].amount_units, 15_000_000);
        assert_eq!(sent[0].to.as_str(), REFUND_TO);
        assert_eq!(notifier.count(|n| matches!(n, Notification::Refunded { .. })), 1);
    }

    #[tokio::test]
    async fn refund_rejected_once_settled() {
        let (desk, ledger, _, id) = setup(DealStatus::Released);
        assert!(desk.admin_emergency_refund(&admin(), id, REFUND_TO).await.is_err());
        assert!(ledger.transfers().is_empty());
    }

    #[tokio::test]
    async fn emergency_release_from_waiting() {
        let (desk, _, notifier, id) = setup(DealStatus::WaitingDeposit);
        let deal = desk.admin_emergency_release(&admin(), id).await.unwrap();
        assert_eq!(deal.status, DealStatus::EmergencyReleased);
        assert_eq!(notifier.count(|n| matches!(n, Notification::EmergencyReleased { .. })), 1);
    }

    #[tokio::test]
    async fn scammer_loses_orders_and_access() {
        let (desk, _, notifier, _) = setup(DealStatus::Released);
        let bob = Handle::new("@bob");
        desk.place_order(&bob, OrderSide::Sell, Decimal::TEN).await.unwrap();

        let removed = desk.admin_mark_scammer(&admin(), &bob).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert!(desk.list_orders().unwrap().sells.is_empty());
        assert!(desk.blacklist().unwrap().contains(&bob));
        assert_eq!(notifier.count(Notification::is_alert), 1);

        assert!(matches!(
            desk.place_order(&bob, OrderSide::Sell, Decimal::ONE).await,
            Err(EscrowError::Blacklisted(_))
        ));
        assert!(matches!(
            desk.admin_mark_scammer(&admin(), &bob).await,
            Err(EscrowError::AlreadyBlacklisted(_))
        ));
    }
}

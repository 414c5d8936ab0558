//! # End-to-End Escrow Tests
//!
//! Drive a full `EscrowDesk` through matching, deposit detection,
//! dual confirmation and release, with an in-memory ledger, notifier and a
//! hand-driven clock.
//!
//! | Scenario                       | Expected                                       |
//! |--------------------------------|------------------------------------------------|
//! | buy 10 + sell 10, deposit 10   | deal released, one transfer to the buyer       |
//! | deposit 15 for a 10 deal       | `cancelled_wrong_amount`, received 15          |
//! | deal idle past its TTL         | deleted once, one expiry notification          |
//! | same payment seen twice        | processed once                                 |
//! | second deal while one in flight| rejected                                       |

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use escrowdesk_engine::testing::{MockLedger, RecordingNotifier, StaticForwarding};
use escrowdesk_engine::{
    DepositOutcome, EscrowDesk, InboundCommand, ManualClock, OrderOutcome, Reply,
};
use escrowdesk_store::{JsonFileRepository, MemoryRepository, Repository};
use escrowdesk_types::*;
use rust_decimal::Decimal;

const ALICE_WALLET: &str = "0xa11ce00000000000000000000000000000000001";

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Harness {
    desk: EscrowDesk,
    repo: Arc<dyn Repository>,
    ledger: Arc<MockLedger>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn with_repo(config: EscrowConfig, repo: Arc<dyn Repository>) -> Self {
        init_tracing();
        let ledger = Arc::new(MockLedger::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let desk = EscrowDesk::new(config, Arc::clone(&repo), ledger.clone(), notifier.clone())
            .unwrap()
            .with_clock(clock.clone());
        Self {
            desk,
            repo,
            ledger,
            notifier,
            clock,
        }
    }

    fn new() -> Self {
        Self::with_repo(EscrowConfig::for_tests(), Arc::new(MemoryRepository::new()))
    }

    fn cmd(&self, sender: &str, name: &str, args: &[&str]) -> InboundCommand {
        InboundCommand::new(sender, name, args, self.desk.config().group_channel)
    }

    /// Register alice's wallet, rest bob's sell, match with alice's buy.
    async fn open_deal(&self, amount: Decimal) -> Deal {
        self.desk.set_wallet(&Handle::new("alice"), ALICE_WALLET).await.unwrap();
        self.desk
            .place_order(&Handle::new("bob"), OrderSide::Sell, amount)
            .await
            .unwrap();
        match self
            .desk
            .place_order(&Handle::new("alice"), OrderSide::Buy, amount)
            .await
            .unwrap()
        {
            OrderOutcome::Matched(deal) => *deal,
            OrderOutcome::Rested(order) => panic!("expected a match, order {} rested", order.id),
        }
    }

    fn count(&self, pred: impl Fn(&Notification) -> bool) -> usize {
        self.notifier.count(pred)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Happy path
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn full_cycle_match_deposit_confirm_release() {
    let h = Harness::new();
    h.desk.reconcile_once().await.unwrap(); // baseline 0

    let deal = h.open_deal(dec(10)).await;
    assert_eq!(deal.status, DealStatus::WaitingDeposit);
    assert_eq!(h.count(|n| matches!(n, Notification::DealCreated { .. })), 1);

    // Seller deposits 10 into custody.
    h.ledger.credit(dec(10));
    h.clock.advance(Duration::seconds(30));
    let report = h.desk.reconcile_once().await.unwrap();
    assert_eq!(report.outcome, Some(DepositOutcome::Confirmed(deal.id)));
    assert_eq!(h.desk.deal(deal.id).unwrap().status, DealStatus::Deposited);

    // Buyer pays fiat, seller acknowledges.
    let sent = h.desk.dispatch(&h.cmd("@alice", "/sent", &[deal.id.to_string().as_str()])).await.unwrap();
    assert!(matches!(sent, Reply::Deal(d) if d.status == DealStatus::FiatSent));

    let done = h
        .desk
        .dispatch(&h.cmd("@bob", "/received", &[deal.id.to_string().as_str()]))
        .await
        .unwrap();
    let Reply::Deal(done) = done else {
        panic!("expected deal reply");
    };
    assert_eq!(done.status, DealStatus::Released);
    assert!(done.buyer_confirmed && done.seller_confirmed);
    assert!(done.transfer_reference.is_some());

    let transfers = h.ledger.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].to.as_str(), ALICE_WALLET);
    assert_eq!(transfers[0].amount_units, 10_000_000);
    assert_eq!(h.count(|n| matches!(n, Notification::DealCompleted { .. })), 1);

    // A released deal no longer blocks new orders.
    h.desk
        .place_order(&Handle::new("carol"), OrderSide::Sell, dec(20))
        .await
        .unwrap();
}

#[tokio::test]
async fn notifications_go_to_group_channel() {
    let h = Harness::new();
    h.open_deal(dec(10)).await;
    assert!(
        h.notifier
            .channels()
            .iter()
            .all(|c| *c == h.desk.config().group_channel)
    );
}

// ═══════════════════════════════════════════════════════════════════
// Wrong amounts
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn overpayment_cancels_with_received_amount() {
    let h = Harness::new();
    h.desk.reconcile_once().await.unwrap();
    let deal = h.open_deal(dec(10)).await;

    h.ledger.credit(dec(15));
    h.desk.reconcile_once().await.unwrap();

    let stored = h.desk.deal(deal.id).unwrap();
    assert_eq!(stored.status, DealStatus::CancelledWrongAmount);
    assert_eq!(stored.received_amount, Some(dec(15)));
    assert_eq!(
        h.count(|n| matches!(
            n,
            Notification::SecurityAlert { reason: AlertReason::WrongAmount { .. }, .. }
        )),
        1
    );

    // Admin refunds the full 15 to the seller's address.
    let refund_to = "0xb0b0000000000000000000000000000000000002";
    let refunded = h
        .desk
        .dispatch(&h.cmd("@admin", "refund", &[deal.id.to_string().as_str(), refund_to]))
        .await
        .unwrap();
    assert!(matches!(refunded, Reply::Deal(d) if d.status == DealStatus::EmergencyRefunded));
    assert_eq!(h.ledger.transfers()[0].amount_units, 15_000_000);
}

#[tokio::test]
async fn deposit_within_tolerance_confirms() {
    let h = Harness::new();
    h.desk.reconcile_once().await.unwrap();
    let deal = h.open_deal(dec(10)).await;

    h.ledger.credit(Decimal::new(999, 2)); // 9.99
    h.desk.reconcile_once().await.unwrap();
    assert_eq!(h.desk.deal(deal.id).unwrap().status, DealStatus::Deposited);
}

// ═══════════════════════════════════════════════════════════════════
// Expiry
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn expired_deal_removed_exactly_once() {
    let h = Harness::new();
    let deal = h.open_deal(dec(10)).await;

    h.clock.advance(Duration::minutes(16));
    let first = h.desk.reconcile_once().await.unwrap();
    assert_eq!(first.expired, vec![deal.id]);

    h.clock.advance(Duration::minutes(1));
    let second = h.desk.reconcile_once().await.unwrap();
    assert!(second.expired.is_empty());

    assert_eq!(h.count(|n| matches!(n, Notification::DealExpired { .. })), 1);
    assert!(h.desk.deals().unwrap().is_empty());

    // The in-flight slot is free again.
    assert!(matches!(
        h.desk.place_order(&Handle::new("bob"), OrderSide::Sell, dec(10)).await.unwrap(),
        OrderOutcome::Rested(_)
    ));
}

#[tokio::test]
async fn deal_within_ttl_survives_sweep() {
    let h = Harness::new();
    let deal = h.open_deal(dec(10)).await;
    h.clock.advance(Duration::minutes(14));
    h.desk.reconcile_once().await.unwrap();
    assert!(h.desk.deal(deal.id).is_ok());
}

// ═══════════════════════════════════════════════════════════════════
// Idempotency and the in-flight invariant
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn repeated_delta_is_not_double_processed() {
    let h = Harness::new();
    h.desk.reconcile_once().await.unwrap();
    let deal = h.open_deal(dec(10)).await;

    h.ledger.credit(dec(10));
    h.desk.reconcile_once().await.unwrap();
    assert_eq!(h.desk.deal(deal.id).unwrap().status, DealStatus::Deposited);

    // No new delta: nothing else happens.
    let again = h.desk.reconcile_once().await.unwrap();
    assert_eq!(again.delta, Some(Decimal::ZERO));
    assert_eq!(again.outcome, None);
    assert_eq!(h.count(|n| matches!(n, Notification::DepositConfirmed { .. })), 1);
}

#[tokio::test]
async fn concurrent_cycles_confirm_once() {
    let h = Harness::new();
    h.desk.reconcile_once().await.unwrap();
    let deal = h.open_deal(dec(10)).await;
    h.ledger.credit(dec(10));

    let (a, b) = tokio::join!(h.desk.reconcile_once(), h.desk.reconcile_once());
    let confirmed = [a.unwrap(), b.unwrap()]
        .iter()
        .filter(|r| r.outcome == Some(DepositOutcome::Confirmed(deal.id)))
        .count();
    assert_eq!(confirmed, 1);
    assert_eq!(h.count(|n| matches!(n, Notification::DepositConfirmed { .. })), 1);
}

#[tokio::test]
async fn only_one_deal_in_flight() {
    let h = Harness::new();
    let deal = h.open_deal(dec(10)).await;
    h.desk.set_wallet(&Handle::new("dave"), ALICE_WALLET).await.unwrap();

    let err = h
        .desk
        .place_order(&Handle::new("dave"), OrderSide::Buy, dec(5))
        .await
        .unwrap_err();
    assert!(matches!(err, EscrowError::DealInFlight(id) if id == deal.id));
    assert_eq!(h.desk.deals().unwrap().len(), 1);
}

#[tokio::test]
async fn amount_bounds_enforced() {
    let h = Harness::new();
    let bob = Handle::new("bob");
    for bad in [dec(0), Decimal::new(5, 1), dec(10_001)] {
        assert!(
            h.desk.place_order(&bob, OrderSide::Sell, bad).await.is_err(),
            "{bad} should be rejected"
        );
    }
    assert!(h.desk.list_orders().unwrap().sells.is_empty());
    assert!(h.desk.place_order(&bob, OrderSide::Sell, dec(10_000)).await.is_ok());
}

#[tokio::test]
async fn cancel_before_deposit_frees_slot() {
    let h = Harness::new();
    let deal = h.open_deal(dec(10)).await;

    let reply = h.desk.dispatch(&h.cmd("@bob", "cancel", &[])).await.unwrap();
    let Reply::Cancelled(summary) = reply else {
        panic!("expected cancel summary");
    };
    assert_eq!(summary.deals, vec![deal.id]);
    assert_eq!(h.desk.deal(deal.id).unwrap().status, DealStatus::CancelledByUser);
    assert_eq!(h.count(|n| matches!(n, Notification::DealCancelled { .. })), 1);
    assert_eq!(h.count(Notification::is_alert), 0);
}

#[tokio::test]
async fn cancel_after_deposit_alerts_admins() {
    let h = Harness::new();
    h.desk.reconcile_once().await.unwrap();
    let deal = h.open_deal(dec(10)).await;
    h.ledger.credit(dec(10));
    h.desk.reconcile_once().await.unwrap();

    h.desk.cancel_orders(&Handle::new("alice")).await.unwrap();
    assert_eq!(h.desk.deal(deal.id).unwrap().status, DealStatus::CancelledByUser);
    assert_eq!(
        h.count(|n| matches!(
            n,
            Notification::SecurityAlert { reason: AlertReason::CancelledWithFunds { .. }, .. }
        )),
        1
    );
}

// ═══════════════════════════════════════════════════════════════════
// Forwarding and persistence
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn forwarding_address_announced() {
    let mut h = Harness::new();
    let forwarding = Arc::new(StaticForwarding::new());
    h.desk = h.desk.with_forwarding(forwarding);
    let deal = h.open_deal(dec(10)).await;

    assert_eq!(deal.deposit_address, Some(StaticForwarding::address_for(&deal)));
    let announced = h.notifier.notifications().into_iter().find_map(|n| match n {
        Notification::DealCreated { deposit_to, .. } => Some(deposit_to),
        _ => None,
    });
    assert_eq!(announced, Some(StaticForwarding::address_for(&deal)));
}

#[tokio::test]
async fn forwarding_failure_falls_back_to_custody() {
    let mut h = Harness::new();
    let forwarding = Arc::new(StaticForwarding::new());
    forwarding.set_failing(true);
    h.desk = h.desk.with_forwarding(forwarding);
    let deal = h.open_deal(dec(10)).await;
    assert_eq!(deal.deposit_address, None);
}

#[tokio::test]
async fn state_survives_restart_with_json_store() {
    let dir = tempfile::tempdir().unwrap();
    let deal_id = {
        let repo: Arc<dyn Repository> = Arc::new(JsonFileRepository::open(dir.path()).unwrap());
        let h = Harness::with_repo(EscrowConfig::for_tests(), repo);
        h.open_deal(dec(25)).await.id
    };

    let repo: Arc<dyn Repository> = Arc::new(JsonFileRepository::open(dir.path()).unwrap());
    let h = Harness::with_repo(EscrowConfig::for_tests(), repo);
    let deal = h.desk.deal(deal_id).unwrap();
    assert_eq!(deal.amount, dec(25));
    assert_eq!(deal.status, DealStatus::WaitingDeposit);
    assert!(h.repo.load_wallets().unwrap().get(&Handle::new("alice")).is_some());
}

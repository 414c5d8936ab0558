//! Order entry, cancellation, wallet registration and manual deals.

use escrowdesk_guard::check_duplicate;
use escrowdesk_types::{
    AlertReason, Blacklist, Deal, DealBook, DealId, DealStatus, EscrowError, Handle,
    Notification, Order, OrderSide, Result, SellerWallet, WalletAddress,
};
use rust_decimal::Decimal;

use crate::book::{OrderBook, Placement};
use crate::desk::EscrowDesk;
use crate::lifecycle;

/// What happened to a placed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    /// No counterpart; the order rests in the book.
    Rested(Order),
    /// Matched immediately; a deal now awaits the seller's deposit.
    Matched(Box<Deal>),
}

/// Everything a cancel request removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancelSummary {
    pub orders: Vec<Order>,
    pub deals: Vec<DealId>,
}

fn ensure_not_blacklisted(blacklist: &Blacklist, handle: &Handle) -> Result<()> {
    if blacklist.contains(handle) {
        tracing::warn!(user = %handle, "blacklisted user rejected");
        return Err(EscrowError::Blacklisted(handle.clone()));
    }
    Ok(())
}

fn ensure_no_deal_in_flight(deals: &DealBook) -> Result<()> {
    match deals.in_flight() {
        Some(active) => Err(EscrowError::DealInFlight(active.id)),
        None => Ok(()),
    }
}

impl EscrowDesk {
    /// Place a fixed-amount order and match it against the opposite side.
    ///
    /// Checks run in order: amount bounds and precision, blacklist, payout
    /// wallet (buy side), duplicate order, in-flight deal, order rate limit.
    ///
    /// # Errors
    /// The first failing check's error. Nothing is persisted on error.
    pub async fn place_order(
        &self,
        owner: &Handle,
        side: OrderSide,
        amount: Decimal,
    ) -> Result<OrderOutcome> {
        self.check_deal_amount(amount)?;
        let now = self.clock.now();
        let guard = self.state.lock().await;

        ensure_not_blacklisted(&self.repo.load_blacklist()?, owner)?;
        let wallets = self.repo.load_wallets()?;
        let payout_wallet = match side {
            OrderSide::Buy => Some(
                wallets
                    .get(owner)
                    .cloned()
                    .ok_or_else(|| EscrowError::WalletNotRegistered(owner.clone()))?,
            ),
            OrderSide::Sell => None,
        };
        let orders = self.repo.load_orders()?;
        check_duplicate(&orders, owner, side, amount)?;
        let mut deals = self.repo.load_deals()?;
        ensure_no_deal_in_flight(&deals)?;
        // Recorded last, so rejected orders leave the window untouched.
        self.limiter().check_order(owner, now)?;

        let mut book = OrderBook::from_state(orders);
        let order = Order::new(owner.clone(), side, amount, payout_wallet, now);
        match book.place(order.clone()) {
            Placement::Rested(id) => {
                self.repo.replace_orders(book.state())?;
                tracing::info!(order_id = %id, owner = %owner, side = %side, amount = %amount, "order resting");
                Ok(OrderOutcome::Rested(order))
            }
            Placement::Matched { incoming, resting } => {
                let (buy, sell) = match incoming.side {
                    OrderSide::Buy => (incoming, resting),
                    OrderSide::Sell => (resting, incoming),
                };
                let buyer_wallet = buy
                    .payout_wallet
                    .clone()
                    .ok_or_else(|| EscrowError::WalletNotRegistered(buy.owner.clone()))?;
                let seller_wallet = SellerWallet::from(wallets.get(&sell.owner).cloned());
                let draft = Deal::new(buy.owner, sell.owner, amount, buyer_wallet, seller_wallet, now);
                let (deal, deposit_to) = self.open_deal(draft).await;

                deals.insert(deal.clone());
                self.repo.replace_deals(&deals)?;
                self.repo.replace_orders(book.state())?;
                drop(guard);

                self.publish(vec![Notification::DealCreated {
                    deal: Box::new(deal.clone()),
                    deposit_to,
                }])
                .await;
                Ok(OrderOutcome::Matched(Box::new(deal)))
            }
        }
    }

    /// Remove the caller's orders and cancel any deal they are party to that
    /// has not reached `FiatSent`.
    ///
    /// # Errors
    /// `NothingToCancel` if the caller had neither orders nor cancellable deals.
    pub async fn cancel_orders(&self, owner: &Handle) -> Result<CancelSummary> {
        let guard = self.state.lock().await;

        let mut book = OrderBook::from_state(self.repo.load_orders()?);
        let removed = book.remove_owned(owner);

        let mut deals = self.repo.load_deals()?;
        let mut cancelled = Vec::new();
        let mut notes = Vec::new();
        for deal in deals.iter_mut() {
            if !deal.is_party(owner) || !lifecycle::CANCELLABLE.contains(&deal.status) {
                continue;
            }
            let held_funds = deal.status == DealStatus::Deposited;
            lifecycle::cancel_by(deal, owner)?;
            tracing::info!(deal_id = %deal.id, by = %owner, held_funds, "deal cancelled");
            cancelled.push(deal.id);
            if let Some(other) = deal.counterparty(owner) {
                notes.push(Notification::DealCancelled {
                    deal_id: deal.id,
                    cancelled_by: owner.clone(),
                    counterparty: other.clone(),
                });
            }
            if held_funds {
                notes.push(Notification::SecurityAlert {
                    deal_id: Some(deal.id),
                    reason: AlertReason::CancelledWithFunds {
                        cancelled_by: owner.clone(),
                    },
                });
            }
        }

        if removed.is_empty() && cancelled.is_empty() {
            return Err(EscrowError::NothingToCancel(owner.clone()));
        }
        if !removed.is_empty() {
            self.repo.replace_orders(book.state())?;
        }
        if !cancelled.is_empty() {
            self.repo.replace_deals(&deals)?;
        }
        drop(guard);

        self.publish(notes).await;
        Ok(CancelSummary {
            orders: removed,
            deals: cancelled,
        })
    }

    /// Register or replace the payout wallet for `handle`. Returns the
    /// previously registered address, if any.
    ///
    /// # Errors
    /// `InvalidAddress` unless `raw` is `0x` followed by 40 hex digits.
    pub async fn set_wallet(&self, handle: &Handle, raw: &str) -> Result<Option<WalletAddress>> {
        let address = WalletAddress::parse(raw)?;
        let _guard = self.state.lock().await;
        let mut wallets = self.repo.load_wallets()?;
        let previous = wallets.register(handle.clone(), address.clone());
        self.repo.replace_wallets(&wallets)?;
        tracing::info!(user = %handle, wallet = %address, replaced = previous.is_some(), "wallet registered");
        Ok(previous)
    }

    /// Admin opens a deal directly between two handles, bypassing the book.
    ///
    /// The seller's authorized wallet is `seller_wallet` when given, else
    /// the seller's registered wallet, else unset.
    ///
    /// # Errors
    /// `NotAdmin`, `SelfDeal`, amount errors, `Blacklisted`,
    /// `WalletNotRegistered` for the buyer, or `DealInFlight`.
    pub async fn create_manual_deal(
        &self,
        admin: &Handle,
        buyer: &Handle,
        seller: &Handle,
        amount: Decimal,
        seller_wallet: Option<WalletAddress>,
    ) -> Result<Deal> {
        self.ensure_admin(admin)?;
        if buyer == seller {
            return Err(EscrowError::SelfDeal);
        }
        self.check_deal_amount(amount)?;
        let now = self.clock.now();
        let guard = self.state.lock().await;

        let blacklist = self.repo.load_blacklist()?;
        ensure_not_blacklisted(&blacklist, buyer)?;
        ensure_not_blacklisted(&blacklist, seller)?;
        let wallets = self.repo.load_wallets()?;
        let buyer_wallet = wallets
            .get(buyer)
            .cloned()
            .ok_or_else(|| EscrowError::WalletNotRegistered(buyer.clone()))?;
        let seller_wallet = SellerWallet::from(seller_wallet.or_else(|| wallets.get(seller).cloned()));

        let mut deals = self.repo.load_deals()?;
        ensure_no_deal_in_flight(&deals)?;

        let draft = Deal::new(buyer.clone(), seller.clone(), amount, buyer_wallet, seller_wallet, now);
        let (deal, deposit_to) = self.open_deal(draft).await;
        deals.insert(deal.clone());
        self.repo.replace_deals(&deals)?;
        drop(guard);

        tracing::info!(deal_id = %deal.id, admin = %admin, "manual deal created");
        self.publish(vec![Notification::DealCreated {
            deal: Box::new(deal.clone()),
            deposit_to,
        }])
        .await;
        Ok(deal)
    }
}

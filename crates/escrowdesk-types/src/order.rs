//! Order types: standing buy/sell intents for a fixed token amount.
//!
//! There is no price dimension. A buy of `A` matches a sell of exactly `A`
//! at par; the fiat leg is settled off-system between the two parties.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Handle, OrderId, WalletAddress};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Wants tokens, pays fiat.
    Buy,
    /// Deposits tokens, receives fiat.
    Sell,
}

impl OrderSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Active,
    Matched,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Matched => write!(f, "MATCHED"),
        }
    }
}

/// A standing intent to trade a fixed amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: Handle,
    pub side: OrderSide,
    pub amount: Decimal,
    /// Where released tokens go. Buy side only.
    pub payout_wallet: Option<WalletAddress>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    #[must_use]
    pub fn new(
        owner: Handle,
        side: OrderSide,
        amount: Decimal,
        payout_wallet: Option<WalletAddress>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            owner,
            side,
            amount,
            payout_wallet: match side {
                OrderSide::Buy => payout_wallet,
                OrderSide::Sell => None,
            },
            status: OrderStatus::Active,
            created_at,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == OrderStatus::Active
    }
}

/// The persisted order family: one map per side, keyed by time-ordered id
/// so iteration follows insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookState {
    pub buy: BTreeMap<OrderId, Order>,
    pub sell: BTreeMap<OrderId, Order>,
}

impl OrderBookState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn side(&self, side: OrderSide) -> &BTreeMap<OrderId, Order> {
        match side {
            OrderSide::Buy => &self.buy,
            OrderSide::Sell => &self.sell,
        }
    }

    pub fn side_mut(&mut self, side: OrderSide) -> &mut BTreeMap<OrderId, Order> {
        match side {
            OrderSide::Buy => &mut self.buy,
            OrderSide::Sell => &mut self.sell,
        }
    }

    /// Active orders on one side, oldest first.
    pub fn active(&self, side: OrderSide) -> impl Iterator<Item = &Order> {
        self.side(side).values().filter(|o| o.is_active())
    }

    /// Total number of orders on both sides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buy.len() + self.sell.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buy.is_empty() && self.sell.is_empty()
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy(owner: &str, side: OrderSide, amount: Decimal) -> Self {
        let payout = match side {
            OrderSide::Buy => WalletAddress::parse("0x1111111111111111111111111111111111111111").ok(),
            OrderSide::Sell => None,
        };
        Self::new(Handle::new(owner), side, amount, payout, Utc::now())
    }
}

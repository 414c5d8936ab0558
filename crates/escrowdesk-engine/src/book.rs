//! Fixed-amount order book.
//!
//! Matching is exact: an incoming order pairs with the oldest active order
//! on the opposite side with the same amount. There is no price, no partial
//! fill, and an owner never matches their own order.
//!
//! ```text
//! place(BUY 10) ─▶ sell side, oldest first ─▶ amount == 10 && owner != me?
//!                                               ├─ yes: remove it, Matched
//!                                               └─ no:  rest on buy side
//! ```

use escrowdesk_types::{Handle, Order, OrderBookState, OrderId, OrderSide};
use rust_decimal::Decimal;
use serde::Serialize;

/// Result of placing an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// The order crossed an opposite resting order, which has been removed.
    /// The incoming order is not added to the book.
    Matched { incoming: Order, resting: Order },
    /// No counterpart; the order now rests in the book.
    Rested(OrderId),
}

/// Both sides of the book, oldest first. Returned by the listing command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookSnapshot {
    pub buys: Vec<Order>,
    pub sells: Vec<Order>,
}

/// Matching logic over a loaded [`OrderBookState`].
#[derive(Debug, Default)]
pub struct OrderBook {
    state: OrderBookState,
}

impl OrderBook {
    #[must_use]
    pub fn from_state(state: OrderBookState) -> Self {
        Self { state }
    }

    #[must_use]
    pub fn state(&self) -> &OrderBookState {
        &self.state
    }

    /// Oldest active order on `side` with exactly `amount`, not owned by `owner`.
    #[must_use]
    pub fn find_counterpart(&self, side: OrderSide, amount: Decimal, owner: &Handle) -> Option<OrderId> {
        self.state
            .active(side)
            .find(|o| o.amount == amount && &o.owner != owner)
            .map(|o| o.id)
    }

    /// Match `order` against the opposite side or rest it.
    pub fn place(&mut self, order: Order) -> Placement {
        let opposite = order.side.opposite();
        if let Some(resting_id) = self.find_counterpart(opposite, order.amount, &order.owner) {
            if let Some(resting) = self.state.side_mut(opposite).remove(&resting_id) {
                tracing::debug!(
                    incoming = %order.id,
                    resting = %resting.id,
                    amount = %order.amount,
                    "orders matched"
                );
                return Placement::Matched {
                    incoming: order,
                    resting,
                };
            }
        }
        let id = order.id;
        self.state.side_mut(order.side).insert(id, order);
        Placement::Rested(id)
    }

    /// Remove every order `owner` has on either side.
    pub fn remove_owned(&mut self, owner: &Handle) -> Vec<Order> {
        let mut removed = Vec::new();
        for side in [OrderSide::Buy, OrderSide::Sell] {
            let orders = self.state.side_mut(side);
            let ids: Vec<OrderId> = orders
                .values()
                .filter(|o| &o.owner == owner)
                .map(|o| o.id)
                .collect();
            removed.extend(ids.iter().filter_map(|id| orders.remove(id)));
        }
        removed
    }

    #[must_use]
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            buys: self.state.active(OrderSide::Buy).cloned().collect(),
            sells: self.state.active(OrderSide::Sell).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use escrowdesk_types::OrderStatus;

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn rests_without_counterpart() {
        let mut book = OrderBook::default();
        let order = Order::dummy("@alice", OrderSide::Buy, dec(10));
        let id = order.id;
        assert_eq!(book.place(order), Placement::Rested(id));
        assert_eq!(book.state().buy.len(), 1);
    }

    #[test]
    fn exact_amount_matches_and_removes_resting() {
        let mut book = OrderBook::default();
        let sell = Order::dummy("@bob", OrderSide::Sell, dec(10));
        let sell_id = sell.id;
        book.place(sell);

        let buy = Order::dummy("@alice", OrderSide::Buy, dec(10));
        match book.place(buy) {
            Placement::Matched { incoming, resting } => {
                assert_eq!(resting.id, sell_id);
                assert_eq!(incoming.owner, Handle::new("alice"));
            }
            Placement::Rested(_) => panic!("expected a match"),
        }
        assert!(book.state().is_empty(), "neither order should remain");
    }

    #[test]
    fn different_amount_does_not_match() {
        let mut book = OrderBook::default();
        book.place(Order::dummy("@bob", OrderSide::Sell, dec(10)));
        let placed = book.place(Order::dummy("@alice", OrderSide::Buy, dec(11)));
        assert!(matches!(placed, Placement::Rested(_)));
        assert_eq!(book.state().len(), 2);
    }

    #[test]
    fn oldest_counterpart_wins() {
        let mut book = OrderBook::default();
        let first = Order::dummy("@bob", OrderSide::Sell, dec(10));
        let first_id = first.id;
        book.place(first);
        book.place(Order::dummy("@carol", OrderSide::Sell, dec(10)));

        let Placement::Matched { resting, .. } =
            book.place(Order::dummy("@alice", OrderSide::Buy, dec(10)))
        else {
            panic!("expected a match");
        };
        assert_eq!(resting.id, first_id);
        assert_eq!(book.state().sell.len(), 1);
    }

    #[test]
    fn own_order_never_matches() {
        let mut book = OrderBook::default();
        book.place(Order::dummy("@alice", OrderSide::Sell, dec(10)));
        let placed = book.place(Order::dummy("@alice", OrderSide::Buy, dec(10)));
        assert!(matches!(placed, Placement::Rested(_)));
    }

    #[test]
    fn inactive_orders_are_skipped() {
        let mut book = OrderBook::default();
        let mut stale = Order::dummy("@bob", OrderSide::Sell, dec(10));
        stale.status = OrderStatus::Matched;
        book.place(stale);
        let placed = book.place(Order::dummy("@alice", OrderSide::Buy, dec(10)));
        assert!(matches!(placed, Placement::Rested(_)));
        assert!(book.snapshot().sells.is_empty());
    }

    #[test]
    fn remove_owned_clears_both_sides() {
        let mut book = OrderBook::default();
        book.place(Order::dummy("@alice", OrderSide::Buy, dec(10)));
        book.place(Order::dummy("@alice", OrderSide::Sell, dec(20)));
        book.place(Order::dummy("@bob", OrderSide::Sell, dec(30)));

        let removed = book.remove_owned(&Handle::new("alice"));
        assert_eq!(removed.len(), 2);
        assert_eq!(book.state().len(), 1);
        assert!(book.remove_owned(&Handle::new("alice")).is_empty());
    }
}

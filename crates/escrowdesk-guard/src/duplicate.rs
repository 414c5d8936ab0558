//! Duplicate-order prevention.

use escrowdesk_types::{EscrowError, Handle, OrderBookState, OrderSide, Result};
use rust_decimal::Decimal;

/// Reject a new order if `owner` already has an active order of the same
/// side and amount.
pub fn check_duplicate(
    book: &OrderBookState,
    owner: &Handle,
    side: OrderSide,
    amount: Decimal,
) -> Result<()> {
    let duplicate = book
        .active(side)
        .any(|o| &o.owner == owner && o.amount == amount);
    if duplicate {
        return Err(EscrowError::DuplicateOrder {
            owner: owner.clone(),
            side,
            amount,
        });
    }
    Ok(())
}

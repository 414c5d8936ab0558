//! Conversion between whole-token decimals and ledger base units.

use escrowdesk_types::{EscrowError, Result};
use rust_decimal::{Decimal, prelude::ToPrimitive};

fn scale_factor(decimals: u32) -> Result<Decimal> {
    (0..decimals).try_fold(Decimal::ONE, |acc, _| {
        acc.checked_mul(Decimal::TEN)
            .ok_or_else(|| EscrowError::Internal(format!("token decimals {decimals} overflow")))
    })
}

/// Whole tokens to base units. Precision beyond `decimals` is truncated.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<u128> {
    if amount.is_sign_negative() {
        return Err(EscrowError::InvalidAmount {
            reason: format!("{amount} is negative"),
        });
    }
    amount
        .checked_mul(scale_factor(decimals)?)
        .and_then(|scaled| scaled.trunc().to_u128())
        .ok_or_else(|| EscrowError::InvalidAmount {
            reason: format!("{amount} does not fit in base units"),
        })
}

/// Base units to whole tokens.
pub fn from_base_units(units: u128, decimals: u32) -> Result<Decimal> {
    let raw = i128::try_from(units)
        .map_err(|_| EscrowError::BalanceUnavailable { reason: format!("{units} out of range") })?;
    Decimal::try_from_i128_with_scale(raw, decimals)
        .map(|d| d.normalize())
        .map_err(|e| EscrowError::BalanceUnavailable {
            reason: format!("{units} with {decimals} decimals: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_decimal_token() {
        assert_eq!(to_base_units(Decimal::TEN, 6).unwrap(), 10_000_000);
        assert_eq!(to_base_units(Decimal::new(15, 1), 6).unwrap(), 1_500_000);
        assert_eq!(from_base_units(10_000_000, 6).unwrap(), Decimal::TEN);
        assert_eq!(from_base_units(1, 6).unwrap(), Decimal::new(1, 6));
    }

    #[test]
    fn excess_precision_truncates() {
        assert_eq!(to_base_units(Decimal::new(12_345_679, 7), 6).unwrap(), 1_234_567);
    }

    #[test]
    fn negative_rejected() {
        assert!(matches!(
            to_base_units(Decimal::NEGATIVE_ONE, 6),
            Err(EscrowError::InvalidAmount { .. })
        ));
    }
}

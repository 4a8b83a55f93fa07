//! Conversion between human-facing decimal amounts and the settlement
//! asset's smallest unit.

use rust_decimal::Decimal;

use crate::{Result, SidebetError};

/// Convert `amount` (e.g. `10.5` USDC) into smallest units (`10_500_000`).
///
/// # Errors
/// `Validation` if the amount is negative, carries more fractional digits
/// than the asset supports, or overflows `u128`.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<u128> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(SidebetError::validation(format!(
            "amount must not be negative, got {amount}"
        )));
    }
    let normalized = amount.normalize();
    if normalized.scale() > decimals {
        return Err(SidebetError::validation(format!(
            "amount {amount} has more than {decimals} decimal places"
        )));
    }
    // mantissa * 10^(decimals - scale)
    let mantissa = u128::try_from(normalized.mantissa())
        .map_err(|_| SidebetError::validation(format!("amount {amount} is out of range")))?;
    let shift = decimals - normalized.scale();
    10u128
        .checked_pow(shift)
        .and_then(|factor| mantissa.checked_mul(factor))
        .ok_or_else(|| SidebetError::validation(format!("amount {amount} overflows")))
}

/// Convert smallest units back into a decimal amount for display.
///
/// Returns `None` if the value does not fit a `Decimal` (96-bit mantissa).
#[must_use]
pub fn from_base_units(units: u128, decimals: u32) -> Option<Decimal> {
    let mantissa = i128::try_from(units).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, decimals)
        .ok()
        .map(|d| d.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_amounts() {
        assert_eq!(to_base_units(Decimal::new(10, 0), 6).unwrap(), 10_000_000);
        assert_eq!(to_base_units(Decimal::ZERO, 6).unwrap(), 0);
    }

    #[test]
    fn fractional_amounts() {
        // 10.5
        assert_eq!(to_base_units(Decimal::new(105, 1), 6).unwrap(), 10_500_000);
        // 0.000001
        assert_eq!(to_base_units(Decimal::new(1, 6), 6).unwrap(), 1);
        // trailing zeros beyond precision are fine: 1.5000000
        assert_eq!(to_base_units(Decimal::new(15_000_000, 7), 6).unwrap(), 1_500_000);
    }

    #[test]
    fn too_precise_rejected() {
        let err = to_base_units(Decimal::new(1, 7), 6).unwrap_err();
        assert!(matches!(err, SidebetError::Validation { .. }));
    }

    #[test]
    fn negative_rejected() {
        let err = to_base_units(Decimal::new(-5, 0), 6).unwrap_err();
        assert!(matches!(err, SidebetError::Validation { .. }));
    }

    #[test]
    fn back_to_decimal() {
        assert_eq!(from_base_units(15_000_000, 6), Some(Decimal::new(15, 0)));
        assert_eq!(from_base_units(1, 6), Some(Decimal::new(1, 6)));
    }
}

//! Conversions between human-entered decimal amounts and on-chain units.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use thiserror::Error;

/// BNB, WBNB and the BSC USDT token all use 18 decimals
pub const NATIVE_DECIMALS: u32 = 18;

#[derive(Debug, Error, PartialEq)]
pub enum UnitsError {
    #[error("Amount must not be negative: {0}")]
    Negative(Decimal),
    #[error("Amount {amount} has more than {decimals} fractional digits")]
    TooPrecise { amount: Decimal, decimals: u32 },
    #[error("Amount overflows: {0}")]
    Overflow(Decimal),
}

/// One whole token (10^decimals) in smallest units.
pub fn one_unit(decimals: u32) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Convert a decimal amount to smallest units, e.g. `0.1` BNB to wei.
///
/// Exact: fails rather than rounding when the amount has more fractional
/// digits than the token supports.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<U256, UnitsError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(UnitsError::Negative(amount));
    }

    let normalized = amount.normalize();
    let scale = normalized.scale();
    if scale > decimals {
        return Err(UnitsError::TooPrecise { amount, decimals });
    }

    let mantissa = normalized.mantissa().unsigned_abs();

    U256::from(mantissa)
        .checked_mul(one_unit(decimals - scale))
        .ok_or(UnitsError::Overflow(amount))
}

/// Render smallest units as a decimal string, trimming trailing zeros.
pub fn format_units(value: U256, decimals: u32) -> String {
    let unit = one_unit(decimals);
    let whole = value / unit;
    let frac = value % unit;

    if frac.is_zero() {
        return whole.to_string();
    }

    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_point_one_bnb_to_wei() {
        let wei = to_base_units(dec!(0.1), NATIVE_DECIMALS).unwrap();
        assert_eq!(wei, U256::from(100_000_000_000_000_000u128));
    }

    #[test]
    fn test_whole_amount() {
        let wei = to_base_units(dec!(2), NATIVE_DECIMALS).unwrap();
        assert_eq!(wei, U256::from(2_000_000_000_000_000_000u128));
    }

    #[test]
    fn test_trailing_zeros_are_not_precision() {
        let wei = to_base_units(dec!(1.500), 3).unwrap();
        assert_eq!(wei, U256::from(1500u64));
    }

    #[test]
    fn test_take_profit_price() {
        let units = to_base_units(dec!(0.0002), NATIVE_DECIMALS).unwrap();
        assert_eq!(units, U256::from(200_000_000_000_000u128));
    }

    #[test]
    fn test_too_precise() {
        let result = to_base_units(dec!(0.0001), 3);
        assert!(matches!(result, Err(UnitsError::TooPrecise { .. })));
    }

    #[test]
    fn test_negative_rejected() {
        let result = to_base_units(dec!(-1), NATIVE_DECIMALS);
        assert!(matches!(result, Err(UnitsError::Negative(_))));
    }

    #[test]
    fn test_zero() {
        assert_eq!(to_base_units(dec!(0), NATIVE_DECIMALS).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_format_units() {
        assert_eq!(
            format_units(U256::from(100_000_000_000_000_000u128), 18),
            "0.1"
        );
        assert_eq!(
            format_units(U256::from(2_000_000_000_000_000_000u128), 18),
            "2"
        );
        assert_eq!(format_units(U256::from(1_050u64), 3), "1.05");
    }
}

//! Fixed-point helpers.
//!
//! Products of two `u128` values are evaluated in 256 bits and the result is
//! range-checked on the way back, so a scaled multiply-then-divide never
//! loses precision to an intermediate overflow.

use primitive_types::U256;

use crate::constants::{DECIMALS, SCALE};
use crate::error::AccrualError;
use crate::types::Amount;

/// Narrow a 256-bit value to `u128`, failing if it does not fit.
pub fn to_amount(value: U256) -> Result<Amount, AccrualError> {
    if value > U256::from(u128::MAX) {
        return Err(AccrualError::ArithmeticOverflow);
    }
    Ok(value.low_u128())
}

/// `a * b / denom`, rounded down, with a 256-bit intermediate.
pub fn mul_div(a: Amount, b: Amount, denom: Amount) -> Result<Amount, AccrualError> {
    if denom == 0 {
        return Err(AccrualError::DivisionByZero);
    }
    // u128 * u128 always fits in 256 bits.
    let product = U256::from(a) * U256::from(b);
    to_amount(product / U256::from(denom))
}

/// Rescale a balance settled at `from_index` to `to_index`.
///
/// Returns `balance` unchanged when it is zero or was never settled
/// (`from_index == 0`): such accounts carry no implicit interest.
pub fn rebase(balance: Amount, to_index: Amount, from_index: Amount) -> Result<Amount, AccrualError> {
    if balance == 0 || from_index == 0 {
        return Ok(balance);
    }
    mul_div(balance, to_index, from_index)
}

/// Parse a decimal token string (`"100"`, `"0.25"`, `"12.5"`) into base units.
///
/// Returns `None` for malformed input, more than [`DECIMALS`] fractional
/// digits, or values that overflow `u128`.
pub fn parse_amount(text: &str) -> Option<Amount> {
    let text = text.trim();
    let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > DECIMALS as usize {
        return None;
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) {
        return None;
    }

    let whole: Amount = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac_units: Amount = if frac.is_empty() {
        0
    } else {
        let digits: Amount = frac.parse().ok()?;
        digits * 10u128.pow(DECIMALS as u32 - frac.len() as u32)
    };

    whole.checked_mul(SCALE)?.checked_add(frac_units)
}

/// Format base units as a decimal token string with trailing zeros trimmed.
pub fn format_amount(value: Amount) -> String {
    let whole = value / SCALE;
    let frac = value % SCALE;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0width$}", width = DECIMALS as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mul_div_exact() {
        assert_eq!(mul_div(6, 7, 3).unwrap(), 14);
        assert_eq!(mul_div(SCALE, SCALE, SCALE).unwrap(), SCALE);
    }

    #[test]
    fn mul_div_rounds_down() {
        assert_eq!(mul_div(10, 1, 3).unwrap(), 3);
        assert_eq!(mul_div(2, 1, 3).unwrap(), 0);
    }

    #[test]
    fn mul_div_wide_intermediate() {
        // u128::MAX * 2 overflows u128 but the quotient fits.
        assert_eq!(mul_div(u128::MAX, 2, 4).unwrap(), u128::MAX / 2);
    }

    #[test]
    fn mul_div_result_overflow() {
        assert_eq!(mul_div(u128::MAX, 2, 1), Err(AccrualError::ArithmeticOverflow));
    }

    #[test]
    fn mul_div_zero_denominator() {
        assert_eq!(mul_div(1, 1, 0), Err(AccrualError::DivisionByZero));
    }

    #[test]
    fn rebase_skips_unsettled_accounts() {
        assert_eq!(rebase(0, 2 * SCALE, SCALE).unwrap(), 0);
        assert_eq!(rebase(500, 2 * SCALE, 0).unwrap(), 500);
    }

    #[test]
    fn rebase_scales_by_index_ratio() {
        let balance = 100 * SCALE;
        let grown = rebase(balance, SCALE + SCALE / 10, SCALE).unwrap();
        assert_eq!(grown, 110 * SCALE);
    }

    #[test]
    fn parse_whole_and_fraction() {
        assert_eq!(parse_amount("100"), Some(100 * SCALE));
        assert_eq!(parse_amount("0.25"), Some(SCALE / 4));
        assert_eq!(parse_amount("12.5"), Some(12 * SCALE + SCALE / 2));
        assert_eq!(parse_amount(".5"), Some(SCALE / 2));
        assert_eq!(parse_amount("3."), Some(3 * SCALE));
        assert_eq!(parse_amount("0.000000000000000001"), Some(1));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("."), None);
        assert_eq!(parse_amount("-1"), None);
        assert_eq!(parse_amount("1e5"), None);
        assert_eq!(parse_amount("1.2.3"), None);
        assert_eq!(parse_amount("0.0000000000000000001"), None);
        assert_eq!(parse_amount("999999999999999999999999"), None);
    }

    #[test]
    fn format_trims_zeros() {
        assert_eq!(format_amount(100 * SCALE), "100");
        assert_eq!(format_amount(SCALE / 4), "0.25");
        assert_eq!(format_amount(1), "0.000000000000000001");
        assert_eq!(format_amount(0), "0");
    }

    proptest! {
        #[test]
        fn format_then_parse_is_identity(value in 0u128..=u128::MAX / 2) {
            prop_assert_eq!(parse_amount(&format_amount(value)), Some(value));
        }

        #[test]
        fn rebase_never_shrinks_with_growing_index(
            balance in 0u128..=1_000_000_000 * SCALE,
            from in 1u128..=10 * SCALE,
            growth in 0u128..=10 * SCALE,
        ) {
            let to = from + growth;
            prop_assert!(rebase(balance, to, from).unwrap() >= balance);
        }
    }
}

//! Operator input validation
//!
//! The strategies trust their inputs; everything reaching them from the CLI
//! passes through these checks first.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::{Money, Side, Symbol};

/// Quote assets accepted at the end of a symbol
const QUOTE_ASSETS: [&str; 5] = ["USDT", "BUSD", "USD", "BTC", "ETH"];

const MIN_SYMBOL_LEN: usize = 6;

/// Relative gap between stop and limit beyond which a stop-limit is flagged
const STOP_LIMIT_GAP: Decimal = dec!(0.1);

pub fn validate_symbol(raw: &str) -> Result<Symbol, ValidationError> {
    let symbol = raw.trim();
    let well_formed = symbol.len() >= MIN_SYMBOL_LEN
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && QUOTE_ASSETS.iter().any(|quote| symbol.ends_with(quote));

    if well_formed {
        Ok(Symbol::new(symbol))
    } else {
        Err(ValidationError::Symbol(raw.to_string()))
    }
}

pub fn validate_side(raw: &str) -> Result<Side, ValidationError> {
    Side::from_str(raw)
}

/// Parse a strictly positive decimal; `field` names the parameter in errors
pub fn validate_positive(field: &'static str, raw: &str) -> Result<Money, ValidationError> {
    match raw.parse::<Money>() {
        Ok(value) if value.is_positive() => Ok(value),
        _ => Err(ValidationError::NotPositive {
            field,
            value: raw.to_string(),
        }),
    }
}

pub fn validate_quantity(raw: &str) -> Result<Money, ValidationError> {
    validate_positive("quantity", raw)
}

pub fn validate_price(raw: &str) -> Result<Money, ValidationError> {
    validate_positive("price", raw)
}

pub fn validate_at_least(field: &'static str, value: u64, min: u64) -> Result<u64, ValidationError> {
    if value >= min {
        Ok(value)
    } else {
        Err(ValidationError::BelowMinimum { field, min, value })
    }
}

pub fn validate_bounds(lower: Money, upper: Money) -> Result<(), ValidationError> {
    if upper > lower {
        Ok(())
    } else {
        Err(ValidationError::Bounds { lower, upper })
    }
}

/// True when a stop-limit's limit sits more than 10% past its stop in the
/// direction that risks an unexpected fill (above for BUY, below for SELL).
/// Worth a warning, not a rejection.
pub fn limit_far_from_stop(side: Side, price: Money, stop_price: Money) -> bool {
    let stop = stop_price.inner();
    match side {
        Side::Buy => price.inner() > stop * (Decimal::ONE + STOP_LIMIT_GAP),
        Side::Sell => price.inner() < stop * (Decimal::ONE - STOP_LIMIT_GAP),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_symbols() {
        for symbol in ["BTCUSDT", "ETHUSDT", "ETHBTC", "1000PEPEUSDT", "BTCBUSD"] {
            assert!(validate_symbol(symbol).is_ok(), "{symbol} should be valid");
        }
    }

    #[test]
    fn test_invalid_symbols() {
        for symbol in ["btcusdt", "BTC", "BTCINR", "BTC-USDT", ""] {
            assert!(validate_symbol(symbol).is_err(), "{symbol} should be invalid");
        }
    }

    #[test]
    fn test_positive_values() {
        assert_eq!(validate_quantity("0.001").unwrap(), Money::new(dec!(0.001)));
        assert!(validate_quantity("0").is_err());
        assert!(validate_price("-25000").is_err());
        assert!(validate_price("abc").is_err());
    }

    #[test]
    fn test_limit_far_from_stop() {
        let stop = Money::from_i64(25000);
        assert!(!limit_far_from_stop(Side::Buy, Money::from_i64(27500), stop));
        assert!(limit_far_from_stop(Side::Buy, Money::new(dec!(27500.01)), stop));
        assert!(!limit_far_from_stop(Side::Buy, Money::from_i64(20000), stop));
        assert!(!limit_far_from_stop(Side::Sell, Money::from_i64(22500), stop));
        assert!(limit_far_from_stop(Side::Sell, Money::new(dec!(22499.99)), stop));
        assert!(!limit_far_from_stop(Side::Sell, Money::from_i64(30000), stop));
    }

    #[test]
    fn test_minimums_and_bounds() {
        assert!(validate_at_least("grid_count", 2, 2).is_ok());
        assert!(validate_at_least("chunk_count", 0, 1).is_err());
        assert!(validate_bounds(Money::from_i64(24000), Money::from_i64(26000)).is_ok());
        assert!(validate_bounds(Money::from_i64(26000), Money::from_i64(26000)).is_err());
    }
}

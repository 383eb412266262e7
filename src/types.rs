//! Core data types shared by the gateways and the execution strategies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Exchange-assigned order identifier
pub type OrderId = u64;

/// Trading pair symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every order record and every log event, so the
/// backing string is shared instead of reallocated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side a filled order is mirrored onto
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            _ => Err(crate::error::ValidationError::Side(s.to_string())),
        }
    }
}

/// Order type submitted to the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Execute immediately against the book
    Market,

    /// Rest on the book at a fixed price, good till cancelled
    Limit,

    /// Becomes a GTC limit order once the mark price reaches the stop price
    #[serde(rename = "STOP_LIMIT")]
    StopLimit,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopLimit => "STOP_LIMIT",
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order status as seen by the strategies
///
/// Exchange statuses outside this set are folded by the gateway:
/// partially filled orders are still `New`, expired orders are `Canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Accepted and live (or partially filled)
    New,

    /// Completely executed
    Filled,

    /// Cancelled or expired
    Canceled,

    /// Refused by the exchange
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::New)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order created and tracked by one of the strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOrder {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Money,
    /// Limit price, `None` for market orders
    pub price: Option<Money>,
    pub order_id: OrderId,
    pub status: OrderStatus,
    /// Average execution price when the exchange reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_fill_price: Option<Money>,
    pub submitted_at: DateTime<Utc>,
}

impl StrategyOrder {
    pub fn is_live(&self) -> bool {
        self.status == OrderStatus::New
    }
}

// ============================================================================
// Money Type - Precise Decimal Arithmetic for Prices and Quantities
// ============================================================================

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Fixed-point decimal used for every price and quantity.
///
/// Wraps `rust_decimal::Decimal` so that chunk sums and ladder spacing are
/// exact: `0.001 * 5 == 0.005`, which does not hold for f64.
///
/// # Example
/// ```
/// use execution_strategies::Money;
/// let total: Money = "0.005".parse().unwrap();
/// let chunk = total.div_floor(5, 3);
/// assert_eq!(chunk.to_string(), "0.001");
/// ```
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    /// Zero value
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// One value
    pub const ONE: Money = Money(Decimal::ONE);

    pub const fn new(value: Decimal) -> Self {
        Money(value)
    }

    /// Create from i64 (for whole number values)
    pub fn from_i64(value: i64) -> Self {
        Money(Decimal::from(value))
    }

    /// Check if value is zero
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Check if value is strictly positive
    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Number of digits after the decimal point
    pub fn scale(self) -> u32 {
        self.0.scale()
    }

    /// Divide by a count, truncating toward zero at `dp` decimal places
    pub fn div_floor(self, count: u32, dp: u32) -> Self {
        if count == 0 {
            return Money::ZERO;
        }
        Money((self.0 / Decimal::from(count)).round_dp_with_strategy(dp, RoundingStrategy::ToZero))
    }

    /// Exact division by a count, at full decimal precision
    pub fn div_exact(self, count: u32) -> Self {
        if count == 0 {
            return Money::ZERO;
        }
        Money(self.0 / Decimal::from(count))
    }

    /// Whole steps of size 1e-`dp` contained in this value, saturating
    pub fn whole_steps(self, dp: u32) -> u64 {
        let step = Decimal::new(1, dp.min(Decimal::MAX_SCALE));
        self.0
            .checked_div(step)
            .and_then(|steps| steps.trunc().to_u64())
            .unwrap_or(u64::MAX)
    }

    /// Multiply by a count
    pub fn times(self, count: usize) -> Self {
        Money(self.0 * Decimal::from(count as u64))
    }

    /// Round half away from zero to `dp` decimal places (exchange tick rounding)
    pub fn round_dp(self, dp: u32) -> Self {
        Money(self.0.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Strip trailing zeros, for wire formats
    pub fn normalize(self) -> Self {
        Money(self.0.normalize())
    }

    /// Get the underlying Decimal
    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Money)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Money::from_i64(value)
    }
}

// PartialEq compares by value, so 1.0 == 1.00
impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for Money {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.normalize().hash(state);
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul for Money {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        Money(self.0 * rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> std::iter::Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}

#[cfg(test)]
mod money_tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_precision() {
        // 0.1 + 0.2 != 0.3 in f64
        let a = Money::new(dec!(0.1));
        let b = Money::new(dec!(0.2));
        assert_eq!(a + b, Money::new(dec!(0.3)));
    }

    #[test]
    fn test_div_floor_truncates() {
        let total = Money::new(dec!(0.007));
        assert_eq!(total.div_floor(3, 3), Money::new(dec!(0.002)));
        assert_eq!(Money::new(dec!(1)).div_floor(3, 0), Money::ZERO);
    }

    #[test]
    fn test_round_dp_midpoint_away_from_zero() {
        assert_eq!(Money::new(dec!(24666.665)).round_dp(2), Money::new(dec!(24666.67)));
        assert_eq!(Money::new(dec!(0.125)).round_dp(2), Money::new(dec!(0.13)));
    }

    #[test]
    fn test_money_sum() {
        let values = vec![Money::new(dec!(10)), Money::new(dec!(20.5)), Money::new(dec!(0.5))];
        let total: Money = values.iter().sum();
        assert_eq!(total, Money::from_i64(31));
    }

    #[test]
    fn test_money_serde_as_string() {
        let money = Money::new(dec!(123.456));
        let json = serde_json::to_string(&money).unwrap();
        assert_eq!(json, "\"123.456\"");
        let parsed: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(money, parsed);
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!("buy".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!(" SELL ".parse::<Side>().unwrap(), Side::Sell);
        assert!("hold".parse::<Side>().is_err());
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }

    #[test]
    fn test_order_type_names() {
        assert_eq!(
            serde_json::to_string(&OrderType::StopLimit).unwrap(),
            "\"STOP_LIMIT\""
        );
        assert_eq!(OrderType::StopLimit.to_string(), "STOP_LIMIT");
        assert_eq!(OrderType::Limit.to_string(), "LIMIT");
    }

    #[test]
    fn test_whole_steps() {
        assert_eq!(Money::new(dec!(0.002)).whole_steps(3), 2);
        assert_eq!(Money::new(dec!(0.0029)).whole_steps(3), 2);
        assert_eq!(Money::new(dec!(0.0005)).whole_steps(3), 0);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!OrderStatus::New.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
    }
}

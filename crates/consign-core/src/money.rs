//! # Money & Quantity Module
//!
//! Integer representations for every amount and quantity in settlement.
//!
//! ## Why Integers?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SETTLEMENT ARITHMETIC                                                  │
//! │                                                                         │
//! │  Money     = i64 cents            1999  → $19.99                        │
//! │  Quantity  = i64 thousandths      7_500 → 7.5 units (kg, litres, ...)   │
//! │  Rate      = u32 basis points     1000  → 10.00%                        │
//! │                                                                         │
//! │  Every product of two of these is computed in i128 and rounded back     │
//! │  to whole cents HALF AWAY FROM ZERO, immediately, once:                 │
//! │                                                                         │
//! │    qty × price       → cents × milli / 1000    → round                  │
//! │    amount × rate     → cents × bps   / 10000   → round                  │
//! │    total × share/sum → cents × w     / Σw      → round                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use consign_core::money::{Money, Quantity};
//! use consign_core::types::CommissionRate;
//!
//! let price = Money::from_cents(2000);           // $20.00
//! let sold = Quantity::from_units(7);            // 7 units
//! let gross = price.multiply_quantity(sold);     // $140.00
//! let commission = gross.apply_rate(CommissionRate::from_bps(1000));
//! assert_eq!(commission.cents(), 1400);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::CommissionRate;

/// Milli-units per whole unit of quantity.
pub const MILLI_PER_UNIT: i64 = 1000;

/// Largest amount accepted from callers: $100,000,000.00.
///
/// With [`MAX_QUANTITY`] this keeps every line product and every sum over
/// [`MAX_LIST_INPUT`](crate::MAX_LIST_INPUT) lines inside `i64`.
pub const MAX_AMOUNT: Money = Money::from_cents(10_000_000_000);

/// Largest quantity accepted from callers: 1,000,000 units.
pub const MAX_QUANTITY: Quantity = Quantity::from_units(1_000_000);

/// Divides and rounds half away from zero. `denominator` must be positive.
///
/// ```rust
/// use consign_core::money::div_round;
///
/// assert_eq!(div_round(5, 10), 1);   //  0.5 →  1
/// assert_eq!(div_round(-5, 10), -1); // -0.5 → -1
/// assert_eq!(div_round(4, 10), 0);
/// ```
pub fn div_round(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0, "denominator must be positive");
    if numerator >= 0 {
        (2 * numerator + denominator) / (2 * denominator)
    } else {
        -((2 * -numerator + denominator) / (2 * denominator))
    }
}

/// Brings an `i128` intermediate back to `i64`, saturating instead of
/// truncating.
#[inline]
fn narrow(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents.
///
/// ## Design Decisions
/// - **i64 (signed)**: differences such as `net - paid` may go negative
///   transiently while validating; the engine rejects those states
/// - **Single field tuple struct**: zero-cost abstraction over i64
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use consign_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // $10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -$5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (dollars) portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Clamps negative values to zero.
    #[inline]
    pub fn non_negative(self) -> Self {
        if self.0 < 0 {
            Money::zero()
        } else {
            self
        }
    }

    /// Applies a basis-point rate and rounds to whole cents.
    ///
    /// ## Example
    /// ```rust
    /// use consign_core::money::Money;
    /// use consign_core::types::CommissionRate;
    ///
    /// let gross = Money::from_cents(1005);          // $10.05
    /// let rate = CommissionRate::from_bps(1000);     // 10%
    ///
    /// // $10.05 × 10% = $1.005 → rounds to $1.01
    /// assert_eq!(gross.apply_rate(rate).cents(), 101);
    /// ```
    pub fn apply_rate(&self, rate: CommissionRate) -> Money {
        let cents = div_round(self.0 as i128 * rate.bps() as i128, 10_000);
        Money::from_cents(narrow(cents))
    }

    /// Multiplies a unit price by a (possibly fractional) quantity.
    ///
    /// ## Example
    /// ```rust
    /// use consign_core::money::{Money, Quantity};
    ///
    /// let unit_price = Money::from_cents(333);          // $3.33
    /// let qty = Quantity::from_milli(1_500);            // 1.5 units
    /// // $4.995 → $5.00
    /// assert_eq!(unit_price.multiply_quantity(qty).cents(), 500);
    /// ```
    pub fn multiply_quantity(&self, qty: Quantity) -> Money {
        let cents = div_round(self.0 as i128 * qty.milli() as i128, MILLI_PER_UNIT as i128);
        Money::from_cents(narrow(cents))
    }

    /// Computes `self × numerator / denominator`, rounded to whole cents.
    ///
    /// Returns zero when the denominator is not positive.
    pub fn scale(&self, numerator: Money, denominator: Money) -> Money {
        if denominator.0 <= 0 {
            return Money::zero();
        }
        let cents = div_round(self.0 as i128 * numerator.0 as i128, denominator.0 as i128);
        Money::from_cents(narrow(cents))
    }
}

// =============================================================================
// Money Trait Implementations
// =============================================================================

/// Debug-oriented display; presentation layers do their own formatting.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(self.0.saturating_neg())
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Quantity Type
// =============================================================================

/// A stock quantity in thousandths of a unit.
///
/// Consigned goods are often weighed (kg) or measured (litres), so quantities
/// are not whole numbers. Storing milli-units keeps the balance invariant
/// `sold + unsold + expired + damaged == delivered` exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    /// Creates a quantity from whole units.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units.saturating_mul(MILLI_PER_UNIT))
    }

    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// `None` when the sum does not fit.
    #[inline]
    pub const fn checked_add(self, other: Quantity) -> Option<Quantity> {
        match self.0.checked_add(other.0) {
            Some(milli) => Some(Quantity(milli)),
            None => None,
        }
    }

    /// True when `self` and `other` differ by at most `tolerance`.
    #[inline]
    pub fn within(&self, other: Quantity, tolerance: Quantity) -> bool {
        (self.0 as i128 - other.0 as i128).abs() <= tolerance.0 as i128
    }
}

/// Shows whole units without decimals, fractional units with up to three.
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let whole = abs / MILLI_PER_UNIT;
        let frac = abs % MILLI_PER_UNIT;
        if frac == 0 {
            write!(f, "{}{}", sign, whole)
        } else {
            let digits = format!("{:03}", frac);
            write!(f, "{}{}.{}", sign, whole, digits.trim_end_matches('0'))
        }
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::zero()
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0.saturating_sub(other.0))
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.dollars(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "$10.99");
        assert_eq!(Money::from_cents(-550).to_string(), "-$5.50");
        assert_eq!(Money::zero().to_string(), "$0.00");
    }

    #[rstest]
    #[case(5, 10, 1)]
    #[case(4, 10, 0)]
    #[case(15, 10, 2)]
    #[case(25, 10, 3)]
    #[case(-5, 10, -1)]
    #[case(-4, 10, 0)]
    #[case(1, 3, 0)]
    #[case(2, 3, 1)]
    fn test_div_round_half_away_from_zero(
        #[case] numerator: i128,
        #[case] denominator: i128,
        #[case] expected: i128,
    ) {
        assert_eq!(div_round(numerator, denominator), expected);
    }

    #[test]
    fn test_apply_rate_rounds_half_up() {
        // $10.05 at 10% = $1.005 → $1.01
        let commission = Money::from_cents(1005).apply_rate(CommissionRate::from_bps(1000));
        assert_eq!(commission.cents(), 101);

        // $20.00 at 10% = $2.00 exactly
        let commission = Money::from_cents(2000).apply_rate(CommissionRate::from_bps(1000));
        assert_eq!(commission.cents(), 200);
    }

    #[test]
    fn test_multiply_fractional_quantity() {
        let price = Money::from_cents(1250); // $12.50 per kg
        assert_eq!(price.multiply_quantity(Quantity::from_milli(2_500)).cents(), 3125);
        assert_eq!(price.multiply_quantity(Quantity::from_units(7)).cents(), 8750);
        assert_eq!(price.multiply_quantity(Quantity::zero()).cents(), 0);
    }

    #[test]
    fn test_scale_proportional_share() {
        // 200 × 100 / 400 = 50
        let share = Money::from_cents(20_000).scale(Money::from_cents(10_000), Money::from_cents(40_000));
        assert_eq!(share.cents(), 5_000);

        // Zero denominator yields zero rather than dividing.
        let share = Money::from_cents(20_000).scale(Money::from_cents(10_000), Money::zero());
        assert!(share.is_zero());
    }

    #[test]
    fn test_sum_and_non_negative() {
        let total: Money = [Money::from_cents(100), Money::from_cents(250)].iter().sum();
        assert_eq!(total.cents(), 350);
        assert_eq!(Money::from_cents(-1).non_negative(), Money::zero());
    }

    #[test]
    fn test_quantity_display() {
        assert_eq!(Quantity::from_units(7).to_string(), "7");
        assert_eq!(Quantity::from_milli(7_500).to_string(), "7.5");
        assert_eq!(Quantity::from_milli(10).to_string(), "0.01");
        assert_eq!(Quantity::from_milli(-1_250).to_string(), "-1.25");
    }

    #[test]
    fn test_quantity_within_tolerance() {
        let delivered = Quantity::from_units(50);
        assert!(delivered.within(Quantity::from_milli(50_010), Quantity::from_milli(10)));
        assert!(!delivered.within(Quantity::from_milli(50_011), Quantity::from_milli(10)));
    }

    #[test]
    fn test_products_saturate_at_i64_edge() {
        let huge = Quantity::from_milli(i64::MAX);
        assert_eq!(Money::from_cents(2_000).multiply_quantity(huge).cents(), i64::MAX);
        assert_eq!(Money::from_cents(-2_000).multiply_quantity(huge).cents(), i64::MIN);

        let max = Money::from_cents(i64::MAX);
        assert_eq!(max.scale(max, Money::from_cents(1)).cents(), i64::MAX);
        assert!(max.apply_rate(CommissionRate::from_bps(10_000)) == max);
    }

    #[test]
    fn test_sums_never_wrap_negative() {
        let total: Money = [Money::from_cents(i64::MAX), Money::from_cents(1)].iter().sum();
        assert_eq!(total.cents(), i64::MAX);
        assert_eq!((Money::from_cents(i64::MIN) - Money::from_cents(1)).cents(), i64::MIN);
        assert_eq!((-Money::from_cents(i64::MIN)).cents(), i64::MAX);
    }

    #[test]
    fn test_quantity_checked_add() {
        let max = Quantity::from_milli(i64::MAX);
        assert_eq!(max.checked_add(Quantity::from_milli(1)), None);
        assert_eq!(
            Quantity::from_units(30).checked_add(Quantity::from_units(20)),
            Some(Quantity::from_units(50))
        );
        assert!(!Quantity::from_milli(i64::MIN).within(max, Quantity::from_milli(10)));
    }

    #[test]
    fn test_ceiling_products_fit() {
        let line = MAX_AMOUNT.multiply_quantity(MAX_QUANTITY);
        let lines = (0..crate::MAX_LIST_INPUT).map(|_| line).sum::<Money>();
        assert!(lines.cents() < i64::MAX);
    }

    proptest! {
        #[test]
        fn prop_multiply_quantity_in_range_is_exact_rounding(
            cents in 0i64..=MAX_AMOUNT.cents(),
            milli in 0i64..=MAX_QUANTITY.milli(),
        ) {
            let product = Money::from_cents(cents).multiply_quantity(Quantity::from_milli(milli));
            let expected = div_round(cents as i128 * milli as i128, MILLI_PER_UNIT as i128);
            prop_assert_eq!(product.cents() as i128, expected);
        }

        #[test]
        fn prop_rate_never_exceeds_amount(cents in 0i64..10_000_000, bps in 0u32..=10_000) {
            let amount = Money::from_cents(cents);
            let part = amount.apply_rate(CommissionRate::from_bps(bps));
            prop_assert!(part <= amount);
            prop_assert!(!part.is_negative());
        }

        #[test]
        fn prop_scale_within_half_cent(total in 0i64..1_000_000, w in 0i64..1_000_000, extra in 1i64..1_000_000) {
            let sum = Money::from_cents(w + extra);
            let share = Money::from_cents(total).scale(Money::from_cents(w), sum);
            prop_assert!(share.cents() <= total);
        }
    }
}

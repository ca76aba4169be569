//! Fixed-point monetary amounts.
//!
//! Amounts are held in minor units (cents) so that paired ledger entries net
//! to exactly zero. On the wire they are plain decimal JSON numbers.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Largest magnitude accepted from a decimal input, in major units.
const MAX_MAJOR: f64 = 1e13;

/// A signed monetary amount in minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from minor units.
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Creates an amount from a decimal value in major units, rounded to the
    /// nearest minor unit. Returns `None` for non-finite or out-of-range input.
    #[must_use]
    pub fn from_major(major: f64) -> Option<Self> {
        if !major.is_finite() || major.abs() > MAX_MAJOR {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        let minor = (major * 100.0).round() as i64;
        Some(Self(minor))
    }

    /// Minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Decimal value in major units.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_major(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Returns true if the amount is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is strictly negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Absolute value.
    #[must_use]
    pub const fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    /// Multiplies by a count (e.g. price per person times travelers).
    #[must_use]
    pub fn times(self, count: u32) -> Self {
        Self(self.0.saturating_mul(i64::from(count)))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_major())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let major = f64::deserialize(deserializer)?;
        Self::from_major(major)
            .ok_or_else(|| D::Error::custom(format!("amount {major} is not a representable monetary value")))
    }
}

impl JsonSchema for Money {
    fn is_referenceable() -> bool {
        false
    }

    fn schema_name() -> String {
        "Money".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        f64::json_schema(gen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_major_rounds_to_cents() {
        assert_eq!(Money::from_major(100.0), Some(Money::from_minor(10_000)));
        assert_eq!(Money::from_major(0.1 + 0.2), Some(Money::from_minor(30)));
        assert_eq!(Money::from_major(-12.345), Some(Money::from_minor(-1_235)));
        assert_eq!(Money::from_major(f64::NAN), None);
        assert_eq!(Money::from_major(f64::INFINITY), None);
    }

    #[test]
    fn display_has_two_decimals() {
        assert_eq!(Money::from_minor(10_000).to_string(), "100.00");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn negation_nets_to_zero() {
        let amount = Money::from_minor(25_000);
        assert!((amount + -amount).is_zero());
        let total: Money = [amount, -amount, Money::from_minor(1)].iter().sum();
        assert_eq!(total, Money::from_minor(1));
    }

    #[test]
    fn serializes_as_decimal_number() {
        let json = serde_json::to_string(&Money::from_minor(25_050)).unwrap();
        assert_eq!(json, "250.5");
        let back: Money = serde_json::from_str("250.5").unwrap();
        assert_eq!(back, Money::from_minor(25_050));
        let int: Money = serde_json::from_str("40").unwrap();
        assert_eq!(int, Money::from_minor(4_000));
    }
}

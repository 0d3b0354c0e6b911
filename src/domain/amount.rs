//! Arbitrary-precision signed integer amount backed by num-bigint.
//!
//! Provides canonical parsing from strings and formatting as a plain base-10 integer.

use num_bigint::{BigInt, Sign};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Signed integer quantity for balances, deltas and staked amounts.
///
/// Token amounts routinely exceed 64 bits (18-decimal wei values), so the
/// value is unbounded. Serializes to a JSON string to survive JS consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(BigInt);

/// Error returned when a string is not a base-10 integer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid integer amount: {0:?}")]
pub struct ParseAmountError(pub String);

impl Amount {
    /// Create an Amount from a BigInt.
    pub fn new(value: BigInt) -> Self {
        Amount(value)
    }

    /// Parse an Amount from a base-10 string, optionally signed.
    ///
    /// # Errors
    /// Returns an error if the string is empty or contains non-digit characters.
    pub fn from_str_canonical(s: &str) -> Result<Self, ParseAmountError> {
        let trimmed = s.trim();
        BigInt::parse_bytes(trimmed.as_bytes(), 10)
            .map(Amount)
            .ok_or_else(|| ParseAmountError(s.to_string()))
    }

    /// Format as a canonical string: no leading zeros, no `+`, `-` only when negative.
    pub fn to_canonical_string(&self) -> String {
        self.0.to_str_radix(10)
    }

    /// Get the underlying BigInt.
    pub fn inner(&self) -> &BigInt {
        &self.0
    }

    /// The additive identity (0).
    pub fn zero() -> Self {
        Amount(BigInt::default())
    }

    /// Returns true if the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.sign() == Sign::NoSign
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        self.0.sign() == Sign::Plus
    }

    /// Returns true if the value is < 0.
    pub fn is_negative(&self) -> bool {
        self.0.sign() == Sign::Minus
    }

    /// Sum an iterator of amounts.
    pub fn sum<'a>(amounts: impl IntoIterator<Item = &'a Amount>) -> Amount {
        amounts
            .into_iter()
            .fold(Amount::zero(), |acc, a| Amount(acc.0 + &a.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Amount {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<BigInt> for Amount {
    fn from(value: BigInt) -> Self {
        Amount(value)
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Amount(BigInt::from(value))
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount(BigInt::from(value))
    }
}

impl From<i32> for Amount {
    fn from(value: i32) -> Self {
        Amount(BigInt::from(value))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Amount::from_str_canonical(&s).map_err(serde::de::Error::custom)
    }
}

// Arithmetic operations
impl std::ops::Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Add<&Amount> for &Amount {
    type Output = Amount;

    fn add(self, rhs: &Amount) -> Amount {
        Amount(&self.0 + &rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::Sub<&Amount> for &Amount {
    type Output = Amount;

    fn sub(self, rhs: &Amount) -> Amount {
        Amount(&self.0 - &rhs.0)
    }
}

impl std::ops::Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl std::ops::Neg for &Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_parse_canonical() {
        let cases = vec![
            ("0", "0"),
            ("-0", "0"),
            ("000123", "123"),
            ("-42", "-42"),
            (
                "1000000000000000000000000000000",
                "1000000000000000000000000000000",
            ),
        ];

        for (input, expected) in cases {
            let amount = Amount::from_str_canonical(input).expect("parse failed");
            assert_eq!(amount.to_canonical_string(), expected, "input {}", input);
        }
    }

    #[test]
    fn test_amount_rejects_non_integers() {
        assert!(Amount::from_str_canonical("").is_err());
        assert!(Amount::from_str_canonical("1.5").is_err());
        assert!(Amount::from_str_canonical("1e18").is_err());
        assert!(Amount::from_str_canonical("abc").is_err());
    }

    #[test]
    fn test_amount_sign_predicates() {
        assert!(Amount::zero().is_zero());
        assert!(!Amount::zero().is_positive());
        assert!(!Amount::zero().is_negative());
        assert!(Amount::from(5).is_positive());
        assert!(Amount::from(-5).is_negative());
    }

    #[test]
    fn test_amount_arithmetic_beyond_u64() {
        let a = Amount::from(u64::MAX);
        let b = Amount::from(u64::MAX);
        let sum = &a + &b;
        assert_eq!(sum.to_canonical_string(), "36893488147419103230");
        assert_eq!(&sum - &a, b);
        assert_eq!(-Amount::from(7), Amount::from(-7));
    }

    #[test]
    fn test_amount_sum() {
        let amounts = vec![Amount::from(1000), Amount::from(-300), Amount::zero()];
        assert_eq!(Amount::sum(&amounts), Amount::from(700));
        assert_eq!(Amount::sum(&Vec::new()), Amount::zero());
    }

    #[test]
    fn test_amount_json_is_string() {
        let amount = Amount::from(-123);
        let json = serde_json::to_value(&amount).unwrap();
        assert_eq!(json, serde_json::json!("-123"));

        let back: Amount = serde_json::from_value(json).unwrap();
        assert_eq!(back, amount);
    }
}

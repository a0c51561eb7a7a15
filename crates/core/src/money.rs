use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A currency code ("USD") or share unit ("AAPL").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Unit(pub String);

impl Unit {
    pub fn new(tag: impl Into<String>) -> Self {
        Unit(tag.into())
    }

    pub fn usd() -> Self {
        Unit("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Unit mismatch: {left} vs {right}")]
    UnitMismatch { left: Unit, right: Unit },
}

/// An exact-decimal amount tagged with its unit. Arithmetic between two
/// values requires matching units; there are no infallible operator impls.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub unit: Unit,
}

impl Money {
    pub fn new(amount: Decimal, unit: Unit) -> Self {
        Money { amount, unit }
    }

    pub fn usd(amount: Decimal) -> Self {
        Money::new(amount, Unit::usd())
    }

    pub fn zero(unit: Unit) -> Self {
        Money::new(Decimal::ZERO, unit)
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn try_add(&self, rhs: &Money) -> Result<Money, MoneyError> {
        self.check_unit(rhs)?;
        Ok(Money::new(self.amount + rhs.amount, self.unit.clone()))
    }

    pub fn try_sub(&self, rhs: &Money) -> Result<Money, MoneyError> {
        self.check_unit(rhs)?;
        Ok(Money::new(self.amount - rhs.amount, self.unit.clone()))
    }

    pub fn neg(&self) -> Money {
        Money::new(-self.amount, self.unit.clone())
    }

    pub fn abs(&self) -> Money {
        Money::new(self.amount.abs(), self.unit.clone())
    }

    fn check_unit(&self, rhs: &Money) -> Result<(), MoneyError> {
        if self.unit != rhs.unit {
            return Err(MoneyError::UnitMismatch {
                left: self.unit.clone(),
                right: rhs.unit.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn add_same_unit() {
        let a = Money::usd(dec!(10.25));
        let b = Money::usd(dec!(4.75));
        assert_eq!(a.try_add(&b).unwrap(), Money::usd(dec!(15.00)));
    }

    #[test]
    fn add_mixed_units_fails() {
        let cash = Money::usd(dec!(10));
        let shares = Money::new(dec!(10), Unit::new("AAPL"));
        assert!(matches!(
            cash.try_add(&shares),
            Err(MoneyError::UnitMismatch { .. })
        ));
    }

    #[test]
    fn sub_same_unit() {
        let a = Money::usd(dec!(10.00));
        let b = Money::usd(dec!(0.01));
        assert_eq!(a.try_sub(&b).unwrap(), Money::usd(dec!(9.99)));
    }

    #[test]
    fn exact_equality_no_epsilon() {
        // 0.1 + 0.2 == 0.3 holds for decimals, unlike floats.
        let sum = Money::usd(dec!(0.1)).try_add(&Money::usd(dec!(0.2))).unwrap();
        assert_eq!(sum, Money::usd(dec!(0.3)));
    }

    #[test]
    fn neg_and_abs() {
        let m = Money::usd(dec!(-5.50));
        assert_eq!(m.abs(), Money::usd(dec!(5.50)));
        assert_eq!(m.neg(), Money::usd(dec!(5.50)));
    }

    #[test]
    fn zero_is_zero() {
        assert!(Money::zero(Unit::usd()).is_zero());
        assert!(!Money::usd(dec!(0.01)).is_zero());
    }

    #[test]
    fn display_includes_unit() {
        assert_eq!(Money::usd(dec!(12.5)).to_string(), "12.50 USD");
    }
}

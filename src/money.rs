//! Fixed-point amounts of money.

use std::fmt::Display;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Error;

/// An amount of money with two decimal places.
///
/// Stored as a whole number of minor units (e.g. cents or paise) so that
/// arithmetic in the database is exact.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    /// No money at all.
    pub const ZERO: Money = Money(0);

    /// The number of decimal places an amount may have.
    pub const SCALE: u32 = 2;

    /// Create an amount from a whole number of minor units, e.g. `12345` is 123.45.
    pub fn from_minor_units(minor_units: i64) -> Self {
        Self(minor_units)
    }

    /// The amount as a whole number of minor units.
    pub fn as_minor_units(&self) -> i64 {
        self.0
    }

    /// The amount as a decimal number with two decimal places.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, Self::SCALE)
    }

    /// Whether the amount is greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Add two amounts, returning `None` on overflow.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = Error;

    /// Convert a decimal amount into money.
    ///
    /// # Errors
    /// Returns [Error::InvalidAmount] if `amount` has more than two decimal
    /// places or does not fit in the range of representable amounts.
    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        if amount.normalize().scale() > Self::SCALE {
            return Err(Error::InvalidAmount(amount));
        }

        amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|minor_units| minor_units.to_i64())
            .map(Money)
            .ok_or(Error::InvalidAmount(amount))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_decimal().fmt(f)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&self.to_decimal(), serializer)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = <Decimal as Deserialize>::deserialize(deserializer)?;

        Money::try_from(amount).map_err(serde::de::Error::custom)
    }
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(Money)
    }
}

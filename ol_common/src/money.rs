use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "USD";

//--------------------------------------       Money         ---------------------------------------------------------
/// A fixed-point monetary amount, stored as an integer number of minor units (e.g. cents).
///
/// Amounts never pass through floating point, so totals, refunds and audit entries always agree to the last unit.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {} is too large to convert to Money", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

/// Formats with two minor-unit digits. Use [`Money::format_in`] when the currency is known.
impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_with_digits(2))
    }
}

/// The number of minor-unit digits for an ISO 4217 currency code. Unknown codes use two.
pub fn minor_unit_digits(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF" | "UGX" | "VND" | "VUV" |
        "XAF" | "XOF" | "XPF" => 0,
        "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
        _ => 2,
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Formats the amount with the number of minor-unit digits `currency` uses, e.g. 1234 is `12.34` in USD, `1234`
    /// in JPY and `1.234` in KWD.
    pub fn format_in(&self, currency: &str) -> String {
        self.format_with_digits(minor_unit_digits(currency))
    }

    fn format_with_digits(&self, digits: u32) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        if digits == 0 {
            return format!("{sign}{abs}");
        }
        let scale = 10u64.pow(digits);
        format!("{sign}{}.{:0width$}", abs / scale, abs % scale, width = digits as usize)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    pub fn checked_mul(self, quantity: i64) -> Option<Self> {
        self.0.checked_mul(quantity).map(Self)
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }
}

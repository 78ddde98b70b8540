//! Money model
//!
//! Every balance is an integer count of minor units (1/100 of a unit).
//! Caller-supplied decimal amounts cross into the integer domain exactly
//! once, through [`to_minor_units`], which truncates toward zero. Stored
//! balances depend on that policy, so it must not be changed to rounding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{WalletError, WalletResult};

/// Minor units per whole currency unit (two decimal places for every currency)
pub const MINOR_UNIT_FACTOR: i64 = 100;

/// `MINOR_UNIT_FACTOR` as f64 for the decimal boundary
const MINOR_UNIT_FACTOR_F64: f64 = 100.0;

/// Largest minor-unit value a decimal amount may convert to
const MAX_MINOR_F64: f64 = 9_223_372_036_854_775_807.0;

/// Supported currencies
///
/// Closed set: each variant maps 1:1 to a balance column on the wallet row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// US dollar
    #[serde(rename = "USD")]
    Usd,
    /// Russian ruble
    #[serde(rename = "RUB")]
    Rub,
    /// Euro
    #[serde(rename = "EUR")]
    Eur,
}

impl Currency {
    /// All supported currencies, in column order
    pub const ALL: [Self; 3] = [Self::Usd, Self::Rub, Self::Eur];

    /// Upper-case ISO symbol
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Rub => "RUB",
            Self::Eur => "EUR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Currency {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Self::Usd),
            "RUB" => Ok(Self::Rub),
            "EUR" => Ok(Self::Eur),
            other => Err(WalletError::UnsupportedCurrency(other.to_string())),
        }
    }
}

/// Balance or amount in minor units (1 minor unit = 0.01)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MinorUnits(i64);

impl MinorUnits {
    /// Zero balance
    pub const ZERO: Self = Self(0);

    /// Create from raw minor units
    #[must_use]
    pub const fn from_i64(units: i64) -> Self {
        Self(units)
    }

    /// Create from whole major units
    #[must_use]
    pub const fn from_major(units: i64) -> Self {
        Self(units * MINOR_UNIT_FACTOR)
    }

    /// Raw minor units
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Value in major units, for display and event payloads only
    #[must_use]
    pub fn as_major(self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        {
            self.0 as f64 / MINOR_UNIT_FACTOR_F64
        }
    }

    /// Strictly positive
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Add, failing on overflow
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Subtract, failing if the result would go below zero
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        if self.0 < other.0 {
            return None;
        }
        Some(Self(self.0 - other.0))
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let factor = MINOR_UNIT_FACTOR.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / factor, abs % factor)
    }
}

/// Convert a caller-supplied decimal amount to minor units.
///
/// Rejects amounts that are not strictly positive (including NaN) before
/// anything else. The product `amount * 100` is truncated toward zero; an
/// amount that truncates to zero minor units is rejected as well.
pub fn to_minor_units(amount: f64) -> WalletResult<MinorUnits> {
    if !(amount > 0.0) || !amount.is_finite() {
        return Err(WalletError::InvalidAmount);
    }

    let scaled = (amount * MINOR_UNIT_FACTOR_F64).trunc();
    if scaled < 1.0 || scaled >= MAX_MINOR_F64 {
        return Err(WalletError::InvalidAmount);
    }

    #[allow(clippy::cast_possible_truncation)]
    let units = scaled as i64;
    Ok(MinorUnits(units))
}

/// Converted amount for an exchange: floating multiply of the decimal
/// amount by the rate, then the standard truncating conversion.
pub fn convert(amount: f64, rate: f64) -> WalletResult<MinorUnits> {
    to_minor_units(amount * rate)
}

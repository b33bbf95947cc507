//! Monetary amounts.

use serde::{Deserialize, Serialize};

/// Money amount in minor units (paisa) to avoid floating point issues.
///
/// Serialized as a bare integer so request and row payloads carry minor
/// units directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    minor: i64,
}

impl Money {
    /// Creates a new amount from minor units.
    pub fn from_minor(minor: i64) -> Self {
        Self { minor }
    }

    /// Creates a new amount from whole rupees.
    pub fn from_major(major: i64) -> Self {
        Self { minor: major * 100 }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { minor: 0 }
    }

    /// Returns the amount in minor units.
    pub fn minor(&self) -> i64 {
        self.minor
    }

    /// Returns the whole-rupee portion.
    pub fn major(&self) -> i64 {
        self.minor / 100
    }

    /// Returns the paisa portion.
    pub fn minor_part(&self) -> i64 {
        self.minor.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.minor
            .checked_mul(i64::from(quantity))
            .map(|minor| Money { minor })
    }

    /// Formats the amount as a plain decimal string, e.g. `"1250.00"`.
    ///
    /// This is the shape courier and notification payloads expect.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.minor < 0 { "-" } else { "" };
        format!("{sign}{}.{:02}", self.major().abs(), self.minor_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PKR {}", self.to_decimal_string())
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            minor: self.minor + rhs.minor,
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            minor: self.minor - rhs.minor,
        }
    }
}

//! Exact signed 128-bit amounts used for intent amounts and cash deltas.
//!
//! Every arithmetic operation is checked; overflow never wraps silently.
//! This mirrors the fixed-point, overflow-checked `Amount` the rest of
//! the netting engine's lineage uses for money, narrowed here to a bare
//! `i128` since items and deltas have no currency/decimals of their own
//! (the wallet's asset is tracked by the caller, not by this type).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Signed128(pub i128);

impl Signed128 {
    pub const ZERO: Signed128 = Signed128(0);

    pub fn new(value: i128) -> Self {
        Self(value)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition; `None` on overflow.
    pub fn checked_add(self, rhs: Signed128) -> Option<Signed128> {
        self.0.checked_add(rhs.0).map(Signed128)
    }

    /// Checked subtraction; `None` on overflow.
    pub fn checked_sub(self, rhs: Signed128) -> Option<Signed128> {
        self.0.checked_sub(rhs.0).map(Signed128)
    }
}

impl Neg for Signed128 {
    type Output = Signed128;
    fn neg(self) -> Signed128 {
        Signed128(-self.0)
    }
}

impl fmt::Display for Signed128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Non-negative intent amount, parsed from the canonical decimal-string
/// wire representation (`amount_as_decimal_string`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn new(value: u128) -> Self {
        Self(value)
    }

    /// `None` if `self` doesn't fit in `i128` — a u128 amount above
    /// `i128::MAX` would otherwise wrap to a negative delta on an
    /// unchecked cast.
    pub fn as_signed(&self) -> Option<Signed128> {
        i128::try_from(self.0).ok().map(Signed128)
    }

    pub fn to_decimal_string(&self) -> String {
        self.0.to_string()
    }

    pub fn from_decimal_string(s: &str) -> Option<Self> {
        s.parse::<u128>().ok().map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! Monetary amounts.
//!
//! Amounts are arbitrary-precision decimals (`rust_decimal::Decimal`), stored
//! in their natural form (`44.99`, not `4499` cents) and mapped to Postgres
//! `NUMERIC` by the storage layer. Money is never negative.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A non-negative monetary amount.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Wrap a decimal amount, rejecting negative values.
    pub fn new(amount: Decimal) -> DomainResult<Self> {
        if amount < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "money must be non-negative, got {amount}"
            )));
        }
        Ok(Self(amount))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Multiply a unit amount by a count (e.g. unit price × quantity).
    ///
    /// Non-negative × non-negative stays non-negative, so this cannot fail.
    pub fn times(&self, count: u32) -> Money {
        Money(self.0 * Decimal::from(count))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

//! The order placement command and its error taxonomy.
//!
//! Validation lives here; the atomic execution (stock check, decrement,
//! insert, commit) is the storage layer's job. A placement that fails at
//! any step leaves no trace: no order row, no stock change.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use voltmart_core::{CustomerId, Money, OrderId, ProductId};

/// Why an order placement was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaceOrderError {
    /// The authenticated identity has no customer record. User-correctable
    /// (complete the profile / contact support); not retryable as-is.
    #[error("no customer account is linked to this identity")]
    NoLinkedAccount,

    /// Quantity was not a positive whole number. Caller input error.
    #[error("quantity must be a positive whole number")]
    InvalidQuantity,

    /// The referenced product does not exist. Caller input error.
    #[error("product not found")]
    ProductNotFound,

    /// Requested quantity exceeds what is available. Carries the current
    /// availability so the caller can tell the user how many are left.
    #[error("insufficient stock: only {available} available")]
    InsufficientStock { available: i64 },

    /// An underlying storage/transaction error. The transaction rolled back
    /// fully, so a caller-side retry is safe. The display message stays
    /// generic; the detail field is for logs only and must not be shown to
    /// end users.
    #[error("order placement failed due to a storage error")]
    Transaction(String),
}

impl PlaceOrderError {
    /// Whether a retry with identical arguments could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlaceOrderError::Transaction(_))
    }
}

/// A validated, positive purchase quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(raw: i64) -> Result<Self, PlaceOrderError> {
        if raw <= 0 || raw > i64::from(u32::MAX) {
            return Err(PlaceOrderError::InvalidQuantity);
        }
        Ok(Self(raw as u32))
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn as_i64(&self) -> i64 {
        i64::from(self.0)
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A fully validated placement, ready for atomic execution.
///
/// Carries the resolved customer (the identity link was already checked),
/// the validated quantity, and the order date stamped by the service at
/// date-only granularity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlacement {
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub ordered_on: NaiveDate,
}

impl OrderPlacement {
    /// Total owed for this placement at the given unit price.
    ///
    /// The unit price must be the one observed inside the placement
    /// transaction; a concurrent price change after that read does not
    /// affect this order.
    pub fn total(&self, unit_price: Money) -> Money {
        unit_price.times(self.quantity.get())
    }
}

/// What a successful placement returns to the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub total: Money,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn money(mantissa: i64, scale: u32) -> Money {
        Money::new(Decimal::new(mantissa, scale)).unwrap()
    }

    fn placement(quantity: i64) -> OrderPlacement {
        OrderPlacement {
            customer_id: CustomerId::new(1),
            product_id: ProductId::new(1),
            quantity: Quantity::new(quantity).unwrap(),
            ordered_on: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        }
    }

    #[test]
    fn quantity_rejects_zero_and_negative() {
        assert_eq!(Quantity::new(0).unwrap_err(), PlaceOrderError::InvalidQuantity);
        assert_eq!(Quantity::new(-3).unwrap_err(), PlaceOrderError::InvalidQuantity);
        assert_eq!(Quantity::new(1).unwrap().get(), 1);
    }

    #[test]
    fn total_is_unit_price_times_quantity() {
        let total = placement(3).total(money(4999, 2));
        assert_eq!(total, money(14997, 2));
    }

    #[test]
    fn only_transaction_errors_are_retryable() {
        assert!(PlaceOrderError::Transaction("io".into()).is_retryable());
        assert!(!PlaceOrderError::NoLinkedAccount.is_retryable());
        assert!(!PlaceOrderError::InsufficientStock { available: 2 }.is_retryable());
    }

    #[test]
    fn transaction_display_does_not_leak_detail() {
        let err = PlaceOrderError::Transaction("connection refused to 10.0.0.5".into());
        assert!(!err.to_string().contains("10.0.0.5"));
    }

    proptest! {
        #[test]
        fn non_positive_quantities_never_validate(raw in i64::MIN..=0i64) {
            prop_assert_eq!(Quantity::new(raw), Err(PlaceOrderError::InvalidQuantity));
        }

        #[test]
        fn positive_quantities_round_trip(raw in 1i64..=i64::from(u32::MAX)) {
            prop_assert_eq!(Quantity::new(raw).unwrap().as_i64(), raw);
        }

        #[test]
        fn totals_scale_linearly(unit_cents in 0i64..1_000_000i64, quantity in 1i64..10_000i64) {
            let unit = money(unit_cents, 2);
            let total = placement(quantity).total(unit);
            let expected = Decimal::new(unit_cents, 2) * Decimal::from(quantity);
            prop_assert_eq!(total.amount(), expected);
        }
    }
}

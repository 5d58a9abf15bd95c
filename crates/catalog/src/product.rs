use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use voltmart_core::{DomainError, DomainResult, Money, ProductId};

/// Customer star rating, 0.0 to 5.0 inclusive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rating(Decimal);

impl Rating {
    pub const ZERO: Rating = Rating(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ZERO || value > Decimal::from(5) {
            return Err(DomainError::validation(format!(
                "rating must be between 0.0 and 5.0, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl core::fmt::Display for Rating {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Entity: a product in the catalog.
///
/// Stock is the only field concurrently mutated by multiple callers; for
/// purchase-driven changes it is decremented exclusively by the order
/// placement workflow. Admin edits flow through [`ProductPatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    price: Money,
    stock: i64,
    rating: Rating,
    created_at: DateTime<Utc>,
}

impl Product {
    /// Assemble a product from its stored parts.
    ///
    /// Intended for the storage layer; the row constraints mirror the
    /// invariants enforced here (non-empty name, non-negative stock).
    pub fn from_parts(
        id: ProductId,
        name: String,
        price: Money,
        stock: i64,
        rating: Rating,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("product name must not be empty"));
        }
        if stock < 0 {
            return Err(DomainError::invariant("product stock must not be negative"));
        }
        Ok(Self {
            id,
            name,
            price,
            stock,
            rating,
            created_at,
        })
    }

    pub fn id(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn rating(&self) -> Rating {
        self.rating
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The `{price, stock}` view the placement workflow reads.
    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            price: self.price,
            stock: self.stock,
        }
    }

    /// Whether `quantity` units could currently be sold.
    pub fn has_stock_for(&self, quantity: u32) -> bool {
        self.stock >= i64::from(quantity)
    }

    /// Remove `quantity` units from stock.
    ///
    /// Callers must have checked sufficiency first; an insufficient deduct
    /// here is an invariant violation, not a user-facing condition.
    pub fn deduct_stock(&mut self, quantity: u32) -> DomainResult<()> {
        let quantity = i64::from(quantity);
        if self.stock < quantity {
            return Err(DomainError::invariant(format!(
                "cannot deduct {quantity} from stock of {}",
                self.stock
            )));
        }
        self.stock -= quantity;
        Ok(())
    }

    /// Apply an admin edit. The patch is validated on construction, so this
    /// only moves values.
    pub fn apply(&mut self, patch: &ProductPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(stock) = patch.stock {
            self.stock = stock;
        }
        if let Some(rating) = patch.rating {
            self.rating = rating;
        }
    }
}

/// The `{price, stock}` pair observed at the start of a placement
/// transaction. The price read here is authoritative for that transaction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub price: Money,
    pub stock: i64,
}

/// Command: create a product (admin).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    name: String,
    price: Money,
    stock: i64,
    rating: Rating,
}

impl NewProduct {
    pub fn new(
        name: impl Into<String>,
        price: Money,
        stock: i64,
        rating: Rating,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("product name must not be empty"));
        }
        if stock < 0 {
            return Err(DomainError::validation("initial stock must not be negative"));
        }
        Ok(Self {
            name,
            price,
            stock,
            rating,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn rating(&self) -> Rating {
        self.rating
    }
}

/// Command: partial admin edit of a product.
///
/// Absent fields keep their current value. Setters validate, so a
/// constructed patch is always applicable.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub price: Option<Money>,
    pub stock: Option<i64>,
    pub rating: Option<Rating>,
}

impl ProductPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(mut self, name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("product name must not be empty"));
        }
        self.name = Some(name);
        Ok(self)
    }

    pub fn reprice(mut self, price: Money) -> Self {
        self.price = Some(price);
        self
    }

    pub fn restock(mut self, stock: i64) -> DomainResult<Self> {
        if stock < 0 {
            return Err(DomainError::validation("stock must not be negative"));
        }
        self.stock = Some(stock);
        Ok(self)
    }

    pub fn rate(mut self, rating: Rating) -> Self {
        self.rating = Some(rating);
        self
    }

    /// A patch with no fields set is a caller error; storage rejects it.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.price.is_none()
            && self.stock.is_none()
            && self.rating.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(mantissa: i64, scale: u32) -> Money {
        Money::new(Decimal::new(mantissa, scale)).unwrap()
    }

    fn test_product() -> Product {
        Product::from_parts(
            ProductId::new(1),
            "USB-C Dock".to_string(),
            money(7999, 2),
            10,
            Rating::new(Decimal::new(45, 1)).unwrap(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn rating_bounds_are_enforced() {
        assert!(Rating::new(Decimal::ZERO).is_ok());
        assert!(Rating::new(Decimal::from(5)).is_ok());
        assert!(Rating::new(Decimal::new(51, 1)).is_err());
        assert!(Rating::new(Decimal::new(-1, 1)).is_err());
    }

    #[test]
    fn new_product_rejects_blank_name_and_negative_stock() {
        assert!(NewProduct::new("  ", money(100, 2), 1, Rating::ZERO).is_err());
        assert!(NewProduct::new("Cable", money(100, 2), -1, Rating::ZERO).is_err());
        assert!(NewProduct::new("Cable", money(100, 2), 0, Rating::ZERO).is_ok());
    }

    #[test]
    fn deduct_stock_decrements_and_guards() {
        let mut product = test_product();
        product.deduct_stock(3).unwrap();
        assert_eq!(product.stock(), 7);

        let err = product.deduct_stock(8).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(product.stock(), 7);
    }

    #[test]
    fn has_stock_for_matches_boundary() {
        let product = test_product();
        assert!(product.has_stock_for(10));
        assert!(!product.has_stock_for(11));
    }

    #[test]
    fn patch_applies_only_set_fields() {
        let mut product = test_product();
        let patch = ProductPatch::new()
            .reprice(money(8999, 2))
            .restock(25)
            .unwrap();
        product.apply(&patch);

        assert_eq!(product.price(), money(8999, 2));
        assert_eq!(product.stock(), 25);
        assert_eq!(product.name(), "USB-C Dock");
    }

    #[test]
    fn empty_patch_is_detectable() {
        assert!(ProductPatch::new().is_empty());
        assert!(!ProductPatch::new().reprice(money(1, 0)).is_empty());
    }

    #[test]
    fn patch_setters_validate() {
        assert!(ProductPatch::new().rename("").is_err());
        assert!(ProductPatch::new().restock(-5).is_err());
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use voltmart_core::{CustomerId, Money, OrderId, ProductId};

/// A durable order record.
///
/// Orders are append-only history: created exactly once by the placement
/// workflow and never mutated or deleted afterwards. They reference the
/// customer and product that existed at creation time and must survive the
/// later removal of either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    /// Units purchased; always positive.
    pub quantity: i64,
    /// Date of placement (date-only granularity, no time of day).
    pub ordered_on: NaiveDate,
    /// Unit price at placement time × quantity.
    pub total: Money,
}

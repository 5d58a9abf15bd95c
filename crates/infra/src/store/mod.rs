//! Storage boundary for the storefront.
//!
//! [`StorefrontStore`] is the single trait the rest of the system talks to.
//! Implementations must provide transactional semantics for
//! [`StorefrontStore::place_order`]: every step of a placement commits
//! together or not at all.

use async_trait::async_trait;
use thiserror::Error;

use voltmart_catalog::{NewProduct, Product, ProductPatch, ProductSnapshot};
use voltmart_core::{CustomerId, IdentityId, OrderId, ProductId};
use voltmart_customers::{Customer, NewCustomer};
use voltmart_orders::{Order, OrderPlacement, OrderReceipt, PlaceOrderError};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Storage operation error for the CRUD surface.
///
/// These are **infrastructure errors** (missing rows, violated constraints,
/// backend failures) as opposed to domain errors. The placement workflow has
/// its own taxonomy ([`PlaceOrderError`]) because its failures are
/// user-facing; implementations map backend errors into it and log the
/// detail rather than surfacing it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed row does not exist.
    #[error("not found")]
    NotFound,

    /// A data constraint was violated (duplicate identity link, empty
    /// update, value out of range).
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// The operation conflicts with existing state (e.g. deleting a product
    /// that order history still references).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend failed (connectivity, transaction error, corrupt row).
    #[error("storage failure in {operation}: {detail}")]
    Storage {
        operation: &'static str,
        detail: String,
    },
}

impl StoreError {
    pub fn storage(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            detail: detail.into(),
        }
    }
}

/// Transactional storefront storage.
///
/// ## Placement semantics
///
/// `place_order` executes the whole workflow — product lookup, stock
/// sufficiency check, total computation, order id assignment, order insert,
/// conditional stock decrement — as **one atomic unit**. On any failure
/// nothing persists: no order row, no stock change. Implementations must
/// make the decrement conditional on remaining stock so that two concurrent
/// placements can never jointly oversell a product, and must assign order
/// ids that are unique and strictly increasing.
///
/// `place_order` never retries internally and accepts no idempotency token:
/// two identical calls place two distinct orders and decrement stock twice.
///
/// ## Reads
///
/// Every placement re-reads current price and stock inside its own
/// transaction; implementations must not cache either across placements.
#[async_trait]
pub trait StorefrontStore: Send + Sync {
    // -- catalog ---------------------------------------------------------

    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    /// Apply a partial admin edit. Fails `Constraint` on an empty patch and
    /// `NotFound` if the product does not exist.
    async fn update_product(
        &self,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, StoreError>;

    /// Delete a product. Fails `Conflict` while any order references it:
    /// order history is append-only and must survive catalog changes.
    async fn delete_product(&self, id: ProductId) -> Result<(), StoreError>;

    /// The inventory ledger read: current `{price, stock}` for a product.
    async fn product_snapshot(
        &self,
        id: ProductId,
    ) -> Result<Option<ProductSnapshot>, StoreError>;

    // -- customers -------------------------------------------------------

    /// Register a customer. A duplicate identity link fails `Constraint`
    /// (each identity links to at most one customer).
    async fn register_customer(&self, new: NewCustomer) -> Result<Customer, StoreError>;

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError>;

    /// Resolve an authenticated identity to its customer record, if any.
    /// The session layer uses this to build a `CustomerIdentity`.
    async fn customer_for_identity(
        &self,
        identity: IdentityId,
    ) -> Result<Option<Customer>, StoreError>;

    // -- orders ----------------------------------------------------------

    /// Execute a validated placement atomically. See the trait docs.
    async fn place_order(
        &self,
        placement: &OrderPlacement,
    ) -> Result<OrderReceipt, PlaceOrderError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// A customer's order history, newest first.
    async fn orders_for_customer(
        &self,
        customer: CustomerId,
    ) -> Result<Vec<Order>, StoreError>;
}

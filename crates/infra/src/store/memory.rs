//! In-memory storefront store.
//!
//! Intended for tests/dev. One mutex guards all tables, so every operation
//! — placement included — is atomic by construction. Placement mutations
//! are applied only after every fallible step has passed, which is what
//! keeps a failed placement free of partial effects.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use voltmart_catalog::{NewProduct, Product, ProductPatch, ProductSnapshot};
use voltmart_core::{CustomerId, IdentityId, OrderId, ProductId};
use voltmart_customers::{Customer, NewCustomer};
use voltmart_orders::{Order, OrderPlacement, OrderReceipt, PlaceOrderError};

use super::{StoreError, StorefrontStore};

#[derive(Debug, Default)]
struct State {
    products: BTreeMap<i64, Product>,
    customers: BTreeMap<i64, Customer>,
    orders: BTreeMap<i64, Order>,
    next_product_id: i64,
    next_customer_id: i64,
    next_order_id: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    fail_next_placement: AtomicBool,
}

/// In-memory storefront store.
///
/// Cheap to clone; all clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: make the next placement fail as if the backend errored
    /// mid-transaction — after the order row was written, before the stock
    /// decrement. The placement must leave no trace: no order row, no
    /// stock change.
    pub fn fail_next_placement(&self) {
        self.inner.fail_next_placement.store(true, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.inner
            .state
            .lock()
            .map_err(|_| StoreError::storage("lock", "state lock poisoned"))
    }
}

#[async_trait]
impl StorefrontStore for MemoryStore {
    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        let mut state = self.lock()?;
        let id = next_id(&mut state.next_product_id);
        let product = Product::from_parts(
            ProductId::new(id),
            new.name().to_string(),
            new.price(),
            new.stock(),
            new.rating(),
            Utc::now(),
        )
        .map_err(|e| StoreError::Constraint(e.to_string()))?;
        state.products.insert(id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.lock()?.products.get(&id.as_i64()).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.lock()?.products.values().cloned().collect())
    }

    async fn update_product(
        &self,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, StoreError> {
        if patch.is_empty() {
            return Err(StoreError::Constraint(
                "update must change at least one field".to_string(),
            ));
        }
        let mut state = self.lock()?;
        let product = state
            .products
            .get_mut(&id.as_i64())
            .ok_or(StoreError::NotFound)?;
        product.apply(&patch);
        Ok(product.clone())
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let refs = state
            .orders
            .values()
            .filter(|order| order.product_id == id)
            .count();
        if refs > 0 {
            return Err(StoreError::Conflict(format!(
                "product {id} is referenced by {refs} order(s)"
            )));
        }
        match state.products.remove(&id.as_i64()) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn product_snapshot(
        &self,
        id: ProductId,
    ) -> Result<Option<ProductSnapshot>, StoreError> {
        Ok(self
            .lock()?
            .products
            .get(&id.as_i64())
            .map(|product| product.snapshot()))
    }

    async fn register_customer(&self, new: NewCustomer) -> Result<Customer, StoreError> {
        let mut state = self.lock()?;
        if let Some(identity) = new.identity() {
            let taken = state
                .customers
                .values()
                .any(|customer| customer.identity() == Some(identity));
            if taken {
                return Err(StoreError::Constraint(format!(
                    "identity {identity} is already linked to a customer"
                )));
            }
        }
        let id = next_id(&mut state.next_customer_id);
        let customer = Customer::from_parts(
            CustomerId::new(id),
            new.name().to_string(),
            new.address().map(str::to_string),
            new.phone().map(str::to_string),
            new.identity(),
        )
        .map_err(|e| StoreError::Constraint(e.to_string()))?;
        state.customers.insert(id, customer.clone());
        Ok(customer)
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.lock()?.customers.get(&id.as_i64()).cloned())
    }

    async fn customer_for_identity(
        &self,
        identity: IdentityId,
    ) -> Result<Option<Customer>, StoreError> {
        Ok(self
            .lock()?
            .customers
            .values()
            .find(|customer| customer.identity() == Some(identity))
            .cloned())
    }

    async fn place_order(
        &self,
        placement: &OrderPlacement,
    ) -> Result<OrderReceipt, PlaceOrderError> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| PlaceOrderError::Transaction("state lock poisoned".to_string()))?;

        // Same observation order as the Postgres transaction: product terms
        // first, then sufficiency, then the referential check that Postgres
        // enforces via the orders foreign key.
        let (price, available) = match state.products.get(&placement.product_id.as_i64()) {
            Some(product) => (product.price(), product.stock()),
            None => return Err(PlaceOrderError::ProductNotFound),
        };
        if available < placement.quantity.as_i64() {
            return Err(PlaceOrderError::InsufficientStock { available });
        }
        if !state
            .customers
            .contains_key(&placement.customer_id.as_i64())
        {
            tracing::error!(
                customer_id = %placement.customer_id,
                "order placement referenced a missing customer"
            );
            return Err(PlaceOrderError::Transaction(format!(
                "insert_order: customer {} does not exist",
                placement.customer_id
            )));
        }

        let total = placement.total(price);
        let order_id = state.next_order_id + 1;
        let order = Order {
            id: OrderId::new(order_id),
            customer_id: placement.customer_id,
            product_id: placement.product_id,
            quantity: placement.quantity.as_i64(),
            ordered_on: placement.ordered_on,
            total,
        };

        if self.inner.fail_next_placement.swap(false, Ordering::SeqCst) {
            // Nothing has been applied yet, so the staged order and the
            // pending decrement both vanish — exactly the rollback a real
            // backend performs.
            return Err(PlaceOrderError::Transaction(
                "injected failure between order insert and stock decrement".to_string(),
            ));
        }

        // All fallible steps have passed; apply both mutations together.
        match state.products.get_mut(&placement.product_id.as_i64()) {
            Some(product) => product
                .deduct_stock(placement.quantity.get())
                .map_err(|e| PlaceOrderError::Transaction(e.to_string()))?,
            None => {
                return Err(PlaceOrderError::Transaction(
                    "product row vanished mid-placement".to_string(),
                ));
            }
        }
        state.orders.insert(order_id, order);
        state.next_order_id = order_id;

        Ok(OrderReceipt {
            order_id: OrderId::new(order_id),
            total,
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.lock()?.orders.get(&id.as_i64()).cloned())
    }

    async fn orders_for_customer(
        &self,
        customer: CustomerId,
    ) -> Result<Vec<Order>, StoreError> {
        let state = self.lock()?;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| order.customer_id == customer)
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.ordered_on
                .cmp(&a.ordered_on)
                .then(b.id.cmp(&a.id))
        });
        Ok(orders)
    }
}

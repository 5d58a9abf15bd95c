//! Postgres-backed storefront store.
//!
//! ## Schema
//!
//! The store expects the following layout (managed by the deployment, not
//! by this crate):
//!
//! ```sql
//! CREATE TABLE products (
//!     product_id  BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
//!     name        TEXT NOT NULL,
//!     price       NUMERIC(15, 2) NOT NULL CHECK (price >= 0),
//!     stock       BIGINT NOT NULL DEFAULT 0 CHECK (stock >= 0),
//!     rating      NUMERIC(3, 1) NOT NULL DEFAULT 0 CHECK (rating >= 0 AND rating <= 5),
//!     created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//!
//! CREATE TABLE customers (
//!     customer_id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
//!     name        TEXT NOT NULL,
//!     address     TEXT,
//!     phone       TEXT,
//!     identity_id BIGINT UNIQUE
//! );
//!
//! CREATE TABLE orders (
//!     order_id    BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
//!     customer_id BIGINT NOT NULL REFERENCES customers (customer_id) ON DELETE NO ACTION,
//!     product_id  BIGINT NOT NULL REFERENCES products (product_id) ON DELETE NO ACTION,
//!     quantity    BIGINT NOT NULL CHECK (quantity > 0),
//!     ordered_on  DATE NOT NULL,
//!     total       NUMERIC(15, 2) NOT NULL CHECK (total >= 0)
//! );
//! ```
//!
//! `orders.order_id` being an identity column is what makes the order
//! sequencer race-free: assignment happens inside the insert, so two
//! concurrent placements can never compute the same id. The foreign keys
//! use `ON DELETE NO ACTION` so order history is never cascade-deleted.
//!
//! ## Placement atomicity
//!
//! `place_order` runs one transaction: snapshot read → sufficiency check →
//! total → `INSERT ... RETURNING order_id` → conditional
//! `UPDATE ... SET stock = stock - $q ... WHERE stock >= $q`. The
//! conditional decrement reporting zero affected rows is the authoritative
//! insufficient-stock signal: it holds even when a concurrent transaction
//! consumed the stock between this transaction's check and its decrement,
//! so correctness does not depend on a stricter isolation level than
//! read-committed.
//!
//! ## Error mapping
//!
//! SQLx errors on the CRUD surface map to [`StoreError`]:
//!
//! | PostgreSQL error code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `23505` (unique)      | `Constraint` | duplicate identity link |
//! | `23503` (foreign key) | `Constraint` | dangling reference |
//! | `23514` (check)       | `Constraint` | value out of range |
//! | other                 | `Storage`    | connectivity, pool, decode |
//!
//! Inside `place_order` every backend error becomes
//! [`PlaceOrderError::Transaction`]; the detail is logged here and never
//! shown to callers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use voltmart_catalog::{NewProduct, Product, ProductPatch, ProductSnapshot, Rating};
use voltmart_core::{CustomerId, IdentityId, Money, OrderId, ProductId};
use voltmart_customers::{Customer, NewCustomer};
use voltmart_orders::{Order, OrderPlacement, OrderReceipt, PlaceOrderError};

use super::{StoreError, StorefrontStore};

/// Postgres-backed storefront store.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl StorefrontStore for PostgresStore {
    #[instrument(skip(self, new), fields(name = new.name()), err)]
    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (name, price, stock, rating)
            VALUES ($1, $2, $3, $4)
            RETURNING product_id, name, price, stock, rating, created_at
            "#,
        )
        .bind(new.name())
        .bind(new.price().amount())
        .bind(new.stock())
        .bind(new.rating().value())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_product", e))?;

        decode_product(&row)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT product_id, name, price, stock, rating, created_at
            FROM products
            WHERE product_id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?;

        row.as_ref().map(decode_product).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, name, price, stock, rating, created_at
            FROM products
            ORDER BY product_id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;

        rows.iter().map(decode_product).collect()
    }

    #[instrument(skip(self, patch), fields(product_id = %id), err)]
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

        // COALESCE keeps unset fields at their current value, so one
        // parameterized statement covers every patch shape.
        let row = sqlx::query(
            r#"
            UPDATE products
            SET name   = COALESCE($2::text, name),
                price  = COALESCE($3::numeric, price),
                stock  = COALESCE($4::bigint, stock),
                rating = COALESCE($5::numeric, rating)
            WHERE product_id = $1
            RETURNING product_id, name, price, stock, rating, created_at
            "#,
        )
        .bind(id.as_i64())
        .bind(patch.name.as_deref())
        .bind(patch.price.map(|p| p.amount()))
        .bind(patch.stock)
        .bind(patch.rating.map(|r| r.value()))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;

        match row {
            Some(row) => decode_product(&row),
            None => Err(StoreError::NotFound),
        }
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete_product(&self, id: ProductId) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;

        // Order history is append-only: refuse deletion while any order
        // still references this product.
        let row = sqlx::query("SELECT COUNT(*) AS refs FROM orders WHERE product_id = $1")
            .bind(id.as_i64())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        let refs: i64 = row
            .try_get("refs")
            .map_err(|e| StoreError::storage("delete_product", e.to_string()))?;
        if refs > 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("delete_product", e))?;
            return Err(StoreError::Conflict(format!(
                "product {id} is referenced by {refs} order(s)"
            )));
        }

        let result = sqlx::query("DELETE FROM products WHERE product_id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("delete_product", e))?;
            return Err(StoreError::NotFound);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn product_snapshot(
        &self,
        id: ProductId,
    ) -> Result<Option<ProductSnapshot>, StoreError> {
        let row = sqlx::query("SELECT price, stock FROM products WHERE product_id = $1")
            .bind(id.as_i64())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("product_snapshot", e))?;

        row.as_ref()
            .map(|row| decode_snapshot(row).map_err(|e| StoreError::storage("product_snapshot", e)))
            .transpose()
    }

    #[instrument(skip(self, new), fields(name = new.name()), err)]
    async fn register_customer(&self, new: NewCustomer) -> Result<Customer, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO customers (name, address, phone, identity_id)
            VALUES ($1, $2, $3, $4)
            RETURNING customer_id, name, address, phone, identity_id
            "#,
        )
        .bind(new.name())
        .bind(new.address())
        .bind(new.phone())
        .bind(new.identity().map(|i| i.as_i64()))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("register_customer", e))?;

        decode_customer(&row)
    }

    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT customer_id, name, address, phone, identity_id
            FROM customers
            WHERE customer_id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_customer", e))?;

        row.as_ref().map(decode_customer).transpose()
    }

    #[instrument(skip(self), fields(identity = %identity), err)]
    async fn customer_for_identity(
        &self,
        identity: IdentityId,
    ) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT customer_id, name, address, phone, identity_id
            FROM customers
            WHERE identity_id = $1
            "#,
        )
        .bind(identity.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("customer_for_identity", e))?;

        row.as_ref().map(decode_customer).transpose()
    }

    #[instrument(
        skip(self, placement),
        fields(
            customer_id = %placement.customer_id,
            product_id = %placement.product_id,
            quantity = %placement.quantity,
        ),
        err
    )]
    async fn place_order(
        &self,
        placement: &OrderPlacement,
    ) -> Result<OrderReceipt, PlaceOrderError> {
        let mut tx = self.pool.begin().await.map_err(|e| transaction_error("begin", e))?;

        // Step 1-2: read {price, stock} and check sufficiency. The price
        // observed here is authoritative for this transaction.
        let (price, stock) = match product_terms(&mut tx, placement.product_id).await {
            Ok(Some(terms)) => terms,
            Ok(None) => {
                rollback_quietly(tx).await;
                return Err(PlaceOrderError::ProductNotFound);
            }
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(transaction_error("read_product", e));
            }
        };
        if stock < placement.quantity.as_i64() {
            rollback_quietly(tx).await;
            return Err(PlaceOrderError::InsufficientStock { available: stock });
        }
        let price = match Money::new(price) {
            Ok(price) => price,
            Err(e) => {
                rollback_quietly(tx).await;
                tracing::error!(error = %e, "stored product price failed validation");
                return Err(PlaceOrderError::Transaction(format!(
                    "read_product: {e}"
                )));
            }
        };

        // Step 3-6: compute the total and insert the order. The identity
        // column assigns the order id inside the insert itself.
        let total = placement.total(price);
        let order_id = match insert_order(&mut tx, placement, total).await {
            Ok(order_id) => order_id,
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(transaction_error("insert_order", e));
            }
        };

        // Step 7: conditional decrement. Zero rows affected means a
        // concurrent placement consumed the stock after our check; the
        // whole transaction (order insert included) is rolled back.
        match decrement_stock(&mut tx, placement.product_id, placement.quantity.as_i64()).await {
            Ok(0) => {
                let available = available_stock(&mut tx, placement.product_id)
                    .await
                    .unwrap_or(0);
                rollback_quietly(tx).await;
                return Err(PlaceOrderError::InsufficientStock { available });
            }
            Ok(_) => {}
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(transaction_error("decrement_stock", e));
            }
        }

        // Step 8: commit. Both the order row and the decrement land, or
        // neither does.
        tx.commit()
            .await
            .map_err(|e| transaction_error("commit", e))?;

        Ok(OrderReceipt { order_id, total })
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT order_id, customer_id, product_id, quantity, ordered_on, total
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_order", e))?;

        row.as_ref().map(decode_order).transpose()
    }

    #[instrument(skip(self), fields(customer_id = %customer), err)]
    async fn orders_for_customer(
        &self,
        customer: CustomerId,
    ) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, customer_id, product_id, quantity, ordered_on, total
            FROM orders
            WHERE customer_id = $1
            ORDER BY ordered_on DESC, order_id DESC
            "#,
        )
        .bind(customer.as_i64())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("orders_for_customer", e))?;

        rows.iter().map(decode_order).collect()
    }
}

// Transaction-scoped placement helpers.

async fn product_terms(
    tx: &mut Transaction<'_, Postgres>,
    id: ProductId,
) -> Result<Option<(Decimal, i64)>, sqlx::Error> {
    let row = sqlx::query("SELECT price, stock FROM products WHERE product_id = $1")
        .bind(id.as_i64())
        .fetch_optional(&mut **tx)
        .await?;

    match row {
        Some(row) => {
            let price: Decimal = row.try_get("price")?;
            let stock: i64 = row.try_get("stock")?;
            Ok(Some((price, stock)))
        }
        None => Ok(None),
    }
}

async fn insert_order(
    tx: &mut Transaction<'_, Postgres>,
    placement: &OrderPlacement,
    total: Money,
) -> Result<OrderId, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO orders (customer_id, product_id, quantity, ordered_on, total)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING order_id
        "#,
    )
    .bind(placement.customer_id.as_i64())
    .bind(placement.product_id.as_i64())
    .bind(placement.quantity.as_i64())
    .bind(placement.ordered_on)
    .bind(total.amount())
    .fetch_one(&mut **tx)
    .await?;

    let order_id: i64 = row.try_get("order_id")?;
    Ok(OrderId::new(order_id))
}

async fn decrement_stock(
    tx: &mut Transaction<'_, Postgres>,
    id: ProductId,
    quantity: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE products
        SET stock = stock - $2
        WHERE product_id = $1 AND stock >= $2
        "#,
    )
    .bind(id.as_i64())
    .bind(quantity)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

async fn available_stock(
    tx: &mut Transaction<'_, Postgres>,
    id: ProductId,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT stock FROM products WHERE product_id = $1")
        .bind(id.as_i64())
        .fetch_one(&mut **tx)
        .await?;
    row.try_get("stock")
}

/// Roll back a failed placement transaction. A rollback failure is logged
/// and otherwise ignored: the original error is the one the caller needs,
/// and an unfinished transaction is rolled back by the server anyway.
async fn rollback_quietly(tx: Transaction<'_, Postgres>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "placement rollback failed");
    }
}

/// Log a backend failure and surface it as a generic transaction error.
fn transaction_error(operation: &'static str, err: sqlx::Error) -> PlaceOrderError {
    tracing::error!(operation, error = %err, "order placement transaction failed");
    PlaceOrderError::Transaction(format!("{operation}: {err}"))
}

/// Map SQLx errors on the CRUD surface to [`StoreError`].
fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = db_err.message().to_string();
            match db_err.code().as_deref() {
                // 23505 unique, 23503 foreign key, 23514 check
                Some("23505") | Some("23503") | Some("23514") => StoreError::Constraint(msg),
                _ => StoreError::Storage {
                    operation,
                    detail: msg,
                },
            }
        }
        sqlx::Error::PoolClosed => StoreError::storage(operation, "connection pool closed"),
        other => StoreError::storage(operation, other.to_string()),
    }
}

// SQLx row decoding.

#[derive(Debug)]
struct ProductRow {
    product_id: i64,
    name: String,
    price: Decimal,
    stock: i64,
    rating: Decimal,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for ProductRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            product_id: row.try_get("product_id")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
            stock: row.try_get("stock")?,
            rating: row.try_get("rating")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn decode_product(row: &sqlx::postgres::PgRow) -> Result<Product, StoreError> {
    let row = ProductRow::from_row(row)
        .map_err(|e| StoreError::storage("decode_product", e.to_string()))?;
    let price = Money::new(row.price)
        .map_err(|e| StoreError::storage("decode_product", e.to_string()))?;
    let rating = Rating::new(row.rating)
        .map_err(|e| StoreError::storage("decode_product", e.to_string()))?;
    Product::from_parts(
        ProductId::new(row.product_id),
        row.name,
        price,
        row.stock,
        rating,
        row.created_at,
    )
    .map_err(|e| StoreError::storage("decode_product", e.to_string()))
}

fn decode_snapshot(row: &sqlx::postgres::PgRow) -> Result<ProductSnapshot, String> {
    let price: Decimal = row.try_get("price").map_err(|e| e.to_string())?;
    let stock: i64 = row.try_get("stock").map_err(|e| e.to_string())?;
    let price = Money::new(price).map_err(|e| e.to_string())?;
    Ok(ProductSnapshot { price, stock })
}

fn decode_customer(row: &sqlx::postgres::PgRow) -> Result<Customer, StoreError> {
    let customer_id: i64 = row
        .try_get("customer_id")
        .map_err(|e| StoreError::storage("decode_customer", e.to_string()))?;
    let name: String = row
        .try_get("name")
        .map_err(|e| StoreError::storage("decode_customer", e.to_string()))?;
    let address: Option<String> = row
        .try_get("address")
        .map_err(|e| StoreError::storage("decode_customer", e.to_string()))?;
    let phone: Option<String> = row
        .try_get("phone")
        .map_err(|e| StoreError::storage("decode_customer", e.to_string()))?;
    let identity: Option<i64> = row
        .try_get("identity_id")
        .map_err(|e| StoreError::storage("decode_customer", e.to_string()))?;

    Customer::from_parts(
        CustomerId::new(customer_id),
        name,
        address,
        phone,
        identity.map(IdentityId::new),
    )
    .map_err(|e| StoreError::storage("decode_customer", e.to_string()))
}

fn decode_order(row: &sqlx::postgres::PgRow) -> Result<Order, StoreError> {
    let order_id: i64 = row
        .try_get("order_id")
        .map_err(|e| StoreError::storage("decode_order", e.to_string()))?;
    let customer_id: i64 = row
        .try_get("customer_id")
        .map_err(|e| StoreError::storage("decode_order", e.to_string()))?;
    let product_id: i64 = row
        .try_get("product_id")
        .map_err(|e| StoreError::storage("decode_order", e.to_string()))?;
    let quantity: i64 = row
        .try_get("quantity")
        .map_err(|e| StoreError::storage("decode_order", e.to_string()))?;
    let ordered_on: NaiveDate = row
        .try_get("ordered_on")
        .map_err(|e| StoreError::storage("decode_order", e.to_string()))?;
    let total: Decimal = row
        .try_get("total")
        .map_err(|e| StoreError::storage("decode_order", e.to_string()))?;
    let total = Money::new(total)
        .map_err(|e| StoreError::storage("decode_order", e.to_string()))?;

    Ok(Order {
        id: OrderId::new(order_id),
        customer_id: CustomerId::new(customer_id),
        product_id: ProductId::new(product_id),
        quantity,
        ordered_on,
        total,
    })
}

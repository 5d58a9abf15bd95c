//! The order placement workflow.
//!
//! [`Checkout`] is the application-level entry point a request layer calls
//! once it has verified the caller and resolved their identity. The service
//! validates what can be validated without storage (the customer link, the
//! quantity), stamps the order date, and hands the placement to the store,
//! which executes it as one atomic transaction.
//!
//! ## Failure semantics
//!
//! Every error leaves state untouched. There are no internal retries and no
//! idempotency token: submitting the same request twice places two distinct
//! orders and decrements stock twice. Callers that retry
//! [`PlaceOrderError::Transaction`] failures must accept that a retry after
//! an ambiguous failure can double-order.

use chrono::Utc;
use tracing::instrument;

use voltmart_core::ProductId;
use voltmart_customers::CustomerIdentity;
use voltmart_orders::{OrderPlacement, OrderReceipt, PlaceOrderError, Quantity};

use crate::store::StorefrontStore;

/// Order placement service over any [`StorefrontStore`].
#[derive(Debug, Clone)]
pub struct Checkout<S> {
    store: S,
}

impl<S> Checkout<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: StorefrontStore> Checkout<S> {
    /// Place an order for `quantity` units of `product_id` on behalf of the
    /// customer linked to `identity`.
    ///
    /// The identity link is checked before anything else — an identity with
    /// no customer record fails [`PlaceOrderError::NoLinkedAccount`] without
    /// touching storage. The caller guarantees the identity was verified;
    /// no token handling happens here.
    #[instrument(
        skip(self, identity),
        fields(identity = %identity.identity(), product_id = %product_id, quantity),
        err
    )]
    pub async fn place_order(
        &self,
        identity: &CustomerIdentity,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<OrderReceipt, PlaceOrderError> {
        let customer_id = identity
            .customer()
            .ok_or(PlaceOrderError::NoLinkedAccount)?;
        let quantity = Quantity::new(quantity)?;

        let placement = OrderPlacement {
            customer_id,
            product_id,
            quantity,
            // Date-only granularity; no time of day is recorded.
            ordered_on: Utc::now().date_naive(),
        };

        let receipt = self.store.place_order(&placement).await?;
        tracing::info!(order_id = %receipt.order_id, total = %receipt.total, "order placed");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    use voltmart_catalog::{NewProduct, ProductPatch, Rating};
    use voltmart_core::{IdentityId, Money};
    use voltmart_customers::NewCustomer;

    use crate::store::MemoryStore;

    fn money(mantissa: i64, scale: u32) -> Money {
        Money::new(Decimal::new(mantissa, scale)).unwrap()
    }

    struct Fixture {
        checkout: Checkout<MemoryStore>,
        store: MemoryStore,
        product: ProductId,
        shopper: CustomerIdentity,
    }

    /// One product with the given stock, one registered customer with a
    /// linked identity.
    async fn fixture(stock: i64) -> Fixture {
        let store = MemoryStore::new();
        let product = store
            .create_product(
                NewProduct::new("Noise-Cancelling Headphones", money(19900, 2), stock, Rating::ZERO)
                    .unwrap(),
            )
            .await
            .unwrap();
        let customer = store
            .register_customer(
                NewCustomer::new("Lan Pham", None, None, Some(IdentityId::new(1))).unwrap(),
            )
            .await
            .unwrap();
        Fixture {
            checkout: Checkout::new(store.clone()),
            store,
            product: product.id(),
            shopper: CustomerIdentity::linked(IdentityId::new(1), customer.id()),
        }
    }

    #[tokio::test]
    async fn placing_within_stock_succeeds_and_decrements() {
        let f = fixture(5).await;
        let receipt = f
            .checkout
            .place_order(&f.shopper, f.product, 3)
            .await
            .unwrap();

        assert_eq!(receipt.total, money(59700, 2)); // 199.00 × 3

        let snapshot = f.store.product_snapshot(f.product).await.unwrap().unwrap();
        assert_eq!(snapshot.stock, 2);

        let order = f
            .store
            .get_order(receipt.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.quantity, 3);
        assert_eq!(order.total, receipt.total);
        assert_eq!(order.ordered_on, Utc::now().date_naive());
    }

    #[tokio::test]
    async fn insufficient_stock_reports_availability_and_changes_nothing() {
        let f = fixture(2).await;
        let err = f
            .checkout
            .place_order(&f.shopper, f.product, 3)
            .await
            .unwrap_err();
        assert_eq!(err, PlaceOrderError::InsufficientStock { available: 2 });

        let snapshot = f.store.product_snapshot(f.product).await.unwrap().unwrap();
        assert_eq!(snapshot.stock, 2);
        let customer = f.shopper.customer().unwrap();
        assert!(f.store.orders_for_customer(customer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_product_fails_without_state_change() {
        let f = fixture(5).await;
        let err = f
            .checkout
            .place_order(&f.shopper, ProductId::new(9999), 1)
            .await
            .unwrap_err();
        assert_eq!(err, PlaceOrderError::ProductNotFound);

        let customer = f.shopper.customer().unwrap();
        assert!(f.store.orders_for_customer(customer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unlinked_identity_fails_before_any_lookup() {
        let f = fixture(5).await;
        let stranger = CustomerIdentity::unlinked(IdentityId::new(77));

        // Even a nonexistent product reports the missing link, showing the
        // account check happens before the product lookup.
        let err = f
            .checkout
            .place_order(&stranger, ProductId::new(9999), 1)
            .await
            .unwrap_err();
        assert_eq!(err, PlaceOrderError::NoLinkedAccount);
    }

    #[tokio::test]
    async fn non_positive_quantities_are_rejected() {
        let f = fixture(5).await;
        for quantity in [0, -1, -100] {
            let err = f
                .checkout
                .place_order(&f.shopper, f.product, quantity)
                .await
                .unwrap_err();
            assert_eq!(err, PlaceOrderError::InvalidQuantity);
        }
        let snapshot = f.store.product_snapshot(f.product).await.unwrap().unwrap();
        assert_eq!(snapshot.stock, 5);
    }

    #[tokio::test]
    async fn identical_requests_place_two_distinct_orders() {
        // Pinned behavior: there is no idempotency key, so a duplicate
        // submission double-orders and double-decrements.
        let f = fixture(10).await;
        let first = f
            .checkout
            .place_order(&f.shopper, f.product, 2)
            .await
            .unwrap();
        let second = f
            .checkout
            .place_order(&f.shopper, f.product, 2)
            .await
            .unwrap();

        assert_ne!(first.order_id, second.order_id);
        assert!(second.order_id > first.order_id);

        let snapshot = f.store.product_snapshot(f.product).await.unwrap().unwrap();
        assert_eq!(snapshot.stock, 6);
    }

    #[tokio::test]
    async fn total_uses_the_price_observed_at_placement() {
        let f = fixture(10).await;
        let before = f
            .checkout
            .place_order(&f.shopper, f.product, 1)
            .await
            .unwrap();
        assert_eq!(before.total, money(19900, 2));

        let patch = ProductPatch::new().reprice(money(25000, 2));
        f.store.update_product(f.product, patch).await.unwrap();

        // The earlier order keeps its historical total.
        let order = f.store.get_order(before.order_id).await.unwrap().unwrap();
        assert_eq!(order.total, money(19900, 2));

        // A new placement sees the new price.
        let after = f
            .checkout
            .place_order(&f.shopper, f.product, 1)
            .await
            .unwrap();
        assert_eq!(after.total, money(25000, 2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_placements_cannot_oversell() {
        // stock = 5, two concurrent requests for 3 each: exactly one can win.
        let f = fixture(5).await;

        let a = {
            let checkout = f.checkout.clone();
            let shopper = f.shopper;
            let product = f.product;
            tokio::spawn(async move { checkout.place_order(&shopper, product, 3).await })
        };
        let b = {
            let checkout = f.checkout.clone();
            let shopper = f.shopper;
            let product = f.product;
            tokio::spawn(async move { checkout.place_order(&shopper, product, 3).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        let loss = results
            .iter()
            .find_map(|r| r.as_ref().err())
            .expect("one placement must lose");
        assert_eq!(*loss, PlaceOrderError::InsufficientStock { available: 2 });

        let snapshot = f.store.product_snapshot(f.product).await.unwrap().unwrap();
        assert_eq!(snapshot.stock, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn successful_quantities_never_exceed_initial_stock() {
        let initial_stock = 12i64;
        let f = fixture(initial_stock).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let checkout = f.checkout.clone();
            let shopper = f.shopper;
            let product = f.product;
            handles.push(tokio::spawn(async move {
                checkout.place_order(&shopper, product, 1).await
            }));
        }

        let mut placed = 0i64;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                placed += 1;
            }
        }

        assert!(placed <= initial_stock);
        assert_eq!(placed, initial_stock); // enough demand to drain it fully

        let snapshot = f.store.product_snapshot(f.product).await.unwrap().unwrap();
        assert_eq!(snapshot.stock, 0);
    }
}

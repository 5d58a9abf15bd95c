use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use rust_decimal::Decimal;
use tokio::runtime::Runtime;

use voltmart_catalog::{NewProduct, Rating};
use voltmart_core::{IdentityId, Money, ProductId};
use voltmart_customers::{CustomerIdentity, NewCustomer};
use voltmart_infra::{Checkout, MemoryStore, StorefrontStore};

fn money(mantissa: i64, scale: u32) -> Money {
    Money::new(Decimal::new(mantissa, scale)).unwrap()
}

fn setup(rt: &Runtime, stock: i64) -> (Checkout<MemoryStore>, CustomerIdentity, ProductId) {
    rt.block_on(async {
        let store = MemoryStore::new();
        let product = store
            .create_product(NewProduct::new("Bench Widget", money(999, 2), stock, Rating::ZERO).unwrap())
            .await
            .unwrap();
        let customer = store
            .register_customer(NewCustomer::new("Bench Shopper", None, None, Some(IdentityId::new(1))).unwrap())
            .await
            .unwrap();
        (
            Checkout::new(store),
            CustomerIdentity::linked(IdentityId::new(1), customer.id()),
            product.id(),
        )
    })
}

fn bench_placement(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("order_placement");
    group.throughput(Throughput::Elements(1));

    group.bench_function("place_order_memory", |b| {
        // Enough stock that the bench never runs dry.
        let (checkout, shopper, product) = setup(&rt, i64::MAX / 2);
        b.iter(|| {
            rt.block_on(async {
                checkout
                    .place_order(black_box(&shopper), black_box(product), black_box(1))
                    .await
                    .unwrap()
            })
        });
    });

    group.bench_function("place_order_insufficient_stock", |b| {
        let (checkout, shopper, product) = setup(&rt, 0);
        b.iter(|| {
            rt.block_on(async {
                checkout
                    .place_order(black_box(&shopper), black_box(product), black_box(1))
                    .await
                    .unwrap_err()
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_placement);
criterion_main!(benches);

use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    CartItem, CartTotals, Checkout, CustomerId, InventoryRecord, Money, StockStatus,
};

fn cart_items(n: u32) -> Vec<CartItem> {
    (0..n)
        .map(|i| {
            CartItem::new(
                format!("SKU-{i:03}"),
                "W1",
                format!("Product {i}"),
                (i % 5) + 1,
                Money::from_cents(500 + i as i64 * 25),
            )
        })
        .collect()
}

fn bench_totals_compute(c: &mut Criterion) {
    let items = cart_items(20);

    c.bench_function("domain/cart_totals_compute_20_items", |b| {
        b.iter(|| {
            let totals = CartTotals::compute(
                &items,
                Money::from_cents(450),
                Money::from_cents(500),
                Money::from_cents(100),
            );
            assert!(totals.is_consistent());
        });
    });
}

fn bench_status_derivation(c: &mut Criterion) {
    c.bench_function("domain/stock_status_derive", |b| {
        b.iter(|| {
            for available in 0..100 {
                let _ = StockStatus::derive(available, 10, StockStatus::InStock);
            }
        });
    });
}

fn bench_inventory_reserve_release(c: &mut Criterion) {
    c.bench_function("domain/inventory_reserve_release", |b| {
        b.iter(|| {
            let mut record = InventoryRecord::new("SKU-001", "W1", 1_000, 10);
            for _ in 0..100 {
                record.reserve(5).unwrap();
                record.release(5).unwrap();
            }
            assert!(record.invariant_holds());
        });
    });
}

fn bench_checkout_lifecycle(c: &mut Criterion) {
    let items = cart_items(5);
    let totals = CartTotals::compute(&items, Money::zero(), Money::zero(), Money::zero());

    c.bench_function("domain/checkout_lifecycle", |b| {
        b.iter(|| {
            let mut checkout = Checkout::initiate(
                common::RecordId::new(),
                common::IdempotencyKey::new("bench"),
                CustomerId::new(),
                items.clone(),
                totals,
                None,
            )
            .unwrap();
            checkout.begin_payment("PI-bench").unwrap();
            checkout.start_processing().unwrap();
            checkout.complete().unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_totals_compute,
    bench_status_derivation,
    bench_inventory_reserve_release,
    bench_checkout_lifecycle
);
criterion_main!(benches);

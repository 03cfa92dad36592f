use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;

use anvilcrm_core::{OrderLineId, ProductId};
use anvilcrm_orders::{recompute_total, OrderLine};

fn lines(count: usize) -> Vec<OrderLine> {
    (0..count)
        .map(|i| OrderLine {
            id: OrderLineId::new(),
            product_id: ProductId::new(),
            quantity: (i % 9 + 1) as i32,
            unit_price: Decimal::new(99 + i as i64, 2),
        })
        .collect()
}

fn bench_recompute_total(c: &mut Criterion) {
    let mut group = c.benchmark_group("recompute_total");
    for count in [1usize, 10, 100, 1_000] {
        let input = lines(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| recompute_total(black_box(input)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_recompute_total);
criterion_main!(benches);

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use bodega_core::{ProductId, UserId};
use bodega_ledger::{InMemoryLedgerStore, MovementKind, StockLedger};

fn seeded_ledger(movements: u64) -> (StockLedger<Arc<InMemoryLedgerStore>>, ProductId, UserId) {
    bodega_observability::tracing::init_with("warn");
    let ledger = StockLedger::new(Arc::new(InMemoryLedgerStore::new()));
    let product_id = ProductId::new();
    let user = UserId::new();
    ledger.register_product(product_id).unwrap();
    for i in 0..movements {
        let kind = if i % 3 == 2 {
            MovementKind::Out
        } else {
            MovementKind::In
        };
        ledger
            .propose_movement(product_id, kind, 5, "seed", user)
            .unwrap();
    }
    (ledger, product_id, user)
}

fn bench_propose_movement(c: &mut Criterion) {
    let mut group = c.benchmark_group("propose_movement");
    group.throughput(Throughput::Elements(1));

    group.bench_function("in_on_fresh_stream", |b| {
        let (ledger, product_id, user) = seeded_ledger(0);
        b.iter(|| {
            black_box(
                ledger
                    .propose_movement(product_id, MovementKind::In, 1, "bench", user)
                    .unwrap(),
            )
        });
    });

    group.bench_function("out_on_deep_stream", |b| {
        let (ledger, product_id, user) = seeded_ledger(10_000);
        b.iter(|| {
            // Cached head keeps this O(1) regardless of journal depth.
            ledger
                .propose_movement(product_id, MovementKind::In, 1, "bench", user)
                .unwrap();
            black_box(
                ledger
                    .propose_movement(product_id, MovementKind::Out, 1, "bench", user)
                    .unwrap(),
            )
        });
    });

    group.finish();
}

fn bench_current_stock(c: &mut Criterion) {
    c.bench_function("current_stock_deep_stream", |b| {
        let (ledger, product_id, _) = seeded_ledger(10_000);
        b.iter(|| black_box(ledger.current_stock(product_id).unwrap()));
    });
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    for depth in [100_u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(depth));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let (ledger, product_id, _) = seeded_ledger(depth);
            b.iter(|| black_box(ledger.reconcile(product_id).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_propose_movement,
    bench_current_stock,
    bench_reconcile
);
criterion_main!(benches);

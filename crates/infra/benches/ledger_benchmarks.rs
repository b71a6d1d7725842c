use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use rust_decimal::Decimal;
use std::sync::Arc;
use stockledger_core::ItemKey;
use stockledger_infra::{InMemoryLedgerStore, JsonlLedgerStore, LedgerEngine, LedgerStore};
use stockledger_inventory::{AdjustmentBatch, InventoryLedger, LedgerPolicy, StockAdjustment};

fn key(name: &str) -> ItemKey {
    ItemKey::new(name).unwrap()
}

fn setup_engine() -> (LedgerEngine<Arc<InMemoryLedgerStore>>, Arc<InMemoryLedgerStore>) {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = LedgerEngine::open(store.clone(), LedgerPolicy::default()).unwrap();
    (engine, store)
}

/// Store pre-filled with `count` transactions spread over a handful of items.
fn seeded_store(count: usize) -> Arc<InMemoryLedgerStore> {
    let (engine, store) = setup_engine();
    for i in 0..count {
        let item = key(&format!("item-{}", if i % 3 == 2 { (i - 2) % 8 } else { i % 8 }));
        if i % 3 == 2 {
            engine.dispose(&item, 1).unwrap();
        } else {
            engine
                .acquire(&item, 2, Decimal::new((i % 500) as i64 + 100, 2), Decimal::from(9))
                .unwrap();
        }
    }
    engine.shutdown().unwrap()
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");
    group.sample_size(1000);

    // Benchmark: acquisition of a fresh item (no history)
    group.bench_function("acquire_fresh_item", |b| {
        let (engine, _) = setup_engine();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let item = key(&format!("fresh-{n}"));
            engine
                .acquire(&item, black_box(10), Decimal::TWO, Decimal::TEN)
                .unwrap();
        });
    });

    // Benchmark: disposal against an item with a long history
    group.bench_function("dispose_with_history", |b| {
        let (engine, _) = setup_engine();
        let item = key("widget");
        for _ in 0..1000 {
            engine.acquire(&item, 1_000_000_000, Decimal::ONE, Decimal::TWO).unwrap();
        }
        b.iter(|| {
            engine.dispose(&item, black_box(1)).unwrap();
        });
    });

    group.finish();
}

fn bench_adjustment_batch_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("adjustment_batch_throughput");

    for batch_size in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("apply_batch", batch_size),
            batch_size,
            |b, &size| {
                let (engine, _) = setup_engine();
                let batch: AdjustmentBatch = (0..size)
                    .map(|i| (key(&format!("item-{i}")), StockAdjustment::quantity(5)))
                    .collect();
                b.iter(|| {
                    let report = engine.apply_external_adjustments(black_box(&batch)).unwrap();
                    assert!(report.is_clean());
                });
            },
        );
    }

    group.finish();
}

fn bench_replay_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay_speed");

    for tx_count in [10usize, 100, 1000, 10000].iter() {
        let store = seeded_store(*tx_count);
        let log = store.load_transactions().unwrap();

        group.throughput(Throughput::Elements(*tx_count as u64));
        group.bench_with_input(
            BenchmarkId::new("ledger_replay", tx_count),
            &log,
            |b, log| {
                b.iter(|| {
                    InventoryLedger::replay(LedgerPolicy::default(), black_box(log.clone())).unwrap()
                });
            },
        );
        group.bench_with_input(
            BenchmarkId::new("engine_open", tx_count),
            &store,
            |b, store| {
                b.iter(|| LedgerEngine::open(store.clone(), LedgerPolicy::default()).unwrap());
            },
        );
    }

    group.finish();
}

fn bench_jsonl_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("jsonl_append");
    group.sample_size(50);

    // Benchmark: fsync'd append + snapshot rewrite per committed transaction
    group.bench_function("acquire_durable", |b| {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlLedgerStore::open(dir.path()).unwrap();
        let engine = LedgerEngine::open(store, LedgerPolicy::default()).unwrap();
        let item = key("widget");
        b.iter(|| {
            engine.acquire(&item, black_box(1), Decimal::ONE, Decimal::TWO).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_adjustment_batch_throughput,
    bench_replay_speed,
    bench_jsonl_append
);
criterion_main!(benches);

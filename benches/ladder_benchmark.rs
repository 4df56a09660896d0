//! Benchmarks for ladder operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;

use clob_market_data::book::{OrderLadder, Side};
use clob_market_data::messages::{BookSnapshot, RawLevel};

fn create_snapshot(levels: usize) -> BookSnapshot {
    let bids: Vec<RawLevel> = (0..levels)
        .map(|i| RawLevel {
            price: Decimal::new(3800 - i as i64, 4),
            size: Decimal::new(15, 1),
        })
        .collect();

    let asks: Vec<RawLevel> = (0..levels)
        .map(|i| RawLevel {
            price: Decimal::new(4100 + i as i64, 4),
            size: Decimal::new(15, 1),
        })
        .collect();

    BookSnapshot {
        asset_id: None,
        bids,
        asks,
    }
}

fn populated_ladder(levels: usize) -> OrderLadder {
    let mut ladder = OrderLadder::new();
    ladder.apply_snapshot(&create_snapshot(levels));
    ladder
}

fn bench_apply_snapshot(c: &mut Criterion) {
    let snapshot = create_snapshot(50);

    c.bench_function("apply_snapshot_50_levels", |b| {
        b.iter(|| {
            let mut ladder = OrderLadder::new();
            ladder.apply_snapshot(black_box(&snapshot));
            ladder
        })
    });
}

fn bench_apply_diff(c: &mut Criterion) {
    c.bench_function("apply_diff_accumulate", |b| {
        let mut ladder = populated_ladder(50);
        let price = Decimal::new(3800, 4);
        let size = Decimal::new(10, 0);
        b.iter(|| ladder.apply_diff(black_box(Side::Bid), black_box(price), black_box(size)))
    });

    c.bench_function("apply_diff_delete_missing", |b| {
        let mut ladder = populated_ladder(50);
        let price = Decimal::new(9999, 4);
        b.iter(|| ladder.apply_diff(black_box(Side::Ask), black_box(price), Decimal::ZERO))
    });
}

fn bench_project(c: &mut Criterion) {
    let ladder = populated_ladder(50);

    c.bench_function("project_top_5", |b| {
        b.iter(|| black_box(&ladder).project(black_box(5)))
    });
}

criterion_group!(benches, bench_apply_snapshot, bench_apply_diff, bench_project);
criterion_main!(benches);

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use model_usage_hub::bench_support::LedgerBenchFixture;
use model_usage_hub::bench_support::model_quota_ledger::{display, EntityKey, LedgerState};
use tokio::runtime::Runtime;

fn bench_record_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_event");
    group
        .sample_size(500)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1));

    let fresh = LedgerBenchFixture::new();
    group.bench_function(BenchmarkId::new("memory_store", "within_window"), |b| {
        let runtime = Runtime::new().expect("tokio runtime");
        let ledger = fresh.ledger.clone();
        b.iter(|| {
            let outcome = runtime
                .block_on(ledger.record_event(EntityKey::Gpt4o))
                .expect("record event");
            black_box(outcome)
        });
    });

    let unlimited = LedgerBenchFixture::new();
    group.bench_function(BenchmarkId::new("memory_store", "unlimited"), |b| {
        let runtime = Runtime::new().expect("tokio runtime");
        let ledger = unlimited.ledger.clone();
        b.iter(|| {
            let outcome = runtime
                .block_on(ledger.record_event(EntityKey::Gpt4oMini))
                .expect("record event");
            black_box(outcome)
        });
    });

    group.finish();
}

fn bench_sweep_and_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep_and_query");

    let fixture = LedgerBenchFixture::with_usage(25);
    group.bench_function("query_all", |b| {
        let runtime = Runtime::new().expect("tokio runtime");
        let ledger = fixture.ledger.clone();
        b.iter(|| black_box(runtime.block_on(ledger.query_all()).expect("query")));
    });

    group.bench_function("sweep_idle", |b| {
        let runtime = Runtime::new().expect("tokio runtime");
        let ledger = fixture.ledger.clone();
        b.iter(|| black_box(runtime.block_on(ledger.sweep_expired()).expect("sweep")));
    });

    group.bench_function("pure_transitions", |b| {
        let start = model_usage_hub::bench_support::bench_epoch();
        b.iter(|| {
            let mut state = LedgerState::new();
            for minute in 0..100 {
                let now = start + ChronoDuration::minutes(minute);
                black_box(state.record_event_at(EntityKey::Gpt4, now));
            }
            black_box(state.sweep_expired(start + ChronoDuration::hours(4)))
        });
    });

    group.bench_function("render_indicator", |b| {
        let runtime = Runtime::new().expect("tokio runtime");
        let ledger = fixture.ledger.clone();
        b.iter(|| {
            let snapshots = runtime.block_on(ledger.query_all()).expect("query");
            let lines: Vec<String> = snapshots.iter().map(display::indicator_line).collect();
            black_box(lines)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_record_event, bench_sweep_and_query);
criterion_main!(benches);

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use matcher_core::prelude::*;
use matcher_core::order::Side;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn order(side: Side, id: u32, price: u32, count: u32) -> WireCommand {
    WireCommand::Order {
        side,
        id,
        instrument: "GOOG".to_string(),
        price,
        count,
    }
}

fn bench_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching for 10k orders");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("cross 10k resting orders", |b| {
        b.iter_batched(
            || {
                let engine = Engine::new();
                let sink = VecSink::new();
                for i in 0..10_000u32 {
                    engine.dispatch(order(Side::Sell, i, 1000 + (i % 500), 10), i as u64, sink.as_ref());
                }
                (engine, sink)
            },
            |(engine, sink)| {
                for i in 10_000..20_000u32 {
                    engine.dispatch(order(Side::Buy, i, 1500, 10), i as u64, sink.as_ref());
                }
            },
            criterion::BatchSize::LargeInput,
        );
    });
    group.finish();
}

fn stress_multi_thread_benchmark(c: &mut Criterion) {
    let engine = Arc::new(Engine::new());
    let sink = VecSink::new();

    let mut group = c.benchmark_group("stress matching");
    group.throughput(Throughput::Elements(1));
    group.bench_function("concurrent insert/cancel TPS", |b| {
        let running = Arc::new(AtomicBool::new(true));

        let engine_insert = engine.clone();
        let sink_insert = sink.clone();
        let insert_running = running.clone();
        let insert_thread = thread::spawn(move || {
            let mut rng = rand::rng();
            let mut i = 0u32;
            while insert_running.load(Ordering::Relaxed) {
                i += 1;
                let side = if rng.random_bool(0.5) { Side::Buy } else { Side::Sell };
                let price = 1000 - (i % 500);
                engine_insert.dispatch(order(side, i, price, 10), i as u64, sink_insert.as_ref());
            }
        });

        let engine_cancel = engine.clone();
        let sink_cancel = sink.clone();
        let cancel_running = running.clone();
        let cancel_thread = thread::spawn(move || {
            let mut rng = rand::rng();
            while cancel_running.load(Ordering::Relaxed) {
                let victim = rng.random_range(0..1_000_000);
                engine_cancel.dispatch(WireCommand::Cancel { id: victim }, 0, sink_cancel.as_ref());
            }
        });

        b.iter(|| {
            engine.dispatch(order(Side::Buy, 999_999, 1500, 10), 0, sink.as_ref());
        });

        running.store(false, Ordering::Relaxed);
        insert_thread.join().unwrap();
        cancel_thread.join().unwrap();
    });
    group.finish();
}

criterion_group!(benches, bench_matching, stress_multi_thread_benchmark);
criterion_main!(benches);

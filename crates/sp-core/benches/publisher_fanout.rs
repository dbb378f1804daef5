//! Criterion benchmarks for the feed hot path in `sp-core`: line parsing,
//! broker fan-out and window aggregation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sp_common::{DataPoint, Dimension};
use sp_core::aggregate;
use sp_core::publish::Broker;
use sp_core::source::parse_line;
use std::thread;

const MESSAGES: u64 = 10_000;

fn bench_parse_line(c: &mut Criterion) {
    let full = b"data: {\"tweet\":{\"id\":123456,\"timestamp\":1691625600,\"likes\":42,\"comments\":7,\"favorites\":3,\"retweets\":19}}";
    let sparse = b"data: {\"pin\":{\"id\":9,\"timestamp\":1691625600,\"likes\":1}}";

    let mut group = c.benchmark_group("source");
    for (name, line) in [("all_dimensions", &full[..]), ("one_dimension", &sparse[..])] {
        group.bench_with_input(BenchmarkId::new("parse_line", name), &line, |b, input| {
            b.iter(|| {
                let event = parse_line(black_box(input)).expect("line should parse");
                black_box(event);
            });
        });
    }
    group.finish();
}

fn bench_broker_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("broker_fanout");
    group.throughput(Throughput::Elements(MESSAGES));
    group.sample_size(20);

    for subscribers in [1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                b.iter(|| {
                    let broker: Broker<Dimension, DataPoint> = Broker::new();
                    let readers: Vec<_> = (0..subscribers)
                        .map(|_| {
                            let (rx, _cancel) = broker.subscribe(&Dimension::Likes);
                            thread::spawn(move || rx.iter().count())
                        })
                        .collect();
                    for i in 0..MESSAGES as u32 {
                        broker.publish(&Dimension::Likes, DataPoint::new(i, i % 500));
                    }
                    broker.close();
                    for reader in readers {
                        black_box(reader.join().expect("reader thread"));
                    }
                });
            },
        );
    }
    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let points: Vec<DataPoint> = (0..MESSAGES as u32)
        .map(|i| DataPoint::new(1_691_625_600 + i, (i * 7919) % 1_000))
        .collect();

    let mut group = c.benchmark_group("aggregate");
    group.throughput(Throughput::Elements(MESSAGES));
    group.bench_function("collect", |b| {
        b.iter(|| black_box(aggregate::collect(black_box(points.iter().copied()))))
    });
    group.finish();
}

criterion_group!(benches, bench_parse_line, bench_broker_fanout, bench_aggregate);
criterion_main!(benches);

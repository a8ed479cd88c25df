//! Engine throughput over in-memory sources.
//!
//! Query and Statistics are single-pass; the Merger is a nested loop, so its inputs are kept
//! small enough that a run stays in the low milliseconds.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use data_cruncher::processing::{Merger, Query, Rule, Statistics};
use data_cruncher::sources::MemorySource;
use data_cruncher::types::Row;

const PHONES: [&str; 4] = ["apple iphone 6", "samsung galaxy s6", "samsung note 7", "htc m8"];

fn people(n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| {
            data_cruncher::row! {
                "id" => (i % 500).to_string(),
                "name" => format!("person_{i}"),
                "age" => (15 + i % 60).to_string(),
                "dob" => format!("{:02}/{:02}/{}", 1 + i % 28, 1 + i % 12, 1950 + i % 60),
                "phone" => PHONES[i % PHONES.len()]
            }
        })
        .collect()
}

fn orders(n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| {
            data_cruncher::row! {
                "id" => (i % 500).to_string(),
                "total" => (i * 7 % 300).to_string()
            }
        })
        .collect()
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    for size in [1_000usize, 10_000, 100_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("contains", size), &size, |b, &size| {
            let mut src = MemorySource::new("people", people(size));
            let mut query = Query::new()
                .from_source(&mut src)
                .condition("CONTAINS")
                .unwrap()
                .where_field("phone")
                .value("samsung");
            b.iter(|| black_box(query.execute(None, None).unwrap()));
        });
    }
    group.finish();
}

fn bench_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics");
    for size in [1_000usize, 10_000, 100_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("three_rules", size), &size, |b, &size| {
            let mut src = MemorySource::new("people", people(size));
            let mut stats = Statistics::new()
                .from_source(&mut src)
                .add_rule(Rule::new("age").group_numeric(10.0).unwrap())
                .add_rule(Rule::new("dob").group_date("%d/%m/%Y", "%Y").unwrap())
                .add_rule(Rule::new("phone").group_regex(r"^(\w+)").unwrap())
                .percentages(Some(2));
            b.iter(|| black_box(stats.execute(None).unwrap()));
        });
    }
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    for size in [100usize, 500, 1_000] {
        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::new("two_way", size), &size, |b, &size| {
            let mut left = MemorySource::new("people", people(size));
            let mut right = MemorySource::new("orders", orders(size));
            b.iter(|| {
                let out = Merger::new()
                    .from_source(&mut left)
                    .from_source(&mut right)
                    .on("id")
                    .execute(None)
                    .unwrap();
                black_box(out)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_query, bench_statistics, bench_merge);
criterion_main!(benches);

//! Benchmarks for registry feed parsing.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use geowall::registry::{classify_line, parse};
use std::hint::black_box;

/// Generate a delegated feed with a mix of countries and resource types
fn generate_feed(records: usize) -> String {
    const COUNTRIES: [&str; 4] = ["AU", "JP", "CN", "NZ"];

    let mut feed = String::from("2|apnic|20240101|0|19830613|20231231|+1000\n");
    feed.push_str("apnic|*|ipv4|*|0|summary\n");
    for i in 0..records {
        let cc = COUNTRIES[i % COUNTRIES.len()];
        if i % 10 == 0 {
            feed.push_str(&format!("apnic|{}|ipv6|2001:{:x}::|32|20110811|allocated\n", cc, i));
        } else {
            feed.push_str(&format!(
                "apnic|{}|ipv4|{}.{}.{}.0|{}|20110811|allocated\n",
                cc,
                1 + (i / 65536) % 223,
                (i / 256) % 256,
                i % 256,
                256 << (i % 8)
            ));
        }
    }
    feed
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for size in [1_000, 10_000, 60_000] {
        let feed = generate_feed(size);
        group.throughput(Throughput::Bytes(feed.len() as u64));
        group.bench_with_input(BenchmarkId::new("feed", size), &feed, |b, feed| {
            b.iter(|| black_box(parse(feed, "AU")))
        });
    }

    group.finish();
}

fn bench_classify_line(c: &mut Criterion) {
    let line = "apnic|AU|ipv4|1.2.3.0|256|20200101|allocated";
    c.bench_function("classify_line", |b| {
        b.iter(|| black_box(classify_line(black_box(line), "AU")))
    });
}

criterion_group!(benches, bench_parse, bench_classify_line);
criterion_main!(benches);

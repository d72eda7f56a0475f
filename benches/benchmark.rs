// Ingestion and processing benchmarks
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cosim_core::{InputMatrixConfig, MemoryStore, Recommender, RecommenderConfig};
use rand::prelude::*;
use std::sync::Arc;

fn generate_set(rng: &mut impl Rng, catalog: usize, len: usize) -> Vec<String> {
    (0..len)
        .map(|_| format!("item{}", rng.random_range(0..catalog)))
        .collect()
}

fn recommender() -> Recommender {
    let config = RecommenderConfig::new(
        "bench",
        50,
        vec![
            InputMatrixConfig::new("orders", 5.0, "jaccard"),
            InputMatrixConfig::new("likes", 1.0, "cosine"),
        ],
    );
    Recommender::new(config, Arc::new(MemoryStore::new())).unwrap()
}

fn benchmark_add_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_set");

    for len in [2, 8, 32].iter() {
        group.bench_with_input(BenchmarkId::new("set_len", len), len, |b, &len| {
            let rec = recommender();
            let mut rng = rand::rng();
            let mut n = 0u64;
            b.iter(|| {
                let set = generate_set(&mut rng, 10_000, len);
                n += 1;
                rec.add_set("orders", &format!("o{}", n), black_box(&set)).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_process_item(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_item");

    for catalog in [100, 1000].iter() {
        let rec = recommender();
        let mut rng = rand::rng();
        for n in 0..5_000 {
            let set = generate_set(&mut rng, *catalog, 6);
            let matrix = if n % 4 == 0 { "likes" } else { "orders" };
            rec.add_set(matrix, &format!("b{}", n), &set).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("catalog", catalog), catalog, |b, _| {
            b.iter(|| {
                let neighbors = rec.process_item(black_box("item7")).unwrap();
                black_box(neighbors);
            });
        });
    }

    group.finish();
}

fn benchmark_full_process(c: &mut Criterion) {
    c.bench_function("process_1000_dirty", |b| {
        b.iter_with_setup(
            || {
                let rec = recommender();
                let mut rng = rand::rng();
                for n in 0..2_000 {
                    let set = generate_set(&mut rng, 1_000, 5);
                    rec.add_set("orders", &format!("o{}", n), &set).unwrap();
                }
                rec
            },
            |rec| {
                let report = rec.process().unwrap();
                black_box(report);
            },
        );
    });
}

criterion_group!(
    benches,
    benchmark_add_set,
    benchmark_process_item,
    benchmark_full_process
);
criterion_main!(benches);

//! Sampling, pooling and result shaping benchmarks
//!
//! These run on every ingest and every search, so they should stay well
//! below encoder latency.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use uuid::Uuid;
use vaultsearch::domain::models::{SamplingConfig, SearchHit};
use vaultsearch::services::sampling::{mean_pool, sample_chunks};
use vaultsearch::services::scoring::finalize_hits;

fn generate_text(words: usize) -> String {
    (0..words)
        .map(|i| format!("word{}", i % 1009))
        .collect::<Vec<_>>()
        .join(" ")
}

fn generate_embedding(dim: usize, seed: u64) -> Vec<f32> {
    (0..dim)
        .map(|i| ((i as f64 + seed as f64) * 0.1).sin() as f32)
        .collect()
}

fn bench_sample_chunks(c: &mut Criterion) {
    let config = SamplingConfig::default();
    let mut group = c.benchmark_group("sample_chunks");

    for words in [1_000usize, 20_000, 200_000] {
        let text = generate_text(words);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(words), &text, |b, text| {
            b.iter(|| sample_chunks(black_box(text), &config));
        });
    }
    group.finish();
}

fn bench_mean_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("mean_pool");

    for dim in [384usize, 768] {
        let vectors: Vec<Vec<f32>> = (0..5).map(|j| generate_embedding(dim, j)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(dim), &vectors, |b, vectors| {
            b.iter(|| mean_pool(black_box(vectors)));
        });
    }
    group.finish();
}

fn bench_finalize_hits(c: &mut Criterion) {
    // 100 candidates with duplicates, as a fallback search might return
    let ids: Vec<Uuid> = (0..40).map(|_| Uuid::new_v4()).collect();
    let hits: Vec<SearchHit> = (0..100)
        .map(|i| SearchHit {
            document_id: ids[i % ids.len()],
            file_name: format!("doc{i}.txt"),
            score: 1.0 / (1.0 + i as f32),
        })
        .collect();

    c.bench_function("finalize_hits_100_candidates", |b| {
        b.iter(|| finalize_hits(black_box(hits.clone()), 5));
    });
}

criterion_group!(benches, bench_sample_chunks, bench_mean_pool, bench_finalize_hits);
criterion_main!(benches);

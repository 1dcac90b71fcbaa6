//! HNSW recall/QPS sweep over seeded random vectors.
//! Ground truth comes from the index's own exact view.
//!
//! Usage: cargo bench --bench recall_sweep

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use recallkit_core::{DistanceMetric, HnswIndex, Index, Item, SearchIndex};
use std::collections::HashSet;
use std::time::Instant;

const NUM_ITEMS: usize = 20_000;
const NUM_QUERIES: usize = 1_000;
const DIM: usize = 32;
const K: usize = 10;

fn random_vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

fn main() {
    println!("=== Recall sweep: {NUM_ITEMS} x {DIM}d, cosine, k={K} ===");
    println!();

    let train = random_vectors(NUM_ITEMS, DIM, 7);
    let queries = random_vectors(NUM_QUERIES, DIM, 8);

    for (label, m, ef_construction) in [("M=8, ef_c=100", 8, 100), ("M=16, ef_c=200", 16, 200)] {
        println!("Config: {label}");
        let mut index: HnswIndex<u32, Vec<f32>, DistanceMetric> =
            HnswIndex::builder(DIM, DistanceMetric::Cosine, NUM_ITEMS)
                .m(m)
                .ef_construction(ef_construction)
                .build()
                .expect("valid parameters");

        let t0 = Instant::now();
        for (i, v) in train.iter().enumerate() {
            index.add(Item::new(i as u32, v.clone())).expect("fits capacity");
        }
        let build_time = t0.elapsed();
        println!(
            "  Build time: {:.2}s ({:.0} inserts/s)",
            build_time.as_secs_f64(),
            NUM_ITEMS as f64 / build_time.as_secs_f64()
        );

        let exact = index.as_exact_index();
        let truth: Vec<HashSet<u32>> = queries
            .iter()
            .map(|q| {
                exact
                    .find_nearest(q, K)
                    .expect("valid query")
                    .iter()
                    .map(|n| *n.id())
                    .collect()
            })
            .collect();

        println!();
        println!("  ef | Recall@{K} |    QPS    | Avg latency");
        println!("  ---+-----------+-----------+------------");
        for ef in [10, 20, 40, 80, 160, 320] {
            let t0 = Instant::now();
            let mut found = 0usize;
            for (q, expected) in queries.iter().zip(&truth) {
                let results = index.find_nearest_with_ef(q, K, ef).expect("valid query");
                found += results.iter().filter(|n| expected.contains(n.id())).count();
            }
            let elapsed = t0.elapsed();
            println!(
                "  {:>3} | {:.4}    | {:>9.1} | {:.0} us",
                ef,
                found as f64 / (NUM_QUERIES * K) as f64,
                NUM_QUERIES as f64 / elapsed.as_secs_f64(),
                elapsed.as_micros() as f64 / NUM_QUERIES as f64
            );
        }
        println!();
    }

    println!("=== Benchmark complete ===");
}

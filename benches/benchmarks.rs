//! Criterion benchmarks for memx.

use std::collections::{BTreeMap, BTreeSet};

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use memx::graph::bfs_paths;
use memx::services::{Embedder, ExtractiveCompressor, HashingEmbedder, TextCompressor};
use memx::{
    ConsolidationPolicy, EngineConfig, FlatIndex, KnowledgeGraph, MemoryEngine, NewInteraction,
    Role, TraversalParams, VectorIndex,
};

const WORDS: &[&str] = &[
    "parser", "cache", "deploy", "latency", "schema", "index", "worker", "queue", "token",
    "socket", "config", "release", "branch", "timeout", "retry", "shard", "replica", "lock",
];

fn sentence(rng: &mut StdRng, len: usize) -> String {
    (0..len)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ")
}

/// Random graph with cycles: every node gets `edges_per_node` outgoing edges.
fn make_graph(node_count: usize, edges_per_node: usize) -> KnowledgeGraph {
    let mut rng = StdRng::seed_from_u64(42);
    let mut graph = KnowledgeGraph::new();
    let sources: BTreeSet<u64> = BTreeSet::from([0]);

    let ids: Vec<u64> = (0..node_count)
        .map(|i| {
            graph
                .upsert_node(&format!("node_{i}"), BTreeMap::new(), &sources, 0)
                .unwrap()
                .0
        })
        .collect();
    for &from in &ids {
        for _ in 0..edges_per_node {
            let to = ids[rng.gen_range(0..ids.len())];
            let weight = rng.gen_range(0.1..1.0);
            let _ = graph.upsert_edge(from, to, "related_to", weight, &sources, 0);
        }
    }
    graph
}

fn open_engine(dir: &TempDir) -> MemoryEngine {
    let config = EngineConfig::for_root(dir.path()).with_project_key("/bench/project");
    MemoryEngine::open(config).unwrap()
}

fn bench_upsert_node(c: &mut Criterion) {
    let mut graph = make_graph(10_000, 0);
    let sources: BTreeSet<u64> = BTreeSet::from([1]);
    let mut i = 0u64;

    c.bench_function("upsert_node_into_10k", |b| {
        b.iter(|| {
            i += 1;
            let _ = graph.upsert_node(&format!("bench_{i}"), BTreeMap::new(), &sources, 0);
        })
    });
}

fn bench_traverse_depth_5(c: &mut Criterion) {
    let graph = make_graph(20_000, 3);

    c.bench_function("traverse_depth5_20k_cyclic", |b| {
        b.iter(|| {
            let _ = bfs_paths(&graph, 10_000, TraversalParams::new(5));
        })
    });
}

fn bench_nearest_10k(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let embedder = HashingEmbedder::new(256);
    let index = FlatIndex::new();
    for i in 0..10_000 {
        let text = sentence(&mut rng, 12);
        index.upsert(&format!("interaction:{i}"), "conv", embedder.embed(&text).unwrap());
    }
    let query = embedder
        .embed("cache latency after the release branch deploy")
        .unwrap();

    c.bench_function("nearest_top8_10k", |b| {
        b.iter(|| {
            let _ = index.nearest(&query, Some("conv"), 8);
        })
    });
}

fn bench_ingest_scored(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..1_000 {
        engine
            .ingest(None, Role::User, &sentence(&mut rng, 10))
            .unwrap();
    }

    c.bench_function("ingest_with_surprise_1k_log", |b| {
        b.iter(|| {
            let _ = engine.ingest(None, Role::User, &sentence(&mut rng, 10));
        })
    });
}

fn bench_consolidate_500(c: &mut Criterion) {
    let policy = ConsolidationPolicy {
        t_high: 0.7,
        t_low: 0.3,
        retention_age_secs: 0,
        prune_age_secs: 3_600,
    };

    c.bench_function("consolidate_500_pending", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let engine = open_engine(&dir);
                let conversation = engine.resolve_conversation(None).unwrap().conversation_id;
                let mut rng = StdRng::seed_from_u64(3);
                for _ in 0..500 {
                    let content = format!("Service {}", sentence(&mut rng, 8));
                    let score: f32 = rng.gen_range(0.0..1.0);
                    engine
                        .record(
                            NewInteraction::new(&conversation, Role::User, content)
                                .surprise_score(score),
                        )
                        .unwrap();
                }
                (dir, engine)
            },
            |(_dir, engine)| {
                let _ = engine.consolidate(None, Some(policy));
            },
            BatchSize::PerIteration,
        )
    });
}

fn bench_compress(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(5);
    let text: String = (0..200)
        .map(|_| format!("{}.", sentence(&mut rng, 14)))
        .collect::<Vec<_>>()
        .join(" ");
    let compressor = ExtractiveCompressor::new();

    c.bench_function("compress_200_sentences", |b| {
        b.iter(|| {
            let _ = compressor.compress(&text, Some("cache latency"), 0.3);
        })
    });
}

criterion_group!(
    benches,
    bench_upsert_node,
    bench_traverse_depth_5,
    bench_nearest_10k,
    bench_ingest_scored,
    bench_consolidate_500,
    bench_compress,
);
criterion_main!(benches);

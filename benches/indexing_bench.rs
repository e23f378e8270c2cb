//! Indexing pipeline performance benchmarks.
//!
//! Benchmarks the per-file orchestrator sequence end-to-end (parse, chunk,
//! entity resolution, embed, graph write) and the retrieval engine's hybrid
//! search over a pre-populated graph.
//!
//! Run with: cargo bench --bench indexing_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

use cappy::config::MarkdownChunkingConfig;
use cappy::content::ContentStore;
use cappy::embeddings::HashingEmbeddingService;
use cappy::entities::{EntityResolver, EntityResolverConfig, LexicalEntityProvider};
use cappy::events;
use cappy::graph::SqliteGraphStore;
use cappy::metadata_db::FileMetadataDb;
use cappy::orchestrator::Orchestrator;
use cappy::parsers::ParserRegistry;
use cappy::relations::RelationshipExtractor;
use cappy::retrieval::{RetrievalEngine, SearchMode, SearchRequest};
use cappy::vector_store::{SqliteVectorStore, VectorStore};
use std::sync::Arc;

fn sample_module(index: usize) -> String {
    format!(
        "/** Computes a running total for batch {index}. */\nexport function sumBatch{index}(values) {{\n  let total = 0;\n  for (const v of values) {{\n    total += v;\n  }}\n  return total;\n}}\n\nexport class BatchProcessor{index} {{\n  constructor(name) {{\n    this.name = name;\n  }}\n  run(values) {{\n    return sumBatch{index}(values);\n  }}\n}}\n"
    )
}

fn build_orchestrator(dir: &TempDir, metadata: Arc<FileMetadataDb>) -> Orchestrator {
    let vectors: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::in_memory().unwrap());
    let graph_path = dir.path().join("graph.db");
    Orchestrator::new(
        ContentStore::new(dir.path()),
        ParserRegistry::new().unwrap(),
        RelationshipExtractor::new().unwrap(),
        EntityResolver::new(LexicalEntityProvider, EntityResolverConfig::default()),
        Some(Arc::new(HashingEmbeddingService::new(32))),
        Some(vectors),
        SqliteGraphStore::open(&graph_path).unwrap(),
        metadata,
        MarkdownChunkingConfig::default(),
    )
}

fn benchmark_process_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_file");

    for file_count in [1usize, 10, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(file_count), &file_count, |b, &file_count| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let metadata = Arc::new(FileMetadataDb::in_memory().unwrap());
                let mut orchestrator = build_orchestrator(&dir, metadata.clone());
                let events = events::channel();

                for i in 0..file_count {
                    let path = format!("batch_{i}.js");
                    std::fs::write(dir.path().join(&path), sample_module(i)).unwrap();
                    let file_id = metadata.insert_file(&path, None, 256, 3).unwrap();
                    black_box(orchestrator.process_file(&file_id, &path, None, &events)).unwrap();
                }
            })
        });
    }

    group.finish();
}

fn benchmark_hybrid_search(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let metadata = Arc::new(FileMetadataDb::in_memory().unwrap());
    let mut orchestrator = build_orchestrator(&dir, metadata.clone());
    let events = events::channel();

    for i in 0..50 {
        let path = format!("batch_{i}.js");
        std::fs::write(dir.path().join(&path), sample_module(i)).unwrap();
        let file_id = metadata.insert_file(&path, None, 256, 3).unwrap();
        orchestrator.process_file(&file_id, &path, None, &events).unwrap();
    }

    let graph_path = dir.path().join("graph.db");
    let retrieval_config = cappy::config::RetrievalConfig::default();
    let engine = RetrievalEngine::new(&retrieval_config);

    let mut group = c.benchmark_group("hybrid_search");
    for mode in [SearchMode::Local, SearchMode::Hybrid, SearchMode::Mix] {
        let label = format!("{mode:?}");
        group.bench_function(label, |b| {
            b.iter(|| {
                let mut graph = SqliteGraphStore::open(&graph_path).unwrap();
                let request = SearchRequest {
                    query: "sumBatch".to_string(),
                    mode,
                    k: Some(10),
                    depth: Some(2),
                };
                black_box(engine.search(&request, &mut graph, None, None)).unwrap();
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_process_file, benchmark_hybrid_search);
criterion_main!(benches);

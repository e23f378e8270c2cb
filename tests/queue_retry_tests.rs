//! Integration test for the retry-then-fail path (spec scenario S4).
//!
//! Enqueues a path that never exists on disk with `maxRetries = 2` and drives
//! it through a real `WorkerPool`/`Orchestrator` pair, asserting the exact
//! event sequence and terminal state the spec pins down: three `file:start`
//! events, one terminal `file:failed`, final status `failed`, `retryCount = 3`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cappy::config::MarkdownChunkingConfig;
use cappy::content::ContentStore;
use cappy::embeddings::HashingEmbeddingService;
use cappy::entities::{EntityResolver, EntityResolverConfig, LexicalEntityProvider};
use cappy::events::{self, IndexEvent};
use cappy::graph::SqliteGraphStore;
use cappy::metadata_db::{FileMetadataDb, FileStatus};
use cappy::orchestrator::Orchestrator;
use cappy::parsers::ParserRegistry;
use cappy::queue::ProcessingQueue;
use cappy::relations::RelationshipExtractor;
use cappy::vector_store::{SqliteVectorStore, VectorStore};
use cappy::workers::{OrchestratorFactory, WorkerPool};
use tempfile::TempDir;

#[test]
fn retry_then_fail_emits_exact_event_sequence_and_terminal_state() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    let graph_path = dir.path().join("graph.db");
    let max_retries = 2u32;

    let metadata = Arc::new(FileMetadataDb::in_memory().unwrap());
    let queue = ProcessingQueue::new(metadata.clone(), max_retries);
    // Never written to disk: every claim fails at the Content Store's load step.
    let file_id = queue.enqueue("missing.ts", None, 0).unwrap();

    let events = events::channel();
    let collected: Arc<Mutex<Vec<IndexEvent>>> = Arc::new(Mutex::new(Vec::new()));

    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut subscriber = events.subscribe();
    let collected_for_task = collected.clone();
    let collector = rt.spawn(async move {
        while let Some(event) = subscriber.recv().await {
            collected_for_task.lock().unwrap().push(event);
        }
    });

    let make_orchestrator: Arc<OrchestratorFactory> = {
        let root = root.clone();
        let graph_path = graph_path.clone();
        let metadata = metadata.clone();
        Arc::new(move || {
            let vectors: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::in_memory()?);
            Ok(Orchestrator::new(
                ContentStore::new(&root),
                ParserRegistry::new()?,
                RelationshipExtractor::new()?,
                EntityResolver::new(LexicalEntityProvider, EntityResolverConfig::default()),
                Some(Arc::new(HashingEmbeddingService::new(32))),
                Some(vectors),
                SqliteGraphStore::open(&graph_path)?,
                metadata.clone(),
                MarkdownChunkingConfig::default(),
            ))
        })
    };

    // A tiny retry delay so the capped exponential backoff clears within the test deadline.
    let pool = WorkerPool::start(1, queue.clone(), 5, make_orchestrator, events);

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let record = metadata.get_file(&file_id).unwrap().unwrap();
        if record.status == FileStatus::Failed {
            break;
        }
        assert!(Instant::now() < deadline, "file never reached a terminal failed state");
        std::thread::sleep(Duration::from_millis(20));
    }

    // Give the last file:failed publish a moment to land before tearing down.
    std::thread::sleep(Duration::from_millis(50));
    pool.stop();
    collector.abort();

    let final_record = metadata.get_file(&file_id).unwrap().unwrap();
    assert_eq!(final_record.status, FileStatus::Failed);
    assert_eq!(final_record.retry_count, max_retries + 1);

    let events = collected.lock().unwrap();
    let start_count = events.iter().filter(|e| matches!(e, IndexEvent::FileStart { .. })).count();
    let failed_count = events.iter().filter(|e| matches!(e, IndexEvent::FileFailed { .. })).count();
    let complete_count = events.iter().filter(|e| matches!(e, IndexEvent::FileComplete { .. })).count();

    assert_eq!(start_count, (max_retries + 1) as usize, "exactly maxRetries + 1 file:start events");
    assert_eq!(failed_count, 1, "exactly one terminal file:failed event");
    assert_eq!(complete_count, 0, "a file that never succeeds emits no file:complete");
}

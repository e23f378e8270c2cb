//! cappy CLI entry point: dispatches `scan`/`watch`/`search`/`status` to the
//! library's components and renders the result as human text or JSON.

mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cappy::config::Config;
use cappy::content::ContentStore;
use cappy::embeddings::HashingEmbeddingService;
use cappy::entities::{EntityResolver, EntityResolverConfig, LexicalEntityProvider};
use cappy::events;
use cappy::execution_log::ExecutionLog;
use cappy::graph::{GraphStore, SqliteGraphStore};
use cappy::metadata_db::{FileMetadataDb, FileStatus};
use cappy::orchestrator::Orchestrator;
use cappy::output::{generate_execution_id, output_json, ErrorResponse, IndexResponse, JsonResponse, OutputFormat, StatusResponse};
use cappy::parsers::ParserRegistry;
use cappy::queue::ProcessingQueue;
use cappy::relations::RelationshipExtractor;
use cappy::retrieval::{RetrievalEngine, SearchRequest};
use cappy::scanner::{scan_initial, spawn_watcher, FileFilter};
use cappy::vector_store::{SqliteVectorStore, VectorStore};
use cappy::workers::{OrchestratorFactory, WorkerPool};

use cli::Command;

fn main() -> ExitCode {
    match cli::parse_args() {
        Ok(Command::Scan { root, config, output_format }) => run_scan(root, config, output_format),
        Ok(Command::Watch { root, config, scan_initial, output_format }) => {
            run_watch(root, config, scan_initial, output_format)
        }
        Ok(Command::Search { root, config, query, mode, k, depth, output_format }) => {
            run_search(root, config, query, mode, k, depth, output_format)
        }
        Ok(Command::Status { root, config, output_format }) => run_status(root, config, output_format),
        Err(e) => {
            eprintln!("cappy: {e}");
            cli::print_usage();
            ExitCode::from(1)
        }
    }
}

struct Workspace {
    config: Config,
    metadata: Arc<FileMetadataDb>,
    vectors: Arc<dyn VectorStore>,
    graph_path: PathBuf,
    exec_log: ExecutionLog,
}

/// Resolve `root`, load config, ensure `.cappy/` exists, and open the
/// metadata and vector stores. Every subcommand starts here; only the graph
/// store is opened per-thread since [`SqliteGraphStore`] is `!Send`.
fn open_workspace(root: &Path, explicit_config: Option<&Path>) -> anyhow::Result<Workspace> {
    if !root.is_dir() {
        anyhow::bail!("workspace root does not exist or is not a directory: {}", root.display());
    }

    let config = Config::load(root, explicit_config)?;

    let graph_path = root.join(&config.databases.graph.path);
    let metadata_path = root.join(&config.databases.metadata.path);
    let vectors_path = root.join(&config.databases.vectors.path);
    for path in [&graph_path, &metadata_path, &vectors_path] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let metadata = Arc::new(FileMetadataDb::open(&metadata_path)?);
    let vectors: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::open(&vectors_path)?);
    let exec_log = ExecutionLog::new(&graph_path);
    exec_log.ensure_schema()?;

    Ok(Workspace { config, metadata, vectors, graph_path, exec_log })
}

fn orchestrator_factory(workspace: &Workspace, root: PathBuf) -> Arc<OrchestratorFactory> {
    let metadata = workspace.metadata.clone();
    let vectors = workspace.vectors.clone();
    let graph_path = workspace.graph_path.clone();
    let embeddings_dimensions = workspace.config.embeddings.dimensions;
    let markdown_cfg = workspace.config.indexing.chunking.markdown.clone();

    Arc::new(move || {
        Ok(Orchestrator::new(
            ContentStore::new(&root),
            ParserRegistry::new()?,
            RelationshipExtractor::new()?,
            EntityResolver::new(LexicalEntityProvider, EntityResolverConfig::default()),
            Some(Arc::new(HashingEmbeddingService::new(embeddings_dimensions))),
            Some(vectors.clone()),
            SqliteGraphStore::open(&graph_path)?,
            metadata.clone(),
            markdown_cfg.clone(),
        ))
    })
}

/// Block until the metadata DB's `pending`/`processing` counts both hit
/// zero, polling on a short interval. Scan is otherwise fire-and-forget once
/// the queue is seeded, so this is the only place that waits for drain.
fn wait_for_queue_drain(metadata: &FileMetadataDb, timeout: Duration) -> anyhow::Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let counts = metadata.count_by_status()?;
        let in_flight: usize = counts
            .iter()
            .filter(|(status, _)| *status == FileStatus::Pending || *status == FileStatus::Processing)
            .map(|(_, n)| n)
            .sum();
        if in_flight == 0 {
            return Ok(());
        }
        if Instant::now() >= deadline {
            anyhow::bail!("timed out waiting for the processing queue to drain");
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

fn index_response_from_counts(metadata: &FileMetadataDb) -> anyhow::Result<IndexResponse> {
    let counts = metadata.count_by_status()?;
    let completed = counts.iter().find(|(s, _)| *s == FileStatus::Completed).map(|(_, n)| *n).unwrap_or(0);
    let failed = counts.iter().find(|(s, _)| *s == FileStatus::Failed).map(|(_, n)| *n).unwrap_or(0);
    Ok(IndexResponse {
        files_indexed: completed,
        files_failed: failed,
        symbols_indexed: 0,
        references_indexed: 0,
    })
}

fn run_scan(root: PathBuf, explicit_config: Option<PathBuf>, output_format: OutputFormat) -> ExitCode {
    let exec_id = generate_execution_id();

    let workspace = match open_workspace(&root, explicit_config.as_deref()) {
        Ok(w) => w,
        Err(e) => return emit_startup_error(&exec_id, output_format, e),
    };

    let args: Vec<String> = std::env::args().collect();
    let root_str = root.to_string_lossy().to_string();
    if let Err(e) = workspace.exec_log.start_execution(
        &exec_id,
        env!("CARGO_PKG_VERSION"),
        &args,
        Some(&root_str),
        &workspace.graph_path.to_string_lossy(),
    ) {
        eprintln!("cappy: failed to record execution start: {e}");
    }

    let result = (|| -> anyhow::Result<IndexResponse> {
        let queue = ProcessingQueue::new(workspace.metadata.clone(), workspace.config.queue.max_retries);
        let filter = FileFilter::new(&root);
        scan_initial(&root, &filter, &queue)?;

        let events = events::channel();
        let factory = orchestrator_factory(&workspace, root.clone());
        let pool = WorkerPool::start(
            workspace.config.queue.concurrency,
            queue,
            workspace.config.queue.retry_delay_millis,
            factory,
            events,
        );

        wait_for_queue_drain(&workspace.metadata, Duration::from_secs(600))?;
        pool.stop();

        let mut graph = SqliteGraphStore::open(&workspace.graph_path)?;
        if let Err(e) = graph.cleanup_orphaned_entities() {
            eprintln!("cappy: entity cleanup sweep failed: {e}");
        }

        index_response_from_counts(&workspace.metadata)
    })();

    finish_and_render(&workspace.exec_log, &exec_id, output_format, result)
}

fn run_watch(
    root: PathBuf,
    explicit_config: Option<PathBuf>,
    scan_initial_flag: bool,
    output_format: OutputFormat,
) -> ExitCode {
    let exec_id = generate_execution_id();

    let workspace = match open_workspace(&root, explicit_config.as_deref()) {
        Ok(w) => w,
        Err(e) => return emit_startup_error(&exec_id, output_format, e),
    };

    let args: Vec<String> = std::env::args().collect();
    let root_str = root.to_string_lossy().to_string();
    if let Err(e) = workspace.exec_log.start_execution(
        &exec_id,
        env!("CARGO_PKG_VERSION"),
        &args,
        Some(&root_str),
        &workspace.graph_path.to_string_lossy(),
    ) {
        eprintln!("cappy: failed to record execution start: {e}");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    {
        use signal_hook::consts::signal;
        use signal_hook::iterator::Signals;

        match Signals::new([signal::SIGTERM, signal::SIGINT]) {
            Ok(mut signals) => {
                let shutdown = shutdown.clone();
                std::thread::spawn(move || {
                    for _ in &mut signals {
                        shutdown.store(true, Ordering::SeqCst);
                        break;
                    }
                });
            }
            Err(e) => eprintln!("cappy: failed to install signal handlers: {e}"),
        }
    }

    let result = (|| -> anyhow::Result<IndexResponse> {
        let queue = ProcessingQueue::new(workspace.metadata.clone(), workspace.config.queue.max_retries);
        let filter = FileFilter::new(&root);
        if scan_initial_flag {
            scan_initial(&root, &filter, &queue)?;
        }

        let events = events::channel();
        let factory = orchestrator_factory(&workspace, root.clone());
        let pool = WorkerPool::start(
            workspace.config.queue.concurrency,
            queue.clone(),
            workspace.config.queue.retry_delay_millis,
            factory,
            events,
        );

        let watcher = spawn_watcher(
            root.clone(),
            Duration::from_millis(workspace.config.watch.debounce_millis),
            queue,
            workspace.graph_path.clone(),
            workspace.vectors.clone(),
        )?;

        while !shutdown.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(100));
        }

        watcher.stop();
        pool.stop();

        let mut graph = SqliteGraphStore::open(&workspace.graph_path)?;
        if let Err(e) = graph.cleanup_orphaned_entities() {
            eprintln!("cappy: entity cleanup sweep failed: {e}");
        }

        if output_format == OutputFormat::Human {
            println!("SHUTDOWN");
        }
        index_response_from_counts(&workspace.metadata)
    })();

    finish_and_render(&workspace.exec_log, &exec_id, output_format, result)
}

#[allow(clippy::too_many_arguments)]
fn run_search(
    root: PathBuf,
    explicit_config: Option<PathBuf>,
    query: String,
    mode: cappy::retrieval::SearchMode,
    k: Option<usize>,
    depth: Option<usize>,
    output_format: OutputFormat,
) -> ExitCode {
    let exec_id = generate_execution_id();

    let workspace = match open_workspace(&root, explicit_config.as_deref()) {
        Ok(w) => w,
        Err(e) => return emit_startup_error(&exec_id, output_format, e),
    };

    let result = (|| -> anyhow::Result<cappy::retrieval::SearchResponse> {
        let mut graph = SqliteGraphStore::open(&workspace.graph_path)?;
        let embedder = HashingEmbeddingService::new(workspace.config.embeddings.dimensions);
        let engine = RetrievalEngine::new(&workspace.config.retrieval);
        let request = SearchRequest { query, mode, k, depth };
        let response = engine.search(&request, &mut graph, Some(workspace.vectors.as_ref()), Some(&embedder))?;
        Ok(response)
    })();

    match result {
        Ok(response) => {
            match output_format {
                OutputFormat::Json => {
                    if let Err(e) = output_json(&JsonResponse::new(response, &exec_id)) {
                        eprintln!("cappy: failed to render JSON output: {e}");
                        return ExitCode::from(1);
                    }
                }
                OutputFormat::Human => print_search_human(&response),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            render_error(output_format, &exec_id, "search_failed", &e.to_string());
            ExitCode::from(1)
        }
    }
}

fn print_search_human(response: &cappy::retrieval::SearchResponse) {
    println!("{} direct match(es), {} related chunk(s) ({}ms)", response.totals.direct_matches, response.totals.related_chunks, response.processing_millis);
    for chunk in &response.direct_matches {
        println!("  {} [{}:{}-{}]", chunk.chunk_id, chunk.file_path, chunk.line_start, chunk.line_end);
    }
    if !response.related_chunks.is_empty() {
        println!("related:");
        for chunk in &response.related_chunks {
            println!("  {} [{}:{}-{}]", chunk.chunk_id, chunk.file_path, chunk.line_start, chunk.line_end);
        }
    }
}

fn run_status(root: PathBuf, explicit_config: Option<PathBuf>, output_format: OutputFormat) -> ExitCode {
    let exec_id = generate_execution_id();

    let workspace = match open_workspace(&root, explicit_config.as_deref()) {
        Ok(w) => w,
        Err(e) => return emit_startup_error(&exec_id, output_format, e),
    };

    let result = (|| -> anyhow::Result<StatusResponse> {
        let counts = workspace.metadata.count_by_status()?;
        let pending = counts.iter().find(|(s, _)| *s == FileStatus::Pending).map(|(_, n)| *n).unwrap_or(0);
        let processing = counts.iter().find(|(s, _)| *s == FileStatus::Processing).map(|(_, n)| *n).unwrap_or(0);
        let completed = counts.iter().find(|(s, _)| *s == FileStatus::Completed).map(|(_, n)| *n).unwrap_or(0);
        let failed = counts.iter().find(|(s, _)| *s == FileStatus::Failed).map(|(_, n)| *n).unwrap_or(0);

        let mut graph = SqliteGraphStore::open(&workspace.graph_path)?;
        let stats = graph.get_stats()?;

        Ok(StatusResponse {
            files_pending: pending,
            files_processing: processing,
            files_indexed: completed,
            files_failed: failed,
            chunks: stats.chunk_count,
            entities: stats.entity_count,
            relationships: stats.edge_count,
        })
    })();

    match result {
        Ok(response) => {
            match output_format {
                OutputFormat::Json => {
                    if let Err(e) = output_json(&JsonResponse::new(response, &exec_id)) {
                        eprintln!("cappy: failed to render JSON output: {e}");
                        return ExitCode::from(1);
                    }
                }
                OutputFormat::Human => {
                    println!(
                        "files: {} pending, {} processing, {} indexed, {} failed",
                        response.files_pending, response.files_processing, response.files_indexed, response.files_failed
                    );
                    println!("graph: {} chunks, {} entities, {} relationships", response.chunks, response.entities, response.relationships);
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            render_error(output_format, &exec_id, "status_failed", &e.to_string());
            ExitCode::from(1)
        }
    }
}

fn finish_and_render(
    exec_log: &ExecutionLog,
    exec_id: &str,
    output_format: OutputFormat,
    result: anyhow::Result<IndexResponse>,
) -> ExitCode {
    let outcome = if result.is_ok() { "success" } else { "error" };
    let error_msg = result.as_ref().err().map(|e| e.to_string());
    let (files_indexed, files_failed) = result.as_ref().map(|r| (r.files_indexed, r.files_failed)).unwrap_or((0, 0));
    if let Err(e) = exec_log.finish_execution(exec_id, outcome, error_msg.as_deref(), files_indexed, 0, 0) {
        eprintln!("cappy: failed to record execution finish: {e}");
    }

    match result {
        Ok(response) => {
            match output_format {
                OutputFormat::Json => {
                    if let Err(e) = output_json(&JsonResponse::new(&response, exec_id)) {
                        eprintln!("cappy: failed to render JSON output: {e}");
                        return ExitCode::from(1);
                    }
                }
                OutputFormat::Human => {
                    println!("indexed {} file(s), {} failure(s)", response.files_indexed, response.files_failed);
                }
            }
            if files_failed > 0 {
                ExitCode::from(4)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            render_error(output_format, exec_id, "indexing_failed", &e.to_string());
            ExitCode::from(1)
        }
    }
}

fn emit_startup_error(exec_id: &str, output_format: OutputFormat, error: anyhow::Error) -> ExitCode {
    render_error(output_format, exec_id, "workspace_init_failed", &error.to_string());
    ExitCode::from(2)
}

fn render_error(output_format: OutputFormat, exec_id: &str, code: &str, message: &str) {
    match output_format {
        OutputFormat::Json => {
            let response = ErrorResponse { error: code.to_string(), message: message.to_string() };
            let _ = output_json(&JsonResponse::new(response, exec_id));
        }
        OutputFormat::Human => eprintln!("cappy: {message}"),
    }
}

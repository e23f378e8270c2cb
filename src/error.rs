//! Error taxonomy for cappy.
//!
//! Application-level flows (CLI commands, orchestrator runs) use `anyhow::Result`.
//! Component boundaries that callers need to match on use these `thiserror`-derived
//! enums instead, each pinned to the stable string codes in [`crate::error_codes`].

use crate::error_codes::*;

/// Failure loading file content from disk or an inlined payload.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("[{code}] file not found: {path}", code = CAPPY_LOAD_001_NOT_FOUND)]
    NotFound { path: String },

    #[error("[{code}] file is empty: {path}", code = CAPPY_LOAD_002_EMPTY)]
    Empty { path: String },

    #[error("[{code}] file unreadable: {path}: {source}", code = CAPPY_LOAD_003_UNREADABLE)]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[{code}] inline payload is not valid base64", code = CAPPY_LOAD_004_BAD_INLINE)]
    BadInlinePayload,
}

/// Embedding provider failure. Never fatal to the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("[{code}] embedding provider failed: {0}", code = CAPPY_EMBED_001_PROVIDER_FAILED)]
    ProviderFailed(String),

    #[error("[{code}] embedding dimension mismatch: expected {expected}, got {got}", code = CAPPY_EMBED_002_DIM_MISMATCH)]
    DimensionMismatch { expected: usize, got: usize },
}

/// Vector store failure. Never fatal to the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("[{code}] vector store operation failed: {0}", code = CAPPY_VEC_001_STORE_FAILED)]
    OperationFailed(String),
}

/// Graph store failure. Fatal for the file currently being indexed.
#[derive(Debug, thiserror::Error)]
pub enum GraphStoreError {
    #[error("[{code}] graph write failed: {0}", code = CAPPY_GRAPH_001_WRITE_FAILED)]
    WriteFailed(String),

    #[error("[{code}] graph read failed: {0}", code = CAPPY_GRAPH_002_READ_FAILED)]
    ReadFailed(String),

    #[error("[{code}] graph schema migration failed: {0}", code = CAPPY_GRAPH_003_SCHEMA_MIGRATION)]
    SchemaMigration(String),
}

/// Entity extraction failure for a single chunk. Skips that chunk only.
#[derive(Debug, thiserror::Error)]
#[error("[{code}] entity extraction failed for chunk {chunk_id}: {reason}", code = CAPPY_ENTITY_001_EXTRACTION_FAILED)]
pub struct EntityExtractionError {
    pub chunk_id: String,
    pub reason: String,
}

/// Errors the Processing Queue treats as retryable, subject to `maxRetries`.
#[derive(Debug, thiserror::Error)]
pub enum RetryableError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Graph(#[from] GraphStoreError),

    #[error("[{code}] metadata db operation failed: {0}", code = CAPPY_QUEUE_002_STORAGE_FAILED)]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

/// Startup configuration failure. Process refuses to serve.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("[{code}] failed to parse config file {path}: {source}", code = CAPPY_CFG_001_PARSE_ERROR)]
    ParseError {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("[{code}] invalid config value for {key}: {reason}", code = CAPPY_CFG_002_INVALID_VALUE)]
    InvalidValue { key: String, reason: String },
}

/// Startup store/init failure. Process refuses to serve.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("[{code}] workspace root does not exist or is not a directory: {0}", code = CAPPY_INIT_001_ROOT_MISSING)]
    RootMissing(String),

    #[error("[{code}] failed to open {store}: {reason}", code = CAPPY_INIT_002_STORE_OPEN_FAILED)]
    StoreOpenFailed { store: String, reason: String },
}

/// Workspace Scanner & Watcher failure.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("[{code}] directory walk failed: {0}", code = CAPPY_SCAN_001_WALK_FAILED)]
    WalkFailed(String),

    #[error("[{code}] failed to start filesystem watcher: {0}", code = CAPPY_SCAN_002_WATCHER_START_FAILED)]
    WatcherStartFailed(String),
}

/// Retrieval Engine failure. Surfaces directly to the `search` CLI command
/// rather than through the queue/event-stream path the indexing pipeline
/// uses, since a search request has no associated file to retry.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Graph(#[from] GraphStoreError),

    #[error(transparent)]
    Vector(#[from] VectorStoreError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error("unknown search mode: {0}")]
    InvalidMode(String),
}

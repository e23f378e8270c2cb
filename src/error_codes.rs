//! Stable error code constants for cappy.
//!
//! Error codes follow the pattern: CAPPY-{CATEGORY}-{3-digit number}
//!
//! Categories map one-to-one onto the error taxonomy in [`crate::error`]:
//! LOAD, PARSE, EMBED, VEC, GRAPH, ENTITY, QUEUE, CFG, INIT.
//!
//! Each code is stable and must never be reused for a different condition.

/// Source file could not be found on disk.
pub const CAPPY_LOAD_001_NOT_FOUND: &str = "CAPPY-LOAD-001";
/// Source file exists but is zero bytes.
pub const CAPPY_LOAD_002_EMPTY: &str = "CAPPY-LOAD-002";
/// Source file exists but could not be read (permissions, I/O error).
pub const CAPPY_LOAD_003_UNREADABLE: &str = "CAPPY-LOAD-003";
/// Inlined payload was not valid base64.
pub const CAPPY_LOAD_004_BAD_INLINE: &str = "CAPPY-LOAD-004";

/// Parser produced zero chunks for a supported language (non-fatal; fallback applied).
pub const CAPPY_PARSE_001_EMPTY_RESULT: &str = "CAPPY-PARSE-001";
/// Parser encountered a syntax error it could not recover from.
pub const CAPPY_PARSE_002_SYNTAX_ERROR: &str = "CAPPY-PARSE-002";

/// Embedding provider returned an error or timed out.
pub const CAPPY_EMBED_001_PROVIDER_FAILED: &str = "CAPPY-EMBED-001";
/// Embedding dimensions did not match the configured vector store.
pub const CAPPY_EMBED_002_DIM_MISMATCH: &str = "CAPPY-EMBED-002";

/// Vector store upsert or search failed.
pub const CAPPY_VEC_001_STORE_FAILED: &str = "CAPPY-VEC-001";

/// Graph store write failed (fatal for the current file).
pub const CAPPY_GRAPH_001_WRITE_FAILED: &str = "CAPPY-GRAPH-001";
/// Graph store read failed.
pub const CAPPY_GRAPH_002_READ_FAILED: &str = "CAPPY-GRAPH-002";
/// Graph schema migration failed at startup.
pub const CAPPY_GRAPH_003_SCHEMA_MIGRATION: &str = "CAPPY-GRAPH-003";

/// Entity extraction failed for a single chunk (skipped, file still indexed).
pub const CAPPY_ENTITY_001_EXTRACTION_FAILED: &str = "CAPPY-ENTITY-001";

/// File exceeded maxRetries and was pinned to failed.
pub const CAPPY_QUEUE_001_RETRIES_EXHAUSTED: &str = "CAPPY-QUEUE-001";
/// Queue storage (File Metadata DB) failed.
pub const CAPPY_QUEUE_002_STORAGE_FAILED: &str = "CAPPY-QUEUE-002";

/// Config file could not be parsed.
pub const CAPPY_CFG_001_PARSE_ERROR: &str = "CAPPY-CFG-001";
/// Config contained an out-of-range or invalid value.
pub const CAPPY_CFG_002_INVALID_VALUE: &str = "CAPPY-CFG-002";

/// Workspace root does not exist or is not a directory.
pub const CAPPY_INIT_001_ROOT_MISSING: &str = "CAPPY-INIT-001";
/// A backing store (graph, vector, metadata db) failed to open.
pub const CAPPY_INIT_002_STORE_OPEN_FAILED: &str = "CAPPY-INIT-002";

/// Directory walk failed (permissions, I/O error) during the initial scan.
pub const CAPPY_SCAN_001_WALK_FAILED: &str = "CAPPY-SCAN-001";
/// The filesystem watcher failed to start.
pub const CAPPY_SCAN_002_WATCHER_START_FAILED: &str = "CAPPY-SCAN-002";

/// Documentation table for all error codes, keyed by code string.
///
/// # Load Errors (CAPPY-LOAD-*)
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | CAPPY-LOAD-001 | File not found | Re-scan the workspace; the path may have been deleted |
/// | CAPPY-LOAD-002 | File is empty | No chunks can be produced; file is marked failed |
/// | CAPPY-LOAD-003 | File unreadable | Check filesystem permissions |
/// | CAPPY-LOAD-004 | Inline payload not valid base64 | Check the upload encoding |
///
/// # Parse Errors (CAPPY-PARSE-*)
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | CAPPY-PARSE-001 | Parser produced no chunks | Fallback whole-file chunk is synthesized |
/// | CAPPY-PARSE-002 | Syntax error | Non-fatal; treated as empty parse |
///
/// # Embedding/Vector Errors (CAPPY-EMBED-*, CAPPY-VEC-*)
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | CAPPY-EMBED-001 | Embedding provider failed | Chunk is written without a vector |
/// | CAPPY-EMBED-002 | Dimension mismatch | Check `embeddings.dimensions` config |
/// | CAPPY-VEC-001 | Vector store write/search failed | Logged; retrieval falls back to lexical |
///
/// # Graph Errors (CAPPY-GRAPH-*)
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | CAPPY-GRAPH-001 | Write failed | Fatal for the file; it is marked failed and retried |
/// | CAPPY-GRAPH-002 | Read failed | Surfaced to the caller of the failing query |
/// | CAPPY-GRAPH-003 | Schema migration failed | Process refuses to serve |
///
/// # Entity Errors (CAPPY-ENTITY-*)
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | CAPPY-ENTITY-001 | Extraction failed for a chunk | That chunk's entities are skipped |
///
/// # Queue Errors (CAPPY-QUEUE-*)
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | CAPPY-QUEUE-001 | Retries exhausted | File pinned to failed; inspect errorMessage |
/// | CAPPY-QUEUE-002 | Metadata DB write failed | Check disk space / file permissions |
///
/// # Config/Init Errors (CAPPY-CFG-*, CAPPY-INIT-*)
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | CAPPY-CFG-001 | Config file parse error | Fix the TOML syntax |
/// | CAPPY-CFG-002 | Invalid config value | Check the Glossary for valid ranges |
/// | CAPPY-INIT-001 | Workspace root missing | Pass an existing directory |
/// | CAPPY-INIT-002 | Store failed to open | Check the `databases.*` paths are writable |
pub const ERROR_CODE_DOCUMENTATION: &str = "see doc comment on this constant's module";

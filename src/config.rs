//! Typed configuration, layered over built-in defaults.
//!
//! Loaded from an optional TOML file (`cappy.toml` at the workspace root, a path
//! given via `--config`, or the `CAPPY_CONFIG` env var) layered over built-in
//! defaults for every recognized key. A malformed file is a [`ConfigError`]
//! surfaced at startup; the process refuses to serve.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root configuration object, one per process (owned by the Workspace).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub indexing: IndexingConfig,
    pub embeddings: EmbeddingsConfig,
    pub databases: DatabasesConfig,
    pub queue: QueueConfig,
    pub watch: WatchConfig,
    pub retrieval: RetrievalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            indexing: IndexingConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            databases: DatabasesConfig::default(),
            queue: QueueConfig::default(),
            watch: WatchConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexingConfig {
    /// File extensions/languages eligible for indexing; empty = all languages in the table.
    pub enabled_file_types: Vec<String>,
    pub chunking: ChunkingConfig,
    pub llm: LlmConfig,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            enabled_file_types: Vec::new(),
            chunking: ChunkingConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub typescript: TypeScriptChunkingConfig,
    pub markdown: MarkdownChunkingConfig,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            typescript: TypeScriptChunkingConfig::default(),
            markdown: MarkdownChunkingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TypeScriptChunkingConfig {
    pub extract_jsdoc: bool,
    pub extract_code: bool,
}

impl Default for TypeScriptChunkingConfig {
    fn default() -> Self {
        Self {
            extract_jsdoc: true,
            extract_code: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarkdownChunkingConfig {
    pub strategy: String,
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    pub respect_headers: bool,
}

impl Default for MarkdownChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: "hybrid".to_string(),
            max_tokens: 400,
            overlap_tokens: 50,
            respect_headers: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled_for: LlmEnabledFor,
    pub batch_size: usize,
    pub max_tokens_per_request: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled_for: LlmEnabledFor::default(),
            batch_size: 16,
            max_tokens_per_request: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmEnabledFor {
    pub typescript: bool,
    pub javascript: bool,
    pub markdown: bool,
}

impl Default for LlmEnabledFor {
    fn default() -> Self {
        // Default lexical provider runs regardless; this gate is for a richer,
        // pluggable (e.g. LLM-backed) entity provider.
        Self {
            typescript: false,
            javascript: false,
            markdown: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: "cappy-lexical-hash-v1".to_string(),
            dimensions: 256,
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabasesConfig {
    pub graph: GraphDbConfig,
    pub vectors: VectorDbConfig,
    pub metadata: MetadataDbConfig,
}

impl Default for DatabasesConfig {
    fn default() -> Self {
        Self {
            graph: GraphDbConfig::default(),
            vectors: VectorDbConfig::default(),
            metadata: MetadataDbConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorDbConfig {
    pub path: String,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            path: ".cappy/vectors.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetadataDbConfig {
    pub path: String,
}

impl Default for MetadataDbConfig {
    fn default() -> Self {
        Self {
            path: ".cappy/metadata.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphDbConfig {
    pub path: String,
    pub buffer_pool_size: String,
}

impl Default for GraphDbConfig {
    fn default() -> Self {
        Self {
            path: ".cappy/graph.db".to_string(),
            buffer_pool_size: "64MB".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_delay_millis: u64,
    /// Whether the worker pool starts pulling from the queue as soon as the
    /// workspace opens, vs. waiting for an explicit start.
    pub auto_start: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_retries: 3,
            retry_delay_millis: 500,
            auto_start: true,
        }
    }
}

/// Workspace Scanner & Watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    /// Debounce window for coalescing filesystem events into one batch.
    /// Defaults to 300ms, since cappy's per-file pipeline is cheaper than
    /// full symbol re-indexing and can afford to react faster.
    pub debounce_millis: u64,
    /// Honor `.gitignore`/`.ignore`/`.cappyignore` when scanning and watching.
    pub gitignore_aware: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_millis: 300,
            gitignore_aware: true,
        }
    }
}

/// Retrieval Engine and Content Loader & LOD settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub graph_expansion_hops: usize,
    pub snippet_cache_capacity: usize,
    /// Node count above which LOD simplification (hide low-weight edges) kicks in.
    pub lod_simplify_threshold: usize,
    /// Node count above which LOD clustering (synthesize Cluster nodes) kicks in.
    pub lod_cluster_threshold: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 10,
            graph_expansion_hops: 2,
            snippet_cache_capacity: 100,
            lod_simplify_threshold: 30,
            lod_cluster_threshold: 70,
        }
    }
}

impl Config {
    /// Load config: optional TOML file, else built-in defaults.
    ///
    /// Resolution order for the file path: `explicit_path` argument, then the
    /// `CAPPY_CONFIG` environment variable, then `<workspace_root>/cappy.toml`.
    /// A missing file at any of those locations is not an error — defaults apply.
    pub fn load(workspace_root: &Path, explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let candidate = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("CAPPY_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| workspace_root.join("cappy.toml"));

        if !candidate.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&candidate).map_err(|e| ConfigError::ParseError {
            path: candidate.display().to_string(),
            source: toml::de::Error::custom(e.to_string()),
        })?;

        let config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: candidate.display().to_string(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "queue.concurrency".to_string(),
                reason: "must be >= 1".to_string(),
            });
        }
        if self.embeddings.dimensions == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embeddings.dimensions".to_string(),
                reason: "must be >= 1".to_string(),
            });
        }
        if self.indexing.chunking.markdown.strategy != "hybrid" {
            return Err(ConfigError::InvalidValue {
                key: "indexing.chunking.markdown.strategy".to_string(),
                reason: "only 'hybrid' is supported".to_string(),
            });
        }
        Ok(())
    }
}

// `toml::de::Error` has no public constructor outside of parsing; this trait
// gives us one for wrapping plain I/O errors under the same error shape.
trait CustomTomlError {
    fn custom(msg: String) -> toml::de::Error;
}

impl CustomTomlError for toml::de::Error {
    fn custom(msg: String) -> toml::de::Error {
        // toml::de::Error implements Deserialize-error conventions; the only
        // stable public constructor is via serde::de::Error.
        <toml::de::Error as serde::de::Error>::custom(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = Config::default();
        assert_eq!(config.queue.concurrency, 2);
        assert_eq!(config.embeddings.dimensions, 256);
        assert_eq!(config.indexing.chunking.markdown.strategy, "hybrid");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path(), None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn loads_overrides_from_toml() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("cappy.toml"),
            r#"
            [queue]
            concurrency = 4
            max_retries = 5

            [embeddings]
            dimensions = 128
            "#,
        )
        .unwrap();

        let config = Config::load(dir.path(), None).unwrap();
        assert_eq!(config.queue.concurrency, 4);
        assert_eq!(config.queue.max_retries, 5);
        assert_eq!(config.embeddings.dimensions, 128);
        // Untouched sections keep their defaults.
        assert_eq!(config.indexing.chunking.markdown.max_tokens, 400);
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cappy.toml"), "not valid = [[[").unwrap();
        let err = Config::load(dir.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cappy.toml"), "[queue]\nconcurrency = 0\n").unwrap();
        let err = Config::load(dir.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}

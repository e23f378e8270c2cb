//! Chunk Model: the uniform unit parsers emit.
//!
//! A chunk is immutable once emitted by a parser; the Orchestrator may attach
//! a vector to it before writing, but never mutates its range or content.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Semantic kind of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Jsdoc,
    Code,
    MarkdownSection,
    DocumentSection,
    HtmlBlock,
    ConfigBlock,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Jsdoc => "jsdoc",
            ChunkType::Code => "code",
            ChunkType::MarkdownSection => "markdown_section",
            ChunkType::DocumentSection => "document_section",
            ChunkType::HtmlBlock => "html_block",
            ChunkType::ConfigBlock => "config_block",
        }
    }

    /// Chunk types eligible for entity discovery.
    pub fn is_entity_eligible(&self) -> bool {
        matches!(
            self,
            ChunkType::Jsdoc | ChunkType::MarkdownSection | ChunkType::DocumentSection
        )
    }
}

/// Symbol kind attached to a chunk when it corresponds to a named declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Type,
    Variable,
    Heading,
    Other,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
            SymbolKind::Variable => "variable",
            SymbolKind::Heading => "heading",
            SymbolKind::Other => "other",
        }
    }
}

/// Metadata accompanying a chunk's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_path: String,
    pub line_start: usize,
    pub line_end: usize,
    pub chunk_type: ChunkType,
    pub symbol_name: Option<String>,
    pub symbol_kind: Option<SymbolKind>,
    pub language: Option<String>,
    /// Free-form extra properties (e.g. heading level) not worth a dedicated field.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A contiguous, semantically-typed slice of a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl Chunk {
    /// Construct a chunk, deriving its id from `(path, lineStart, lineEnd)`.
    pub fn new(
        path: &str,
        line_start: usize,
        line_end: usize,
        chunk_type: ChunkType,
        content: String,
    ) -> Self {
        Self {
            id: chunk_id(path, line_start, line_end),
            content,
            metadata: ChunkMetadata {
                file_path: path.to_string(),
                line_start,
                line_end,
                chunk_type,
                symbol_name: None,
                symbol_kind: None,
                language: None,
                extra: serde_json::Map::new(),
            },
            vector: None,
        }
    }

    pub fn with_symbol(mut self, name: impl Into<String>, kind: SymbolKind) -> Self {
        self.metadata.symbol_name = Some(name.into());
        self.metadata.symbol_kind = Some(kind);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.metadata.language = Some(language.into());
        self
    }

    pub fn with_extra(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.extra.insert(key.to_string(), value);
        self
    }
}

/// `chunk:<basename>:<lineStart>-<lineEnd>`, ASCII.
///
/// Uniqueness per file holds because parsers never emit overlapping ranges
/// (invariant checked by property tests in `tests/chunk_id_tests.rs`).
pub fn chunk_id(path: &str, line_start: usize, line_end: usize) -> String {
    let basename = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path);
    format!("chunk:{basename}:{line_start}-{line_end}")
}

//! Node and edge payloads persisted into the labeled property graph.

use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkType, SymbolKind};

/// `File` node payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNodeData {
    pub path: String,
    pub hash: String,
    pub last_indexed_at: i64,
    pub last_modified: i64,
    pub lines_of_code: usize,
    pub language: Option<String>,
}

/// `Chunk` node payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkNodeData {
    pub chunk_id: String,
    pub file_path: String,
    pub line_start: usize,
    pub line_end: usize,
    pub chunk_type: ChunkType,
    pub symbol_name: Option<String>,
    pub symbol_kind: Option<SymbolKind>,
    pub content: String,
}

/// `Entity` node payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityNodeData {
    pub canonical_id: String,
    pub entity_type: String,
    pub confidence: f32,
    pub source_chunk_ids: Vec<String>,
    pub merged_from: Vec<String>,
}

/// Relationship kinds persisted as sqlitegraph edge types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Contains,
    Documents,
    Imports,
    ImportsSymbol,
    References,
    Mentions,
    DefinedIn,
    HasChunk,
    LinksTo,
    PartOf,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Contains => "CONTAINS",
            EdgeKind::Documents => "DOCUMENTS",
            EdgeKind::Imports => "IMPORTS",
            EdgeKind::ImportsSymbol => "IMPORTS_SYMBOL",
            EdgeKind::References => "REFERENCES",
            EdgeKind::Mentions => "MENTIONS",
            EdgeKind::DefinedIn => "DEFINED_IN",
            EdgeKind::HasChunk => "HAS_CHUNK",
            EdgeKind::LinksTo => "LINKS_TO",
            EdgeKind::PartOf => "PART_OF",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "CONTAINS" => EdgeKind::Contains,
            "DOCUMENTS" => EdgeKind::Documents,
            "IMPORTS" => EdgeKind::Imports,
            "IMPORTS_SYMBOL" => EdgeKind::ImportsSymbol,
            "REFERENCES" => EdgeKind::References,
            "MENTIONS" => EdgeKind::Mentions,
            "DEFINED_IN" => EdgeKind::DefinedIn,
            "HAS_CHUNK" => EdgeKind::HasChunk,
            "LINKS_TO" => EdgeKind::LinksTo,
            "PART_OF" => EdgeKind::PartOf,
            _ => return None,
        })
    }
}

/// One relationship as returned by sampling/listing queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub from_id: String,
    pub to_id: String,
    pub kind: EdgeKind,
}

/// Aggregate graph counts, used by the `status` command.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphStats {
    pub file_count: usize,
    pub chunk_count: usize,
    pub entity_count: usize,
    pub edge_count: usize,
}

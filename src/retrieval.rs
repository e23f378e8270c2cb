//! Retrieval Engine: hybrid vector + graph search over an already-indexed
//! workspace.
//!
//! Stateless by design — it holds no caches of its own (the Content Loader's
//! LRU is a separate collaborator) and never writes to any store. Widens
//! exact-name symbol lookup into similarity-plus-traversal retrieval over
//! chunks.

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::RetrievalConfig;
use crate::embeddings::EmbeddingService;
use crate::error::SearchError;
use crate::graph::schema::{ChunkNodeData, EntityNodeData, Relationship};
use crate::graph::GraphStore;
use crate::vector_store::VectorStore;

/// Which of the search algorithm's steps a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Step 1 + 3 only: top-k vector/lexical search, no graph expansion.
    Local,
    /// Graph expansion from all known entities; no vector anchor.
    Global,
    /// Step 1 + 2: vector/lexical anchor, then k-hop graph expansion.
    Hybrid,
    /// Steps 1-4: anchor, expansion, and entity/relationship enrichment.
    Mix,
}

impl SearchMode {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.to_lowercase().as_str() {
            "local" => SearchMode::Local,
            "global" => SearchMode::Global,
            "hybrid" => SearchMode::Hybrid,
            "mix" => SearchMode::Mix,
            _ => return None,
        })
    }
}

/// `{query, mode, k?, depth?}` request shape.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    pub k: Option<usize>,
    pub depth: Option<usize>,
}

/// A chunk as returned to a search caller; a flattened, serializable view of
/// [`ChunkNodeData`] plus the score that ranked it (direct matches only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchChunk {
    pub chunk_id: String,
    pub file_path: String,
    pub line_start: usize,
    pub line_end: usize,
    pub chunk_type: String,
    pub symbol_name: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl SearchChunk {
    fn from_node(node: ChunkNodeData, score: Option<f32>) -> Self {
        Self {
            chunk_id: node.chunk_id,
            file_path: node.file_path,
            line_start: node.line_start,
            line_end: node.line_end,
            chunk_type: node.chunk_type.as_str().to_string(),
            symbol_name: node.symbol_name,
            content: node.content,
            score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchTotals {
    pub direct_matches: usize,
    pub related_chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub direct_matches: Vec<SearchChunk>,
    pub related_chunks: Vec<SearchChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<EntityNodeData>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Vec<Relationship>>,
    pub processing_millis: u64,
    pub totals: SearchTotals,
}

/// Runs the hybrid search algorithm against a live [`GraphStore`], with an optional
/// [`VectorStore`]/[`EmbeddingService`] pair. Construction takes only the
/// defaults from config; every call is otherwise independent.
pub struct RetrievalEngine {
    default_top_k: usize,
    default_depth: usize,
}

impl RetrievalEngine {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            default_top_k: config.default_top_k,
            default_depth: config.graph_expansion_hops,
        }
    }

    pub fn search(
        &self,
        request: &SearchRequest,
        graph: &mut dyn GraphStore,
        vectors: Option<&dyn VectorStore>,
        embedder: Option<&dyn EmbeddingService>,
    ) -> Result<SearchResponse, SearchError> {
        let start = Instant::now();
        let k = request.k.unwrap_or(self.default_top_k);
        let depth = request.depth.unwrap_or(self.default_depth);

        let (direct, related) = match request.mode {
            SearchMode::Local => {
                let direct = self.anchor_chunks(&request.query, k, graph, vectors, embedder)?;
                (direct, Vec::new())
            }
            SearchMode::Global => {
                let direct = self.entity_anchored_chunks(&request.query, k, graph)?;
                let related = self.expand(&direct, depth, graph)?;
                (direct, related)
            }
            SearchMode::Hybrid => {
                let direct = self.anchor_chunks(&request.query, k, graph, vectors, embedder)?;
                let related = self.expand(&direct, depth, graph)?;
                (direct, related)
            }
            SearchMode::Mix => {
                let direct = self.anchor_chunks(&request.query, k, graph, vectors, embedder)?;
                let related = self.expand(&direct, depth, graph)?;
                (direct, related)
            }
        };

        let (entities, relationships) = if matches!(request.mode, SearchMode::Mix) {
            let mut all_ids: Vec<String> = direct.iter().map(|c| c.chunk_id.clone()).collect();
            all_ids.extend(related.iter().map(|c| c.chunk_id.clone()));
            let (entities, relationships) = graph.get_entities_for_chunks(&all_ids)?;
            (Some(entities), Some(relationships))
        } else {
            (None, None)
        };

        let totals = SearchTotals { direct_matches: direct.len(), related_chunks: related.len() };

        Ok(SearchResponse {
            direct_matches: direct
                .into_iter()
                .map(|(chunk, score)| SearchChunk::from_node(chunk, score))
                .collect(),
            related_chunks: related
                .into_iter()
                .map(|(chunk, score)| SearchChunk::from_node(chunk, score))
                .collect(),
            entities,
            relationships,
            processing_millis: start.elapsed().as_millis() as u64,
            totals,
        })
    }

    /// Step 1 (+ 3): vector top-k if a store is configured, else the lexical
    /// bag-of-terms reranker over every indexed chunk.
    fn anchor_chunks(
        &self,
        query: &str,
        k: usize,
        graph: &mut dyn GraphStore,
        vectors: Option<&dyn VectorStore>,
        embedder: Option<&dyn EmbeddingService>,
    ) -> Result<Vec<(ChunkNodeData, Option<f32>)>, SearchError> {
        if let (Some(store), Some(embedder)) = (vectors, embedder) {
            let query_vector = embedder.embed(query)?;
            let hits = store.query(&query_vector, k)?;
            let ids: Vec<String> = hits.iter().map(|h| h.chunk_id.clone()).collect();
            let nodes = graph.get_chunks_by_ids(&ids)?;
            // get_chunks_by_ids does not preserve caller order; reorder to the
            // vector store's ranking (already deterministic: score desc, then
            // chunk id asc).
            let mut by_id: std::collections::HashMap<String, ChunkNodeData> =
                nodes.into_iter().map(|n| (n.chunk_id.clone(), n)).collect();
            let mut out = Vec::new();
            for hit in hits {
                if let Some(node) = by_id.remove(&hit.chunk_id) {
                    out.push((node, Some(hit.score)));
                }
            }
            return Ok(out);
        }

        Ok(lexical_search(query, k, graph)?)
    }

    /// Graph expansion (step 2): structural k-hop traversal from each anchor,
    /// unioned with chunks that share an entity with an anchor (treated as a
    /// single conceptual hop regardless of how many structural edges actually
    /// separate the two chunks — see the design decision in `DESIGN.md`).
    fn expand(
        &self,
        anchors: &[(ChunkNodeData, Option<f32>)],
        depth: usize,
        graph: &mut dyn GraphStore,
    ) -> Result<Vec<(ChunkNodeData, Option<f32>)>, SearchError> {
        if depth == 0 || anchors.is_empty() {
            return Ok(Vec::new());
        }

        let anchor_ids: Vec<String> = anchors.iter().map(|(c, _)| c.chunk_id.clone()).collect();
        let anchor_set: HashSet<&str> = anchor_ids.iter().map(|s| s.as_str()).collect();

        let mut seen: HashSet<String> = HashSet::new();
        let mut related = Vec::new();

        for anchor_id in &anchor_ids {
            for chunk in graph.get_related_chunks(anchor_id, depth)? {
                if anchor_set.contains(chunk.chunk_id.as_str()) {
                    continue;
                }
                if seen.insert(chunk.chunk_id.clone()) {
                    related.push((chunk, None));
                }
            }
        }

        let (entities, _) = graph.get_entities_for_chunks(&anchor_ids)?;
        if !entities.is_empty() {
            let entity_ids: Vec<String> = entities.iter().map(|e| e.canonical_id.clone()).collect();
            for chunk in graph.get_chunks_mentioning_entities(&entity_ids)? {
                if anchor_set.contains(chunk.chunk_id.as_str()) {
                    continue;
                }
                if seen.insert(chunk.chunk_id.clone()) {
                    related.push((chunk, None));
                }
            }
        }

        related.sort_by(|a, b| a.0.chunk_id.cmp(&b.0.chunk_id));
        Ok(related)
    }

    /// `global` mode's anchor: entities whose canonical id contains a query
    /// term, widened to every chunk that mentions one of them.
    fn entity_anchored_chunks(
        &self,
        query: &str,
        k: usize,
        graph: &mut dyn GraphStore,
    ) -> Result<Vec<(ChunkNodeData, Option<f32>)>, SearchError> {
        let terms = tokenize(query);
        let matching: Vec<String> = graph
            .list_all_entities()?
            .into_iter()
            .filter(|e| terms.iter().any(|t| e.canonical_id.to_lowercase().contains(t.as_str())))
            .map(|e| e.canonical_id)
            .collect();

        if matching.is_empty() {
            return Ok(Vec::new());
        }

        let mut chunks = graph.get_chunks_mentioning_entities(&matching)?;
        chunks.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        chunks.truncate(k);
        Ok(chunks.into_iter().map(|c| (c, None)).collect())
    }
}

/// Case-insensitive term match count plus a proximity bonus for chunks that
/// contain every query term at least once, used when no vector store is
/// configured. Ties break by chunk id ascending.
fn lexical_search(
    query: &str,
    k: usize,
    graph: &mut dyn GraphStore,
) -> Result<Vec<(ChunkNodeData, Option<f32>)>, SearchError> {
    let terms = tokenize(query);
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let mut scored: Vec<(ChunkNodeData, f32)> = Vec::new();
    for path in graph.list_all_files()? {
        for chunk in graph.get_file_chunks(&path)? {
            let lower = chunk.content.to_lowercase();
            let mut hits = 0usize;
            let mut terms_present = 0usize;
            for term in &terms {
                let count = lower.matches(term.as_str()).count();
                if count > 0 {
                    hits += count;
                    terms_present += 1;
                }
            }
            if hits == 0 {
                continue;
            }
            let proximity_bonus = if terms_present == terms.len() { 1.0 } else { 0.0 };
            scored.push((chunk, hits as f32 + proximity_bonus));
        }
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.chunk_id.cmp(&b.0.chunk_id))
    });
    scored.truncate(k);
    Ok(scored.into_iter().map(|(chunk, score)| (chunk, Some(score))).collect())
}

fn tokenize(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, ChunkType, SymbolKind};
    use crate::graph::schema::{EntityNodeData, FileNodeData};
    use crate::graph::SqliteGraphStore;

    fn sample_file(path: &str) -> FileNodeData {
        FileNodeData {
            path: path.to_string(),
            hash: "h".to_string(),
            last_indexed_at: 0,
            last_modified: 0,
            lines_of_code: 5,
            language: Some("markdown".to_string()),
        }
    }

    /// Graph-level fixture, not a pipeline-derived one: it seeds both chunks'
    /// `MENTIONS` edges to `concept:authentication` directly via
    /// `link_chunk_to_entity`, to exercise the retrieval engine's
    /// entity-bridge traversal (`get_entities_for_chunks` +
    /// `get_chunks_mentioning_entities`) in isolation from indexing. The real
    /// pipeline reaches the same shape a different way: `auth.ts`'s
    /// `function authenticate` chunk is plain `ChunkType::Code` with no
    /// preceding jsdoc, so `EntityResolver::is_eligible` (§4.8) never offers
    /// it to entity discovery directly, but `symbol_definition_bridge`
    /// (`src/entities.rs`) links it to an already-discovered entity via
    /// `DEFINED_IN` instead, which this traversal treats the same as
    /// `MENTIONS`. See `src/orchestrator.rs`'s
    /// `bare_declaration_bridges_to_entity_discovered_in_another_file` for
    /// the end-to-end version of this scenario, and DESIGN.md's H entry.
    fn seeded_store() -> SqliteGraphStore {
        let mut store = SqliteGraphStore::open(":memory:").unwrap();
        store.create_file_node(sample_file("doc.md")).unwrap();
        store.create_file_node(sample_file("auth.ts")).unwrap();

        let doc_chunk = Chunk::new("doc.md", 1, 2, ChunkType::MarkdownSection, "## authentication\nhow logins work".to_string());
        let code_chunk = Chunk::new("auth.ts", 1, 3, ChunkType::Code, "function authenticate() {}".to_string())
            .with_symbol("authenticate", SymbolKind::Function);
        store.create_chunk_nodes("doc.md", &[doc_chunk.clone()]).unwrap();
        store.create_chunk_nodes("auth.ts", &[code_chunk.clone()]).unwrap();

        store
            .upsert_entity_node(EntityNodeData {
                canonical_id: "concept:authentication".to_string(),
                entity_type: "concept".to_string(),
                confidence: 0.9,
                source_chunk_ids: vec![doc_chunk.id.clone()],
                merged_from: Vec::new(),
            })
            .unwrap();
        store.link_chunk_to_entity(&doc_chunk.id, "concept:authentication").unwrap();
        store.link_chunk_to_entity(&code_chunk.id, "concept:authentication").unwrap();

        store
    }

    #[test]
    fn lexical_search_ranks_by_term_count_then_chunk_id() {
        let mut store = seeded_store();
        let results = lexical_search("authentication", 10, &mut store).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].0.file_path, "doc.md");
    }

    #[test]
    fn local_mode_returns_no_related_chunks() {
        let mut store = seeded_store();
        let engine = RetrievalEngine::new(&RetrievalConfig::default());
        let request = SearchRequest { query: "authentication".to_string(), mode: SearchMode::Local, k: Some(1), depth: Some(1) };
        let response = engine.search(&request, &mut store, None, None).unwrap();
        assert_eq!(response.direct_matches.len(), 1);
        assert!(response.related_chunks.is_empty());
        assert!(response.entities.is_none());
    }

    #[test]
    fn mix_mode_traverses_entity_bridge_between_hand_linked_chunks() {
        let mut store = seeded_store();
        let engine = RetrievalEngine::new(&RetrievalConfig::default());
        let request = SearchRequest { query: "authentication".to_string(), mode: SearchMode::Mix, k: Some(1), depth: Some(1) };
        let response = engine.search(&request, &mut store, None, None).unwrap();

        assert_eq!(response.direct_matches.len(), 1);
        assert_eq!(response.direct_matches[0].file_path, "doc.md");
        assert!(response.related_chunks.iter().any(|c| c.file_path == "auth.ts"));
        assert!(response.entities.is_some());
        assert!(!response.entities.unwrap().is_empty());
    }

    #[test]
    fn global_mode_anchors_on_matching_entities() {
        let mut store = seeded_store();
        let engine = RetrievalEngine::new(&RetrievalConfig::default());
        let request = SearchRequest { query: "authentication".to_string(), mode: SearchMode::Global, k: Some(10), depth: Some(1) };
        let response = engine.search(&request, &mut store, None, None).unwrap();

        let paths: Vec<&str> = response.direct_matches.iter().map(|c| c.file_path.as_str()).collect();
        assert!(paths.contains(&"doc.md"));
        assert!(paths.contains(&"auth.ts"));
    }

    #[test]
    fn search_mode_parses_known_values_only() {
        assert_eq!(SearchMode::parse("hybrid"), Some(SearchMode::Hybrid));
        assert_eq!(SearchMode::parse("MIX"), Some(SearchMode::Mix));
        assert_eq!(SearchMode::parse("nonsense"), None);
    }
}

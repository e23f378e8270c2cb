//! Indexing Orchestrator: the per-file transactional sequence
//! that drives every other component to turn one file's bytes into graph
//! nodes, edges, and (optionally) vectors.
//!
//! The sequence is hash compare -> delete-old-facts-if-changed -> parse ->
//! insert nodes -> insert edges, applied to the chunk/entity/relationship
//! model here. `sqlitegraph`'s backend handle offers no explicit transaction
//! boundary through the `GraphStore` trait, so per-file atomicity instead
//! rests on the write semantics already built into the graph store: chunk
//! replacement is delete-then-insert and edge inserts are idempotent, so a
//! crash mid-file converges to a consistent state on retry rather than
//! needing a wrapping
//! `IMMEDIATE` transaction.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::config::MarkdownChunkingConfig;
use crate::content::ContentStore;
use crate::embeddings::EmbeddingService;
use crate::entities::{EntityResolver, LexicalEntityProvider};
use crate::error::RetryableError;
use crate::events::{EventPublisher, IndexEvent};
use crate::graph::schema::{EdgeKind, FileNodeData};
use crate::graph::{GraphStore, SqliteGraphStore};
use crate::metadata_db::FileMetadataDb;
use crate::parsers::ParserRegistry;
use crate::relations::{documents_edges, RelationshipExtractor};
use crate::vector_store::VectorStore;

/// Outcome of one full pass through [`Orchestrator::process_file`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub chunks_count: u32,
    pub nodes_count: u32,
    pub relationships_count: u32,
    pub duration_millis: u64,
}

/// Owns every component the per-file pipeline touches. Not `Send`: it embeds
/// [`SqliteGraphStore`] (`Rc`-based) and [`ParserRegistry`]/
/// [`RelationshipExtractor`] (tree-sitter parsers, also `!Send`); one
/// Orchestrator lives on one worker thread for its whole lifetime.
pub struct Orchestrator {
    content: ContentStore,
    parsers: ParserRegistry,
    relations: RelationshipExtractor,
    entities: EntityResolver<LexicalEntityProvider>,
    embeddings: Option<Arc<dyn EmbeddingService>>,
    vectors: Option<Arc<dyn VectorStore>>,
    graph: SqliteGraphStore,
    metadata: Arc<FileMetadataDb>,
    markdown_cfg: MarkdownChunkingConfig,
}

impl Orchestrator {
    pub fn new(
        content: ContentStore,
        parsers: ParserRegistry,
        relations: RelationshipExtractor,
        entities: EntityResolver<LexicalEntityProvider>,
        embeddings: Option<Arc<dyn EmbeddingService>>,
        vectors: Option<Arc<dyn VectorStore>>,
        graph: SqliteGraphStore,
        metadata: Arc<FileMetadataDb>,
        markdown_cfg: MarkdownChunkingConfig,
    ) -> Self {
        Self {
            content,
            parsers,
            relations,
            entities,
            embeddings,
            vectors,
            graph,
            metadata,
            markdown_cfg,
        }
    }

    /// Run the full sequence for one file, reporting progress via `events`
    /// and the metadata DB as it goes. Progress values are the monotonic
    /// checkpoints of the per-file contract; steps 7 and 11 are folded into
    /// 5 and 9 respectively since F already emits `CONTAINS` while inserting
    /// chunks, and the relationship extractor already resolves imports
    /// against the live `listAllFiles()` snapshot it is handed.
    pub fn process_file(
        &mut self,
        file_id: &str,
        file_path: &str,
        inline_payload: Option<&str>,
        events: &EventPublisher,
    ) -> Result<ProcessingResult, RetryableError> {
        let start = Instant::now();
        events.publish(IndexEvent::FileStart { file_id: file_id.to_string(), path: file_path.to_string() });

        let mut nodes_count: u32 = 0;
        let mut relationships_count: u32 = 0;

        // 1. 5% Load via the Content Store.
        self.progress(file_id, 5, "load", events);
        let loaded = self.content.load(file_path, inline_payload)?;

        // 2. 10% Hash is already computed by the load step.
        self.progress(file_id, 10, "hash", events);

        // 3. 30% Parse via the Parser Registry; it synthesizes the fallback
        // whole-file chunk itself when a supported language yields nothing.
        self.progress(file_id, 30, "parse", events);
        let text = String::from_utf8_lossy(&loaded.content).into_owned();
        let chunks: Vec<Chunk> = self.parsers.parse(file_path, &text, loaded.language, &self.markdown_cfg);

        // 4. 50% Create the File node before any chunk exists, so a
        // concurrently-processing file can already resolve an import edge
        // pointing here.
        self.progress(file_id, 50, "create_file_node", events);
        let last_modified = std::fs::metadata(&loaded.absolute_path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.graph.create_file_node(FileNodeData {
            path: file_path.to_string(),
            hash: loaded.hash.clone(),
            last_indexed_at: chrono::Utc::now().timestamp(),
            last_modified,
            lines_of_code: crate::content::count_lines(&loaded.content),
            language: Some(loaded.language.as_str().to_string()),
        })?;
        nodes_count += 1;

        // 5. 55% Create chunk nodes (and their CONTAINS edges, step 7).
        self.progress(file_id, 55, "create_chunk_nodes", events);
        self.graph.create_chunk_nodes(file_path, &chunks)?;
        nodes_count += chunks.len() as u32;
        relationships_count += chunks.len() as u32;

        // 6. 60% Embeddings, if configured. Failure here is non-fatal to the file.
        self.progress(file_id, 60, "embed", events);
        let mut chunks = chunks;
        if let (Some(embeddings), Some(vectors)) = (&self.embeddings, &self.vectors) {
            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            match embeddings.embed_batch(&texts) {
                Ok(vecs) => {
                    for (chunk, vector) in chunks.iter_mut().zip(vecs.into_iter()) {
                        if let Err(e) = vectors.upsert(&chunk.id, file_path, &vector) {
                            eprintln!("cappy: vector upsert failed for {}: {e}", chunk.id);
                        }
                        chunk.vector = Some(vector);
                    }
                }
                Err(e) => eprintln!("cappy: embedding batch failed for {file_path}: {e}"),
            }
        }

        // 8. 70% DOCUMENTS edges for matched jsdoc/code pairs.
        self.progress(file_id, 70, "documents", events);
        for (jsdoc_id, code_id) in documents_edges(&chunks) {
            self.graph.create_relationship(&jsdoc_id, &code_id, EdgeKind::Documents)?;
            relationships_count += 1;
        }

        // 9. 75% Run the Relationship Extractor; step 11 (incremental import
        // resolution) folds in here since `extract` already resolves against
        // the live `listAllFiles()` snapshot passed in.
        self.progress(file_id, 75, "extract_relationships", events);
        let known_files = self.graph.list_all_files()?;
        let extracted = self.relations.extract(file_path, &text, &chunks, &known_files);

        for (source, target) in extracted.imports {
            self.graph.create_relationship(&source, &target, EdgeKind::Imports)?;
            relationships_count += 1;
        }
        for (source_chunk_id, target_path, named_symbol) in extracted.pending_symbol_imports {
            let target_chunks = self.graph.get_file_chunks(&target_path)?;
            let Some(target_chunk) = target_chunks
                .iter()
                .find(|c| c.symbol_name.as_deref() == Some(named_symbol.as_str()))
            else {
                continue;
            };
            self.graph.create_relationship(&source_chunk_id, &target_chunk.chunk_id, EdgeKind::ImportsSymbol)?;
            relationships_count += 1;
        }

        // 10. 85% Entity discovery + resolution over eligible chunks.
        self.progress(file_id, 85, "entities", events);
        for chunk in &chunks {
            let (accepted, relationships) = self.entities.process_chunk(chunk);
            let mut resolved_here: Vec<(String, String)> = Vec::new();

            for (canonical_key, display_name, entity_type, confidence) in accepted {
                self.graph
                    .resolve_entity(&canonical_key, entity_type.as_str(), confidence, &chunk.id)?;
                self.graph.link_chunk_to_entity(&chunk.id, &canonical_key)?;
                relationships_count += 1;
                nodes_count += 1;
                resolved_here.push((display_name, canonical_key));
            }

            for rel in relationships {
                let Some(kind) = validated_edge_kind(&rel.relationship) else { continue };
                let from = resolved_here.iter().find(|(name, _)| name == &rel.from_name).map(|(_, key)| key.clone());
                let to = resolved_here.iter().find(|(name, _)| name == &rel.to_name).map(|(_, key)| key.clone());
                let (Some(from_id), Some(to_id)) = (from, to) else { continue };
                self.graph.create_relationship(&from_id, &to_id, kind)?;
                relationships_count += 1;
            }
        }

        // 10b. Bridge a bare declaration's own symbol name (no jsdoc, so
        // never offered to the entity resolver above) to an entity already
        // discovered elsewhere in the workspace, via DEFINED_IN instead of
        // MENTIONS. Only ever reuses an existing entity; a symbol with no
        // stem match anywhere earns no edge.
        for chunk in &chunks {
            if EntityResolver::<LexicalEntityProvider>::is_eligible(chunk) {
                continue;
            }
            let Some(symbol_name) = chunk.metadata.symbol_name.as_ref() else { continue };
            let existing = self.graph.list_all_entities()?;
            if let Some(canonical_id) = crate::entities::symbol_definition_bridge(symbol_name, &existing) {
                self.graph.link_chunk_defines_entity(&chunk.id, &canonical_id)?;
                relationships_count += 1;
            }
        }

        // 12. 100% Mark completed in the File Metadata DB.
        let result = ProcessingResult {
            chunks_count: chunks.len() as u32,
            nodes_count,
            relationships_count,
            duration_millis: start.elapsed().as_millis() as u64,
        };
        self.metadata.mark_completed(file_id, result.chunks_count, result.nodes_count, result.relationships_count)?;
        events.publish(IndexEvent::FileComplete { file_id: file_id.to_string(), result: result.clone() });

        Ok(result)
    }

    fn progress(&self, file_id: &str, progress: u8, step: &str, events: &EventPublisher) {
        if let Err(e) = self.metadata.update_progress(file_id, progress, step) {
            eprintln!("cappy: failed to persist progress for {file_id}: {e}");
        }
        events.publish(IndexEvent::FileProgress {
            file_id: file_id.to_string(),
            progress,
            current_step: step.to_string(),
        });
    }
}

/// Validate a provider-proposed relationship label against the fixed edge
/// vocabulary, emitting the edge only when the label normalizes to a known
/// kind. `MENTIONS` is excluded here: it is reserved for chunk-to-entity
/// occurrence links, never entity-to-entity relationships.
fn validated_edge_kind(label: &str) -> Option<EdgeKind> {
    let normalized = label.trim().to_uppercase().replace([' ', '-'], "_");
    match EdgeKind::from_str(&normalized) {
        Some(EdgeKind::Mentions) => None,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbeddingService;
    use crate::entities::EntityResolverConfig;
    use crate::vector_store::SqliteVectorStore;
    use tempfile::TempDir;

    fn build_orchestrator(root: &std::path::Path) -> (Orchestrator, Arc<FileMetadataDb>) {
        let metadata = Arc::new(FileMetadataDb::in_memory().unwrap());
        let graph = SqliteGraphStore::open(root.join("graph.db")).unwrap();
        let vectors: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::in_memory().unwrap());
        let embeddings: Arc<dyn EmbeddingService> = Arc::new(HashingEmbeddingService::new(32));

        let orchestrator = Orchestrator::new(
            ContentStore::new(root),
            ParserRegistry::new().unwrap(),
            RelationshipExtractor::new().unwrap(),
            EntityResolver::new(LexicalEntityProvider, EntityResolverConfig::default()),
            Some(embeddings),
            Some(vectors),
            graph,
            metadata.clone(),
            MarkdownChunkingConfig::default(),
        );
        (orchestrator, metadata)
    }

    #[test]
    fn processes_a_simple_typescript_file_end_to_end() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("add.ts"),
            "/** Adds two numbers. */\nexport function add(a: number, b: number) { return a + b; }\n",
        )
        .unwrap();

        let (mut orchestrator, metadata) = build_orchestrator(dir.path());
        let file_id = metadata.insert_file("add.ts", None, 0, 3).unwrap();
        let publisher = crate::events::channel();

        let result = orchestrator.process_file(&file_id, "add.ts", None, &publisher).unwrap();
        assert!(result.chunks_count >= 1);
        assert!(result.nodes_count >= 1 + result.chunks_count);

        let record = metadata.get_file(&file_id).unwrap().unwrap();
        assert_eq!(record.status, crate::metadata_db::FileStatus::Completed);
        assert_eq!(record.chunks_count, result.chunks_count);
    }

    /// End-to-end scenario S6's entity bridge: a markdown section discovers
    /// the "authentication" concept; a later file's bare `function
    /// authenticate` declaration (no jsdoc, never entity-eligible on its
    /// own) still earns a `DEFINED_IN` edge to that same canonical entity
    /// via the symbol-name stem bridge, with no hand-seeded graph fixture.
    #[test]
    fn bare_declaration_bridges_to_entity_discovered_in_another_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("doc.md"), "# Authentication\n\nHandles user authentication for the app.\n")
            .unwrap();
        std::fs::write(dir.path().join("auth.ts"), "function authenticate() {}\n").unwrap();

        let (mut orchestrator, metadata) = build_orchestrator(dir.path());
        let publisher = crate::events::channel();

        let doc_id = metadata.insert_file("doc.md", None, 0, 3).unwrap();
        orchestrator.process_file(&doc_id, "doc.md", None, &publisher).unwrap();

        let auth_id = metadata.insert_file("auth.ts", None, 0, 1).unwrap();
        orchestrator.process_file(&auth_id, "auth.ts", None, &publisher).unwrap();

        let entities = orchestrator.graph.list_all_entities().unwrap();
        assert!(entities.iter().any(|e| e.canonical_id == "concept:authentication"));

        let code_chunks = orchestrator.graph.get_file_chunks("auth.ts").unwrap();
        let code_chunk = code_chunks
            .iter()
            .find(|c| c.symbol_name.as_deref() == Some("authenticate"))
            .expect("authenticate chunk present");

        let (bridged_entities, _) = orchestrator.graph.get_entities_for_chunks(&[code_chunk.chunk_id.clone()]).unwrap();
        assert!(bridged_entities.iter().any(|e| e.canonical_id == "concept:authentication"));
    }

    #[test]
    fn validated_edge_kind_accepts_known_labels_and_rejects_unknown() {
        assert_eq!(validated_edge_kind("imports"), Some(EdgeKind::Imports));
        assert_eq!(validated_edge_kind("references"), Some(EdgeKind::References));
        assert_eq!(validated_edge_kind("mentions"), None);
        assert_eq!(validated_edge_kind("frobnicates"), None);
    }
}

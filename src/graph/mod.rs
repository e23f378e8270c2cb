//! Graph Store: persists the labeled property graph and serves traversal
//! queries for the retrieval engine.

pub mod schema;

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::rc::Rc;

use sqlitegraph::{BackendDirection, EdgeSpec, GraphBackend, NeighborQuery, NodeId, NodeSpec, SqliteGraphBackend};

use crate::chunk::Chunk;
use crate::error::GraphStoreError;
use schema::{ChunkNodeData, EdgeKind, EntityNodeData, FileNodeData, GraphStats, Relationship};

/// Behavior every graph backend must provide. A single implementation
/// ([`SqliteGraphStore`]) ships today; the trait exists so the orchestrator
/// and retrieval engine never depend on sqlitegraph directly. Not `Send`:
/// sqlitegraph's backend handle is `Rc`-based, so one store lives on one
/// worker thread at a time; workers own disjoint files so no cross-thread
/// sharing of a single store is required.
pub trait GraphStore {
    fn create_file_node(&mut self, data: FileNodeData) -> Result<NodeId, GraphStoreError>;
    fn create_chunk_nodes(&mut self, file_path: &str, chunks: &[Chunk]) -> Result<(), GraphStoreError>;
    fn create_relationship(
        &mut self,
        from_id: &str,
        to_id: &str,
        kind: EdgeKind,
    ) -> Result<(), GraphStoreError>;
    fn delete_file(&mut self, file_path: &str) -> Result<(), GraphStoreError>;
    fn delete_file_nodes(&mut self, file_path: &str) -> Result<(), GraphStoreError>;
    fn list_all_files(&mut self) -> Result<Vec<String>, GraphStoreError>;
    fn get_file_chunks(&mut self, file_path: &str) -> Result<Vec<ChunkNodeData>, GraphStoreError>;
    fn get_chunks_by_ids(&mut self, chunk_ids: &[String]) -> Result<Vec<ChunkNodeData>, GraphStoreError>;
    fn get_entities_by_ids(&mut self, canonical_ids: &[String]) -> Result<Vec<EntityNodeData>, GraphStoreError>;
    fn link_chunk_to_entity(&mut self, chunk_id: &str, canonical_entity_id: &str) -> Result<(), GraphStoreError>;
    /// Like [`GraphStore::link_chunk_to_entity`] but via `DEFINED_IN` instead
    /// of `MENTIONS`: a code chunk's own declaration resolving into a
    /// canonical entity it defines, rather than merely referencing.
    fn link_chunk_defines_entity(&mut self, chunk_id: &str, canonical_entity_id: &str) -> Result<(), GraphStoreError>;
    /// Entities mentioned by any of `chunk_ids`, plus the `MENTIONS` edges
    /// connecting them — used by the retrieval engine's enrichment step.
    fn get_entities_for_chunks(
        &mut self,
        chunk_ids: &[String],
    ) -> Result<(Vec<EntityNodeData>, Vec<Relationship>), GraphStoreError>;
    fn get_related_chunks(&mut self, chunk_id: &str, hops: usize) -> Result<Vec<ChunkNodeData>, GraphStoreError>;
    /// All chunks linked to any of `canonical_ids` via an incoming `MENTIONS`
    /// edge — the reverse of [`GraphStore::get_entities_for_chunks`]. Lets the
    /// retrieval engine treat "mentions the same entity" as a single
    /// conceptual hop regardless of how many structural edges separate two
    /// chunks in the underlying graph.
    fn get_chunks_mentioning_entities(
        &mut self,
        canonical_ids: &[String],
    ) -> Result<Vec<ChunkNodeData>, GraphStoreError>;
    /// Every known `Entity` node; the `global` search mode starts here
    /// instead of from a vector anchor.
    fn list_all_entities(&mut self) -> Result<Vec<EntityNodeData>, GraphStoreError>;
    fn get_sample_relationships(&mut self, limit: usize) -> Result<Vec<Relationship>, GraphStoreError>;
    fn get_relationships_by_type(&mut self, kind: EdgeKind) -> Result<Vec<Relationship>, GraphStoreError>;
    fn get_subgraph(&mut self, file_paths: &[String]) -> Result<Vec<Relationship>, GraphStoreError>;
    fn get_stats(&mut self) -> Result<GraphStats, GraphStoreError>;
    /// Sweep every known entity and delete those with no remaining
    /// `MENTIONS` in-edge. `delete_file`/`delete_file_nodes` already rechecks
    /// the entities a deletion could have orphaned; this is the periodic,
    /// whole-graph counterpart for entities left dangling by any other path
    /// (e.g. a resolver merge that leaves the old id unreferenced).
    fn cleanup_orphaned_entities(&mut self) -> Result<usize, GraphStoreError>;
}

/// sqlitegraph-backed implementation. Node kinds are `"File"`, `"Chunk"`,
/// `"Entity"`; everything else about the schema lives in node/edge payloads.
pub struct SqliteGraphStore {
    backend: Rc<SqliteGraphBackend>,
    file_index: HashMap<String, NodeId>,
    chunk_index: HashMap<String, NodeId>,
    entity_index: HashMap<String, NodeId>,
}

impl SqliteGraphStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, GraphStoreError> {
        let sqlite_graph = sqlitegraph::SqliteGraph::open(db_path)
            .map_err(|e| GraphStoreError::SchemaMigration(e.to_string()))?;
        let backend = Rc::new(SqliteGraphBackend::from_graph(sqlite_graph));
        Ok(Self {
            backend,
            file_index: HashMap::new(),
            chunk_index: HashMap::new(),
            entity_index: HashMap::new(),
        })
    }

    fn find_file_node(&mut self, path: &str) -> Result<Option<NodeId>, GraphStoreError> {
        if let Some(id) = self.file_index.get(path) {
            return Ok(Some(*id));
        }
        self.rebuild_index()?;
        Ok(self.file_index.get(path).copied())
    }

    fn find_chunk_node(&mut self, chunk_id: &str) -> Result<Option<NodeId>, GraphStoreError> {
        if let Some(id) = self.chunk_index.get(chunk_id) {
            return Ok(Some(*id));
        }
        self.rebuild_index()?;
        Ok(self.chunk_index.get(chunk_id).copied())
    }

    fn find_entity_node(&mut self, canonical_id: &str) -> Result<Option<NodeId>, GraphStoreError> {
        if let Some(id) = self.entity_index.get(canonical_id) {
            return Ok(Some(*id));
        }
        self.rebuild_index()?;
        Ok(self.entity_index.get(canonical_id).copied())
    }

    /// Full index rebuild by scanning every node. Simple and correct; the
    /// per-process in-memory indexes avoid paying this cost on every lookup.
    fn rebuild_index(&mut self) -> Result<(), GraphStoreError> {
        self.file_index.clear();
        self.chunk_index.clear();
        self.entity_index.clear();

        let ids = self
            .backend
            .entity_ids()
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;

        for id in ids {
            let Ok(node) = self.backend.get_node(id) else { continue };
            match node.kind.as_str() {
                "File" => {
                    if let Ok(data) = serde_json::from_value::<FileNodeData>(node.data) {
                        self.file_index.insert(data.path, NodeId::from(id));
                    }
                }
                "Chunk" => {
                    if let Ok(data) = serde_json::from_value::<ChunkNodeData>(node.data) {
                        self.chunk_index.insert(data.chunk_id, NodeId::from(id));
                    }
                }
                "Entity" => {
                    if let Ok(data) = serde_json::from_value::<EntityNodeData>(node.data) {
                        self.entity_index.insert(data.canonical_id, NodeId::from(id));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn node_kind_count(&self, kind: &str) -> Result<usize, GraphStoreError> {
        let ids = self
            .backend
            .entity_ids()
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;
        Ok(ids
            .into_iter()
            .filter(|id| self.backend.get_node(*id).map(|n| n.kind == kind).unwrap_or(false))
            .count())
    }
}

impl GraphStore for SqliteGraphStore {
    fn create_file_node(&mut self, data: FileNodeData) -> Result<NodeId, GraphStoreError> {
        let path = data.path.clone();
        if let Some(existing) = self.find_file_node(&path)? {
            // sqlitegraph has no in-place update; replace the node, preserving its id role.
            self.backend
                .graph()
                .delete_entity(existing.as_i64())
                .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
        }

        let spec = NodeSpec {
            kind: "File".to_string(),
            name: path.clone(),
            file_path: Some(path.clone()),
            data: serde_json::to_value(&data).map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?,
        };
        let id = self
            .backend
            .insert_node(spec)
            .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
        let node_id = NodeId::from(id);
        self.file_index.insert(path, node_id);
        Ok(node_id)
    }

    fn create_chunk_nodes(&mut self, file_path: &str, chunks: &[Chunk]) -> Result<(), GraphStoreError> {
        let file_id = self
            .find_file_node(file_path)?
            .ok_or_else(|| GraphStoreError::WriteFailed(format!("no File node for {file_path}")))?;

        // Atomic replacement: drop this
        // file's existing chunk set (and anything incident to it) before
        // inserting the new one, so a re-parse with shifted line ranges never
        // leaves stale chunk nodes behind.
        self.delete_file_nodes(file_path)?;

        for (order, chunk) in chunks.iter().enumerate() {
            let data = ChunkNodeData {
                chunk_id: chunk.id.clone(),
                file_path: file_path.to_string(),
                line_start: chunk.metadata.line_start,
                line_end: chunk.metadata.line_end,
                chunk_type: chunk.metadata.chunk_type,
                symbol_name: chunk.metadata.symbol_name.clone(),
                symbol_kind: chunk.metadata.symbol_kind,
                content: chunk.content.clone(),
            };
            let spec = NodeSpec {
                kind: "Chunk".to_string(),
                name: chunk.id.clone(),
                file_path: Some(file_path.to_string()),
                data: serde_json::to_value(&data).map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?,
            };
            let id = self
                .backend
                .insert_node(spec)
                .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
            let chunk_node_id = NodeId::from(id);
            self.chunk_index.insert(chunk.id.clone(), chunk_node_id);

            let edge = EdgeSpec {
                from: file_id.as_i64(),
                to: chunk_node_id.as_i64(),
                edge_type: EdgeKind::Contains.as_str().to_string(),
                data: serde_json::json!({ "order": order }),
            };
            self.backend
                .insert_edge(edge)
                .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn create_relationship(&mut self, from_id: &str, to_id: &str, kind: EdgeKind) -> Result<(), GraphStoreError> {
        let from_node = self.resolve_any_node(from_id)?;
        let to_node = self.resolve_any_node(to_id)?;
        let (Some(from_node), Some(to_node)) = (from_node, to_node) else {
            // Unknown endpoint (e.g. an import that targets a file not yet
            // indexed): skip rather than error, resolved on a later pass.
            return Ok(());
        };

        // Idempotent: an identical edge already present is a no-op.
        let existing = self
            .backend
            .neighbors(
                from_node.as_i64(),
                NeighborQuery {
                    direction: BackendDirection::Outgoing,
                    edge_type: Some(kind.as_str().to_string()),
                },
            )
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;
        if existing.contains(&to_node.as_i64()) {
            return Ok(());
        }

        let edge = EdgeSpec {
            from: from_node.as_i64(),
            to: to_node.as_i64(),
            edge_type: kind.as_str().to_string(),
            data: serde_json::json!({}),
        };
        self.backend
            .insert_edge(edge)
            .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    fn delete_file(&mut self, file_path: &str) -> Result<(), GraphStoreError> {
        self.delete_file_nodes(file_path)?;
        if let Some(file_id) = self.find_file_node(file_path)? {
            self.backend
                .graph()
                .delete_entity(file_id.as_i64())
                .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
            self.file_index.remove(file_path);
        }
        Ok(())
    }

    fn delete_file_nodes(&mut self, file_path: &str) -> Result<(), GraphStoreError> {
        let Some(file_id) = self.find_file_node(file_path)? else {
            return Ok(());
        };
        let chunk_ids = self
            .backend
            .neighbors(
                file_id.as_i64(),
                NeighborQuery {
                    direction: BackendDirection::Outgoing,
                    edge_type: Some(EdgeKind::Contains.as_str().to_string()),
                },
            )
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;

        // Entities mentioned by the chunks about to be removed: their
        // in-degree can only drop from here, so they're rechecked for
        // orphan status once the MENTIONS edges are gone with the chunks.
        let mut touched_entities: HashSet<String> = HashSet::new();
        for &chunk_node_id in &chunk_ids {
            let mentioned = self
                .backend
                .neighbors(
                    chunk_node_id,
                    NeighborQuery { direction: BackendDirection::Outgoing, edge_type: Some(EdgeKind::Mentions.as_str().to_string()) },
                )
                .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;
            for entity_node_id in mentioned {
                if let Ok(node) = self.backend.get_node(entity_node_id) {
                    if let Ok(data) = serde_json::from_value::<EntityNodeData>(node.data) {
                        touched_entities.insert(data.canonical_id);
                    }
                }
            }
        }

        for chunk_node_id in chunk_ids {
            if let Ok(node) = self.backend.get_node(chunk_node_id) {
                if let Ok(data) = serde_json::from_value::<ChunkNodeData>(node.data) {
                    self.chunk_index.remove(&data.chunk_id);
                }
            }
            self.backend
                .graph()
                .delete_entity(chunk_node_id)
                .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
        }

        for canonical_id in touched_entities {
            self.delete_entity_if_orphaned(&canonical_id)?;
        }
        Ok(())
    }

    fn list_all_files(&mut self) -> Result<Vec<String>, GraphStoreError> {
        self.rebuild_index()?;
        let mut paths: Vec<String> = self.file_index.keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }

    fn get_file_chunks(&mut self, file_path: &str) -> Result<Vec<ChunkNodeData>, GraphStoreError> {
        let Some(file_id) = self.find_file_node(file_path)? else {
            return Ok(Vec::new());
        };
        let neighbor_ids = self
            .backend
            .neighbors(
                file_id.as_i64(),
                NeighborQuery {
                    direction: BackendDirection::Outgoing,
                    edge_type: Some(EdgeKind::Contains.as_str().to_string()),
                },
            )
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;

        let mut chunks: Vec<ChunkNodeData> = neighbor_ids
            .into_iter()
            .filter_map(|id| self.backend.get_node(id).ok())
            .filter_map(|node| serde_json::from_value::<ChunkNodeData>(node.data).ok())
            .collect();
        chunks.sort_by_key(|c| c.line_start);
        Ok(chunks)
    }

    fn get_chunks_by_ids(&mut self, chunk_ids: &[String]) -> Result<Vec<ChunkNodeData>, GraphStoreError> {
        self.rebuild_index()?;
        let mut out = Vec::new();
        for chunk_id in chunk_ids {
            if let Some(node_id) = self.chunk_index.get(chunk_id) {
                if let Ok(node) = self.backend.get_node(node_id.as_i64()) {
                    if let Ok(data) = serde_json::from_value::<ChunkNodeData>(node.data) {
                        out.push(data);
                    }
                }
            }
        }
        Ok(out)
    }

    fn get_entities_by_ids(&mut self, canonical_ids: &[String]) -> Result<Vec<EntityNodeData>, GraphStoreError> {
        self.rebuild_index()?;
        let mut out = Vec::new();
        for canonical_id in canonical_ids {
            if let Some(node_id) = self.entity_index.get(canonical_id) {
                if let Ok(node) = self.backend.get_node(node_id.as_i64()) {
                    if let Ok(data) = serde_json::from_value::<EntityNodeData>(node.data) {
                        out.push(data);
                    }
                }
            }
        }
        Ok(out)
    }

    fn link_chunk_to_entity(&mut self, chunk_id: &str, canonical_entity_id: &str) -> Result<(), GraphStoreError> {
        self.create_relationship(chunk_id, canonical_entity_id, EdgeKind::Mentions)
    }

    fn link_chunk_defines_entity(&mut self, chunk_id: &str, canonical_entity_id: &str) -> Result<(), GraphStoreError> {
        self.create_relationship(chunk_id, canonical_entity_id, EdgeKind::DefinedIn)
    }

    fn get_entities_for_chunks(
        &mut self,
        chunk_ids: &[String],
    ) -> Result<(Vec<EntityNodeData>, Vec<Relationship>), GraphStoreError> {
        self.rebuild_index()?;
        let mut seen_entities: HashSet<String> = HashSet::new();
        let mut entities = Vec::new();
        let mut relationships = Vec::new();

        for chunk_id in chunk_ids {
            let Some(chunk_node) = self.chunk_index.get(chunk_id).copied() else {
                continue;
            };
            for kind in [EdgeKind::Mentions, EdgeKind::DefinedIn] {
                let neighbor_ids = self
                    .backend
                    .neighbors(
                        chunk_node.as_i64(),
                        NeighborQuery { direction: BackendDirection::Outgoing, edge_type: Some(kind.as_str().to_string()) },
                    )
                    .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;

                for neighbor_id in neighbor_ids {
                    let Ok(node) = self.backend.get_node(neighbor_id) else { continue };
                    if node.kind != "Entity" {
                        continue;
                    }
                    let Ok(data) = serde_json::from_value::<EntityNodeData>(node.data) else { continue };
                    relationships.push(Relationship {
                        from_id: chunk_id.clone(),
                        to_id: data.canonical_id.clone(),
                        kind,
                    });
                    if seen_entities.insert(data.canonical_id.clone()) {
                        entities.push(data);
                    }
                }
            }
        }

        entities.sort_by(|a, b| a.canonical_id.cmp(&b.canonical_id));
        relationships.sort_by(|a, b| (&a.from_id, &a.to_id).cmp(&(&b.from_id, &b.to_id)));
        Ok((entities, relationships))
    }

    fn get_related_chunks(&mut self, chunk_id: &str, hops: usize) -> Result<Vec<ChunkNodeData>, GraphStoreError> {
        let Some(start) = self.find_chunk_node(chunk_id)? else {
            return Ok(Vec::new());
        };

        let mut visited: HashSet<i64> = HashSet::new();
        visited.insert(start.as_i64());
        let mut frontier = VecDeque::new();
        frontier.push_back((start.as_i64(), 0usize));
        let mut collected = Vec::new();

        while let Some((node_id, depth)) = frontier.pop_front() {
            if depth >= hops {
                continue;
            }
            let mut neighbor_ids = Vec::new();
            for kind in RELATED_CHUNK_EDGE_KINDS {
                neighbor_ids.extend(
                    self.backend
                        .neighbors(
                            node_id,
                            NeighborQuery {
                                direction: BackendDirection::Outgoing,
                                edge_type: Some(kind.as_str().to_string()),
                            },
                        )
                        .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?,
                );
            }

            for neighbor_id in neighbor_ids {
                if !visited.insert(neighbor_id) {
                    continue;
                }
                if let Ok(node) = self.backend.get_node(neighbor_id) {
                    if node.kind == "Chunk" {
                        if let Ok(data) = serde_json::from_value::<ChunkNodeData>(node.data) {
                            collected.push(data);
                        }
                    }
                }
                frontier.push_back((neighbor_id, depth + 1));
            }
        }

        collected.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        Ok(collected)
    }

    fn get_chunks_mentioning_entities(
        &mut self,
        canonical_ids: &[String],
    ) -> Result<Vec<ChunkNodeData>, GraphStoreError> {
        self.rebuild_index()?;
        let mut seen: HashSet<i64> = HashSet::new();
        let mut out = Vec::new();

        for canonical_id in canonical_ids {
            let Some(entity_node) = self.entity_index.get(canonical_id).copied() else {
                continue;
            };
            for kind in [EdgeKind::Mentions, EdgeKind::DefinedIn] {
                let neighbor_ids = self
                    .backend
                    .neighbors(
                        entity_node.as_i64(),
                        NeighborQuery { direction: BackendDirection::Incoming, edge_type: Some(kind.as_str().to_string()) },
                    )
                    .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;

                for neighbor_id in neighbor_ids {
                    if !seen.insert(neighbor_id) {
                        continue;
                    }
                    if let Ok(node) = self.backend.get_node(neighbor_id) {
                        if node.kind == "Chunk" {
                            if let Ok(data) = serde_json::from_value::<ChunkNodeData>(node.data) {
                                out.push(data);
                            }
                        }
                    }
                }
            }
        }

        out.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        Ok(out)
    }

    fn list_all_entities(&mut self) -> Result<Vec<EntityNodeData>, GraphStoreError> {
        self.rebuild_index()?;
        let mut out: Vec<EntityNodeData> = Vec::new();
        for node_id in self.entity_index.values() {
            if let Ok(node) = self.backend.get_node(node_id.as_i64()) {
                if let Ok(data) = serde_json::from_value::<EntityNodeData>(node.data) {
                    out.push(data);
                }
            }
        }
        out.sort_by(|a, b| a.canonical_id.cmp(&b.canonical_id));
        Ok(out)
    }

    fn get_sample_relationships(&mut self, limit: usize) -> Result<Vec<Relationship>, GraphStoreError> {
        let ids = self
            .backend
            .entity_ids()
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;
        let mut out = Vec::new();
        'outer: for id in ids {
            for kind in ALL_EDGE_KINDS {
                let neighbors = self
                    .backend
                    .neighbors(id, NeighborQuery { direction: BackendDirection::Outgoing, edge_type: Some(kind.as_str().to_string()) })
                    .unwrap_or_default();
                for to in neighbors {
                    out.push(Relationship {
                        from_id: id.to_string(),
                        to_id: to.to_string(),
                        kind: *kind,
                    });
                    if out.len() >= limit {
                        break 'outer;
                    }
                }
            }
        }
        Ok(out)
    }

    fn get_relationships_by_type(&mut self, kind: EdgeKind) -> Result<Vec<Relationship>, GraphStoreError> {
        let ids = self
            .backend
            .entity_ids()
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;
        let mut out = Vec::new();
        for id in ids {
            let neighbors = self
                .backend
                .neighbors(id, NeighborQuery { direction: BackendDirection::Outgoing, edge_type: Some(kind.as_str().to_string()) })
                .unwrap_or_default();
            for to in neighbors {
                out.push(Relationship { from_id: id.to_string(), to_id: to.to_string(), kind });
            }
        }
        Ok(out)
    }

    fn get_subgraph(&mut self, file_paths: &[String]) -> Result<Vec<Relationship>, GraphStoreError> {
        let mut node_ids = HashSet::new();
        for path in file_paths {
            if let Some(file_id) = self.find_file_node(path)? {
                node_ids.insert(file_id.as_i64());
                for chunk in self.get_file_chunks(path)? {
                    if let Some(chunk_id) = self.chunk_index.get(&chunk.chunk_id) {
                        node_ids.insert(chunk_id.as_i64());
                    }
                }
            }
        }

        let mut out = Vec::new();
        for &id in &node_ids {
            for kind in ALL_EDGE_KINDS {
                let neighbors = self
                    .backend
                    .neighbors(id, NeighborQuery { direction: BackendDirection::Outgoing, edge_type: Some(kind.as_str().to_string()) })
                    .unwrap_or_default();
                for to in neighbors {
                    if node_ids.contains(&to) {
                        out.push(Relationship { from_id: id.to_string(), to_id: to.to_string(), kind: *kind });
                    }
                }
            }
        }
        Ok(out)
    }

    fn get_stats(&mut self) -> Result<GraphStats, GraphStoreError> {
        let edge_count = ALL_EDGE_KINDS
            .iter()
            .map(|kind| self.get_relationships_by_type(*kind).map(|r| r.len()))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .sum();

        Ok(GraphStats {
            file_count: self.node_kind_count("File")?,
            chunk_count: self.node_kind_count("Chunk")?,
            entity_count: self.node_kind_count("Entity")?,
            edge_count,
        })
    }

    fn cleanup_orphaned_entities(&mut self) -> Result<usize, GraphStoreError> {
        let canonical_ids: Vec<String> = self.list_all_entities()?.into_iter().map(|e| e.canonical_id).collect();
        let mut removed = 0;
        for canonical_id in canonical_ids {
            self.delete_entity_if_orphaned(&canonical_id)?;
            if self.find_entity_node(&canonical_id)?.is_none() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Edge kinds `get_related_chunks` walks, matching spec.md:124's named list
/// exactly. `Outgoing` only: a bidirectional `CONTAINS` walk would let a
/// chunk step up to its parent `File` node and back down to every sibling
/// chunk in one hop, which is not "related" in any sense the spec means.
const RELATED_CHUNK_EDGE_KINDS: &[EdgeKind] = &[
    EdgeKind::Contains,
    EdgeKind::Documents,
    EdgeKind::Imports,
    EdgeKind::ImportsSymbol,
    EdgeKind::References,
    EdgeKind::Mentions,
];

const ALL_EDGE_KINDS: &[EdgeKind] = &[
    EdgeKind::Contains,
    EdgeKind::Documents,
    EdgeKind::Imports,
    EdgeKind::ImportsSymbol,
    EdgeKind::References,
    EdgeKind::Mentions,
    EdgeKind::DefinedIn,
    EdgeKind::HasChunk,
    EdgeKind::LinksTo,
    EdgeKind::PartOf,
];

impl SqliteGraphStore {
    /// Relationship endpoints can be a file path, a chunk id, or a canonical
    /// entity id; try each index in turn rather than asking callers to tag
    /// their own id kind.
    fn resolve_any_node(&mut self, id: &str) -> Result<Option<NodeId>, GraphStoreError> {
        if let Some(node) = self.find_file_node(id)? {
            return Ok(Some(node));
        }
        if let Some(node) = self.find_chunk_node(id)? {
            return Ok(Some(node));
        }
        self.find_entity_node(id)
    }

    /// Create or update an `Entity` node and return its graph id.
    pub fn upsert_entity_node(&mut self, data: EntityNodeData) -> Result<NodeId, GraphStoreError> {
        let canonical_id = data.canonical_id.clone();
        if let Some(existing) = self.find_entity_node(&canonical_id)? {
            self.backend
                .graph()
                .delete_entity(existing.as_i64())
                .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
        }
        let spec = NodeSpec {
            kind: "Entity".to_string(),
            name: canonical_id.clone(),
            file_path: None,
            data: serde_json::to_value(&data).map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?,
        };
        let id = self
            .backend
            .insert_node(spec)
            .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
        let node_id = NodeId::from(id);
        self.entity_index.insert(canonical_id, node_id);
        Ok(node_id)
    }

    /// Canonicalize an entity occurrence: miss creates a fresh node;
    /// hit reuses the existing id and unions `source_chunk_ids` instead of
    /// discarding the prior occurrence list the way a plain upsert would.
    pub fn resolve_entity(
        &mut self,
        canonical_id: &str,
        entity_type: &str,
        confidence: f32,
        source_chunk_id: &str,
    ) -> Result<NodeId, GraphStoreError> {
        if let Some(existing) = self.find_entity_node(canonical_id)? {
            let node = self
                .backend
                .get_node(existing.as_i64())
                .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;
            let mut data: EntityNodeData = serde_json::from_value(node.data)
                .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;

            if !data.source_chunk_ids.iter().any(|id| id == source_chunk_id) {
                data.source_chunk_ids.push(source_chunk_id.to_string());
            }
            data.confidence = data.confidence.max(confidence);
            return self.upsert_entity_node(data);
        }

        self.upsert_entity_node(EntityNodeData {
            canonical_id: canonical_id.to_string(),
            entity_type: entity_type.to_string(),
            confidence,
            source_chunk_ids: vec![source_chunk_id.to_string()],
            merged_from: Vec::new(),
        })
    }

    /// Delete an entity node once it has no remaining `MENTIONS` in-edges.
    pub fn delete_entity_if_orphaned(&mut self, canonical_id: &str) -> Result<(), GraphStoreError> {
        let Some(entity_id) = self.find_entity_node(canonical_id)? else {
            return Ok(());
        };
        let mut incoming = self
            .backend
            .neighbors(
                entity_id.as_i64(),
                NeighborQuery { direction: BackendDirection::Incoming, edge_type: Some(EdgeKind::Mentions.as_str().to_string()) },
            )
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;
        incoming.extend(
            self.backend
                .neighbors(
                    entity_id.as_i64(),
                    NeighborQuery { direction: BackendDirection::Incoming, edge_type: Some(EdgeKind::DefinedIn.as_str().to_string()) },
                )
                .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?,
        );
        if incoming.is_empty() {
            self.backend
                .graph()
                .delete_entity(entity_id.as_i64())
                .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
            self.entity_index.remove(canonical_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, ChunkType, SymbolKind};

    fn sample_file_data(path: &str) -> FileNodeData {
        FileNodeData {
            path: path.to_string(),
            hash: "deadbeef".to_string(),
            last_indexed_at: 0,
            last_modified: 0,
            lines_of_code: 10,
            language: Some("typescript".to_string()),
        }
    }

    #[test]
    fn create_file_then_chunks_links_contains_edges() {
        let mut store = SqliteGraphStore::open(":memory:").unwrap();
        store.create_file_node(sample_file_data("a.ts")).unwrap();

        let chunk = Chunk::new("a.ts", 1, 3, ChunkType::Code, "const x = 1;".to_string())
            .with_symbol("x", SymbolKind::Variable);
        store.create_chunk_nodes("a.ts", &[chunk.clone()]).unwrap();

        let chunks = store.get_file_chunks("a.ts").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, chunk.id);
    }

    #[test]
    fn delete_file_removes_file_and_its_chunks() {
        let mut store = SqliteGraphStore::open(":memory:").unwrap();
        store.create_file_node(sample_file_data("a.ts")).unwrap();
        let chunk = Chunk::new("a.ts", 1, 1, ChunkType::Code, "x".to_string());
        store.create_chunk_nodes("a.ts", &[chunk]).unwrap();

        store.delete_file("a.ts").unwrap();

        assert!(store.list_all_files().unwrap().is_empty());
        assert!(store.get_file_chunks("a.ts").unwrap().is_empty());
    }

    #[test]
    fn delete_file_cascades_to_orphaned_entity() {
        let mut store = SqliteGraphStore::open(":memory:").unwrap();
        store.create_file_node(sample_file_data("a.ts")).unwrap();
        let chunk = Chunk::new("a.ts", 1, 1, ChunkType::Code, "x".to_string());
        store.create_chunk_nodes("a.ts", &[chunk.clone()]).unwrap();

        store.resolve_entity("react", "library", 0.9, &chunk.id).unwrap();
        store.link_chunk_to_entity(&chunk.id, "react").unwrap();
        assert!(store.get_entities_by_ids(&["react".to_string()]).unwrap().len() == 1);

        store.delete_file("a.ts").unwrap();

        assert!(store.get_entities_by_ids(&["react".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn cleanup_orphaned_entities_sweeps_dangling_nodes() {
        let mut store = SqliteGraphStore::open(":memory:").unwrap();
        store.resolve_entity("orphan", "concept", 0.8, "chunk:nowhere:1-1").unwrap();
        assert_eq!(store.get_entities_by_ids(&["orphan".to_string()]).unwrap().len(), 1);

        let removed = store.cleanup_orphaned_entities().unwrap();

        assert_eq!(removed, 1);
        assert!(store.get_entities_by_ids(&["orphan".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn create_relationship_is_idempotent() {
        let mut store = SqliteGraphStore::open(":memory:").unwrap();
        store.create_file_node(sample_file_data("a.ts")).unwrap();
        store.create_file_node(sample_file_data("b.ts")).unwrap();

        store.create_relationship("a.ts", "b.ts", EdgeKind::Imports).unwrap();
        store.create_relationship("a.ts", "b.ts", EdgeKind::Imports).unwrap();

        let rels = store.get_relationships_by_type(EdgeKind::Imports).unwrap();
        assert_eq!(rels.len(), 1);
    }

    #[test]
    fn get_related_chunks_performs_k_hop_traversal() {
        let mut store = SqliteGraphStore::open(":memory:").unwrap();
        store.create_file_node(sample_file_data("a.ts")).unwrap();
        let c1 = Chunk::new("a.ts", 1, 1, ChunkType::Jsdoc, "doc".to_string()).with_symbol("f", SymbolKind::Function);
        let c2 = Chunk::new("a.ts", 2, 4, ChunkType::Code, "fn".to_string()).with_symbol("f", SymbolKind::Function);
        store.create_chunk_nodes("a.ts", &[c1.clone(), c2.clone()]).unwrap();
        store.create_relationship(&c1.id, &c2.id, EdgeKind::Documents).unwrap();

        let related = store.get_related_chunks(&c1.id, 1).unwrap();
        assert!(related.iter().any(|c| c.chunk_id == c2.id));
    }

    #[test]
    fn get_entities_for_chunks_follows_mentions_edges() {
        let mut store = SqliteGraphStore::open(":memory:").unwrap();
        store.create_file_node(sample_file_data("doc.md")).unwrap();
        let chunk = Chunk::new("doc.md", 1, 2, ChunkType::MarkdownSection, "## auth".to_string());
        store.create_chunk_nodes("doc.md", &[chunk.clone()]).unwrap();

        store
            .upsert_entity_node(EntityNodeData {
                canonical_id: "concept:authentication".to_string(),
                entity_type: "concept".to_string(),
                confidence: 0.9,
                source_chunk_ids: vec![chunk.id.clone()],
                merged_from: Vec::new(),
            })
            .unwrap();
        store.link_chunk_to_entity(&chunk.id, "concept:authentication").unwrap();

        let (entities, relationships) = store.get_entities_for_chunks(&[chunk.id.clone()]).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].canonical_id, "concept:authentication");
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].from_id, chunk.id);
        assert_eq!(relationships[0].to_id, "concept:authentication");
    }

    #[test]
    fn get_chunks_mentioning_entities_is_the_reverse_lookup() {
        let mut store = SqliteGraphStore::open(":memory:").unwrap();
        store.create_file_node(sample_file_data("doc.md")).unwrap();
        store.create_file_node(sample_file_data("auth.ts")).unwrap();
        let doc_chunk = Chunk::new("doc.md", 1, 2, ChunkType::MarkdownSection, "## authentication".to_string());
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

        let mentioning = store
            .get_chunks_mentioning_entities(&["concept:authentication".to_string()])
            .unwrap();
        let ids: Vec<&str> = mentioning.iter().map(|c| c.chunk_id.as_str()).collect();
        assert!(ids.contains(&doc_chunk.id.as_str()));
        assert!(ids.contains(&code_chunk.id.as_str()));

        let all_entities = store.list_all_entities().unwrap();
        assert_eq!(all_entities.len(), 1);
        assert_eq!(all_entities[0].canonical_id, "concept:authentication");
    }

    #[test]
    fn get_stats_counts_nodes_and_edges() {
        let mut store = SqliteGraphStore::open(":memory:").unwrap();
        store.create_file_node(sample_file_data("a.ts")).unwrap();
        let chunk = Chunk::new("a.ts", 1, 1, ChunkType::Code, "x".to_string());
        store.create_chunk_nodes("a.ts", &[chunk]).unwrap();

        let stats = store.get_stats().unwrap();
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.edge_count, 1);
    }
}

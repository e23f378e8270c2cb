//! Content Loader & LOD: serves cached source snippets for retrieval
//! results, and reduces a dense subgraph to a readable "level of detail"
//! view before it reaches a caller.
//!
//! The snippet cache wraps bounds-checked line-range slicing with an
//! `lru`-backed cache in front of disk reads, since the retrieval engine
//! re-fetches the same hot chunks across consecutive `search` calls far
//! more often than a one-shot lookup would.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lru::LruCache;

use crate::config::RetrievalConfig;
use crate::error::LoadError;
use crate::graph::schema::EdgeKind;
use crate::validation::resolve_against_root;

/// One cached, already-sliced snippet.
#[derive(Debug, Clone)]
pub struct Snippet {
    pub file_path: String,
    pub line_start: usize,
    pub line_end: usize,
    pub content: String,
}

fn snippet_key(file_path: &str, line_start: usize, line_end: usize) -> String {
    format!("{file_path}:{line_start}-{line_end}")
}

/// Loads and caches source snippets by `(path, lineStart, lineEnd)`.
pub struct ContentLoader {
    workspace_root: PathBuf,
    cache: Mutex<LruCache<String, Snippet>>,
}

impl ContentLoader {
    pub fn new(workspace_root: impl Into<PathBuf>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            workspace_root: workspace_root.into(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn with_config(workspace_root: impl Into<PathBuf>, cfg: &RetrievalConfig) -> Self {
        Self::new(workspace_root, cfg.snippet_cache_capacity)
    }

    /// Fetch the 1-indexed, inclusive `[line_start, line_end]` byte range of
    /// `file_path`, serving from cache when present. A requested range beyond
    /// the file's line count is clamped rather than treated as an error.
    pub fn load_snippet(&self, file_path: &str, line_start: usize, line_end: usize) -> Result<Snippet, LoadError> {
        let key = snippet_key(file_path, line_start, line_end);
        if let Some(hit) = self.cache.lock().expect("content loader cache mutex poisoned").get(&key) {
            return Ok(hit.clone());
        }

        let absolute = resolve_against_root(Path::new(file_path), &self.workspace_root);
        let text = std::fs::read_to_string(&absolute).map_err(|e| LoadError::Unreadable {
            path: file_path.to_string(),
            source: e,
        })?;

        let lines: Vec<&str> = text.lines().collect();
        let total = lines.len();
        let start = line_start.max(1).min(total.max(1));
        let end = line_end.max(start).min(total.max(1));
        let content = if total == 0 {
            String::new()
        } else {
            lines[(start - 1)..end].join("\n")
        };

        let snippet = Snippet {
            file_path: file_path.to_string(),
            line_start: start,
            line_end: end,
            content,
        };

        self.cache
            .lock()
            .expect("content loader cache mutex poisoned")
            .put(key, snippet.clone());
        Ok(snippet)
    }

    /// Drop every cached snippet for `file_path`: a re-indexed or deleted
    /// file must never serve a stale snippet.
    pub fn invalidate_file(&self, file_path: &str) {
        let prefix = format!("{file_path}:");
        let mut cache = self.cache.lock().expect("content loader cache mutex poisoned");
        let stale: Vec<String> = cache.iter().map(|(k, _)| k.clone()).filter(|k| k.starts_with(&prefix)).collect();
        for key in stale {
            cache.pop(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().expect("content loader cache mutex poisoned").len()
    }
}

/// One node feeding [`apply_lod`]; `kind`/`path_prefix` are supplied by the
/// caller (the retrieval engine, which already has each node's chunk/file
/// metadata) rather than re-derived from the bare id strings graph queries
/// return.
#[derive(Debug, Clone)]
pub struct LodNode {
    pub id: String,
    pub kind: &'static str,
    pub path_prefix: String,
}

/// A structural weight for each edge kind: higher survives LOD simplification
/// longer. Containment/definition edges carry the graph's backbone; mention
/// and link edges are the first to go when a view gets dense.
fn edge_weight(kind: EdgeKind) -> usize {
    match kind {
        EdgeKind::Contains | EdgeKind::HasChunk | EdgeKind::PartOf => 3,
        EdgeKind::DefinedIn | EdgeKind::Documents | EdgeKind::Imports | EdgeKind::ImportsSymbol => 2,
        EdgeKind::References | EdgeKind::LinksTo | EdgeKind::Mentions => 1,
    }
}

#[derive(Debug, Clone)]
pub struct LodEdge {
    pub from: String,
    pub to: String,
    pub weight: usize,
}

#[derive(Debug, Clone)]
pub struct ClusterNode {
    pub cluster_id: String,
    pub kind: &'static str,
    pub path_prefix: String,
    pub member_ids: Vec<String>,
    pub weight: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LodResult {
    pub nodes: Vec<String>,
    pub edges: Vec<LodEdge>,
    pub clusters: Vec<ClusterNode>,
    pub simplified: bool,
    pub clustered: bool,
}

/// Reduce a subgraph's level of detail once it grows past the configured
/// thresholds: above `lod_simplify_threshold` nodes, drop
/// weight-1 edges (the "low-weight" tier); above `lod_cluster_threshold`
/// nodes, additionally collapse same-`(kind, path_prefix)` nodes into
/// synthetic cluster nodes, with inter-cluster edge weight taken as the max
/// of the edges it absorbs.
pub fn apply_lod(nodes: &[LodNode], edges: &[(String, String, EdgeKind)], cfg: &RetrievalConfig) -> LodResult {
    let node_count = nodes.len();
    let mut weighted_edges: Vec<LodEdge> = edges
        .iter()
        .map(|(from, to, kind)| LodEdge {
            from: from.clone(),
            to: to.clone(),
            weight: edge_weight(*kind),
        })
        .collect();

    let mut result = LodResult {
        nodes: nodes.iter().map(|n| n.id.clone()).collect(),
        ..Default::default()
    };
    result.nodes.sort();

    if node_count <= cfg.lod_simplify_threshold {
        result.edges = weighted_edges;
        return result;
    }

    weighted_edges.retain(|e| e.weight > 1);
    result.simplified = true;

    if node_count <= cfg.lod_cluster_threshold {
        result.edges = weighted_edges;
        return result;
    }

    result.clustered = true;
    cluster_nodes(nodes, &weighted_edges, &mut result);
    result
}

fn cluster_nodes(nodes: &[LodNode], edges: &[LodEdge], result: &mut LodResult) {
    use std::collections::HashMap;

    let mut membership: HashMap<&str, String> = HashMap::new();
    let mut clusters: HashMap<(&'static str, String), Vec<String>> = HashMap::new();

    for node in nodes {
        let key = (node.kind, node.path_prefix.clone());
        let cluster_id = format!("cluster:{}:{}", node.kind, node.path_prefix);
        membership.insert(node.id.as_str(), cluster_id);
        clusters.entry(key).or_default().push(node.id.clone());
    }

    let mut cluster_edge_weights: HashMap<(String, String), usize> = HashMap::new();
    for edge in edges {
        let Some(from_cluster) = membership.get(edge.from.as_str()) else { continue };
        let Some(to_cluster) = membership.get(edge.to.as_str()) else { continue };
        if from_cluster == to_cluster {
            continue;
        }
        let key = (from_cluster.clone(), to_cluster.clone());
        let entry = cluster_edge_weights.entry(key).or_insert(0);
        *entry = (*entry).max(edge.weight);
    }

    let mut cluster_nodes: Vec<ClusterNode> = clusters
        .into_iter()
        .map(|((kind, path_prefix), mut members)| {
            members.sort();
            let cluster_id = format!("cluster:{kind}:{path_prefix}");
            let weight = cluster_edge_weights
                .iter()
                .filter(|((from, _), _)| from == &cluster_id)
                .map(|(_, w)| *w)
                .max()
                .unwrap_or(0);
            ClusterNode { cluster_id, kind, path_prefix, member_ids: members, weight }
        })
        .collect();
    cluster_nodes.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));

    let mut cluster_edges: Vec<LodEdge> = cluster_edge_weights
        .into_iter()
        .map(|((from, to), weight)| LodEdge { from, to, weight })
        .collect();
    cluster_edges.sort_by(|a, b| (a.from.clone(), a.to.clone()).cmp(&(b.from.clone(), b.to.clone())));

    result.nodes = cluster_nodes.iter().map(|c| c.cluster_id.clone()).collect();
    result.edges = cluster_edges;
    result.clusters = cluster_nodes;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_snippet_slices_inclusive_line_range() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ts"), "line1\nline2\nline3\nline4\n").unwrap();
        let loader = ContentLoader::new(dir.path(), 10);
        let snippet = loader.load_snippet("a.ts", 2, 3).unwrap();
        assert_eq!(snippet.content, "line2\nline3");
    }

    #[test]
    fn load_snippet_caches_on_second_call() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ts"), "line1\nline2\n").unwrap();
        let loader = ContentLoader::new(dir.path(), 10);
        loader.load_snippet("a.ts", 1, 1).unwrap();
        assert_eq!(loader.len(), 1);
        loader.load_snippet("a.ts", 1, 1).unwrap();
        assert_eq!(loader.len(), 1);
    }

    #[test]
    fn load_snippet_clamps_out_of_range_end() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ts"), "line1\nline2\n").unwrap();
        let loader = ContentLoader::new(dir.path(), 10);
        let snippet = loader.load_snippet("a.ts", 1, 1000).unwrap();
        assert_eq!(snippet.content, "line1\nline2");
    }

    #[test]
    fn invalidate_file_drops_only_that_files_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ts"), "line1\n").unwrap();
        std::fs::write(dir.path().join("b.ts"), "line1\n").unwrap();
        let loader = ContentLoader::new(dir.path(), 10);
        loader.load_snippet("a.ts", 1, 1).unwrap();
        loader.load_snippet("b.ts", 1, 1).unwrap();
        loader.invalidate_file("a.ts");
        assert_eq!(loader.len(), 1);
    }

    fn node(id: &str, kind: &'static str, prefix: &str) -> LodNode {
        LodNode { id: id.to_string(), kind, path_prefix: prefix.to_string() }
    }

    #[test]
    fn small_graphs_are_untouched() {
        let nodes = vec![node("a", "chunk", "src"), node("b", "chunk", "src")];
        let edges = vec![("a".to_string(), "b".to_string(), EdgeKind::Mentions)];
        let cfg = RetrievalConfig::default();
        let result = apply_lod(&nodes, &edges, &cfg);
        assert!(!result.simplified);
        assert!(!result.clustered);
        assert_eq!(result.edges.len(), 1);
    }

    #[test]
    fn simplification_drops_low_weight_edges_above_threshold() {
        let mut cfg = RetrievalConfig::default();
        cfg.lod_simplify_threshold = 2;
        cfg.lod_cluster_threshold = 1000;
        let nodes = vec![node("a", "chunk", "src"), node("b", "chunk", "src"), node("c", "chunk", "src")];
        let edges = vec![
            ("a".to_string(), "b".to_string(), EdgeKind::Mentions),
            ("a".to_string(), "c".to_string(), EdgeKind::Contains),
        ];
        let result = apply_lod(&nodes, &edges, &cfg);
        assert!(result.simplified);
        assert!(!result.clustered);
        assert_eq!(result.edges.len(), 1);
        assert_eq!(result.edges[0].weight, 3);
    }

    #[test]
    fn clustering_groups_by_kind_and_path_prefix_above_threshold() {
        let mut cfg = RetrievalConfig::default();
        cfg.lod_simplify_threshold = 1;
        cfg.lod_cluster_threshold = 2;
        let nodes = vec![
            node("a", "chunk", "src"),
            node("b", "chunk", "src"),
            node("c", "chunk", "lib"),
        ];
        let edges = vec![
            ("a".to_string(), "c".to_string(), EdgeKind::Contains),
            ("b".to_string(), "c".to_string(), EdgeKind::DefinedIn),
        ];
        let result = apply_lod(&nodes, &edges, &cfg);
        assert!(result.clustered);
        assert_eq!(result.clusters.len(), 2);
        assert_eq!(result.edges.len(), 1);
        assert_eq!(result.edges[0].weight, 3);
    }
}

//! Entity Discovery & Resolver: finds named concepts in documentation-like
//! chunks and canonicalizes them to stable graph ids.
//!
//! Provider trait + simple default implementation, the same shape the
//! content layer uses for language detection: a richer (e.g. LLM-backed)
//! provider is a drop-in replacement, never required for the default
//! pipeline to function.

use regex::Regex;
use std::sync::OnceLock;

use crate::chunk::{Chunk, ChunkType};
use crate::graph::schema::EntityNodeData;

/// Entity kinds recognized across the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Class,
    Function,
    Interface,
    Type,
    Api,
    Library,
    Framework,
    Concept,
    Pattern,
    Technology,
    Service,
    Component,
    Module,
    Package,
    Tool,
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Class => "class",
            EntityType::Function => "function",
            EntityType::Interface => "interface",
            EntityType::Type => "type",
            EntityType::Api => "api",
            EntityType::Library => "library",
            EntityType::Framework => "framework",
            EntityType::Concept => "concept",
            EntityType::Pattern => "pattern",
            EntityType::Technology => "technology",
            EntityType::Service => "service",
            EntityType::Component => "component",
            EntityType::Module => "module",
            EntityType::Package => "package",
            EntityType::Tool => "tool",
            EntityType::Other => "other",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: EntityType,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct EntityRelationship {
    pub from_name: String,
    pub to_name: String,
    pub relationship: String,
}

#[derive(Debug, Default, Clone)]
pub struct DiscoveryResult {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<EntityRelationship>,
}

pub trait EntityProvider: Send + Sync {
    fn discover(&self, chunk_content: &str) -> DiscoveryResult;
}

/// Regex-over-known-keyword-sets provider: functions entirely offline, no
/// LLM required to compile or run the default pipeline.
pub struct LexicalEntityProvider;

struct KeywordEntry {
    pattern: &'static str,
    entity_type: EntityType,
    confidence: f32,
}

static KEYWORD_TABLE: &[KeywordEntry] = &[
    KeywordEntry { pattern: r"\breact\b", entity_type: EntityType::Framework, confidence: 0.95 },
    KeywordEntry { pattern: r"\bvue\b", entity_type: EntityType::Framework, confidence: 0.9 },
    KeywordEntry { pattern: r"\bangular\b", entity_type: EntityType::Framework, confidence: 0.9 },
    KeywordEntry { pattern: r"\bexpress\b", entity_type: EntityType::Framework, confidence: 0.85 },
    KeywordEntry { pattern: r"\bnext\.?js\b", entity_type: EntityType::Framework, confidence: 0.9 },
    KeywordEntry { pattern: r"\btypescript\b", entity_type: EntityType::Technology, confidence: 0.95 },
    KeywordEntry { pattern: r"\bjavascript\b", entity_type: EntityType::Technology, confidence: 0.95 },
    KeywordEntry { pattern: r"\bgraphql\b", entity_type: EntityType::Technology, confidence: 0.9 },
    KeywordEntry { pattern: r"\brest\s+api\b", entity_type: EntityType::Api, confidence: 0.8 },
    KeywordEntry { pattern: r"\bauthentication\b", entity_type: EntityType::Concept, confidence: 0.85 },
    KeywordEntry { pattern: r"\bauthorization\b", entity_type: EntityType::Concept, confidence: 0.85 },
    KeywordEntry { pattern: r"\bmiddleware\b", entity_type: EntityType::Pattern, confidence: 0.8 },
    KeywordEntry { pattern: r"\bsingleton\b", entity_type: EntityType::Pattern, confidence: 0.8 },
    KeywordEntry { pattern: r"\bobserver\s+pattern\b", entity_type: EntityType::Pattern, confidence: 0.85 },
    KeywordEntry { pattern: r"\bredis\b", entity_type: EntityType::Service, confidence: 0.85 },
    KeywordEntry { pattern: r"\bpostgres(ql)?\b", entity_type: EntityType::Service, confidence: 0.85 },
    KeywordEntry { pattern: r"\bdocker\b", entity_type: EntityType::Tool, confidence: 0.85 },
    KeywordEntry { pattern: r"\bwebpack\b", entity_type: EntityType::Tool, confidence: 0.8 },
    KeywordEntry { pattern: r"\bvite\b", entity_type: EntityType::Tool, confidence: 0.8 },
    KeywordEntry { pattern: r"\bnpm\b", entity_type: EntityType::Tool, confidence: 0.75 },
];

fn compiled_patterns() -> &'static Vec<(Regex, EntityType, f32)> {
    static CELL: OnceLock<Vec<(Regex, EntityType, f32)>> = OnceLock::new();
    CELL.get_or_init(|| {
        KEYWORD_TABLE
            .iter()
            .map(|entry| {
                (
                    Regex::new(&format!("(?i){}", entry.pattern)).expect("static keyword pattern is valid"),
                    entry.entity_type,
                    entry.confidence,
                )
            })
            .collect()
    })
}

impl EntityProvider for LexicalEntityProvider {
    fn discover(&self, chunk_content: &str) -> DiscoveryResult {
        let mut entities = Vec::new();
        for (regex, entity_type, confidence) in compiled_patterns() {
            if let Some(m) = regex.find(chunk_content) {
                entities.push(ExtractedEntity {
                    name: m.as_str().to_string(),
                    entity_type: *entity_type,
                    confidence: *confidence,
                });
            }
        }
        DiscoveryResult { entities, relationships: Vec::new() }
    }
}

pub struct EntityResolverConfig {
    pub confidence_threshold: f32,
    pub per_chunk_cap: usize,
}

impl Default for EntityResolverConfig {
    fn default() -> Self {
        Self { confidence_threshold: 0.7, per_chunk_cap: 20 }
    }
}

/// A discovered entity after canonicalization, ready for `MENTIONS` linking.
pub struct ResolvedMention {
    pub chunk_id: String,
    pub canonical_id: String,
    pub entity_type: EntityType,
    pub display_name: String,
    pub confidence: f32,
}

/// Drives discovery + filtering + canonical-key normalization for one
/// chunk. Graph-level dedupe (the "hit → reuse id" half of resolution, since
/// it needs the entity index) happens in the orchestrator, which is the only
/// place with a live `GraphStore` handle.
pub struct EntityResolver<P: EntityProvider> {
    provider: P,
    config: EntityResolverConfig,
}

impl<P: EntityProvider> EntityResolver<P> {
    pub fn new(provider: P, config: EntityResolverConfig) -> Self {
        Self { provider, config }
    }

    /// Entity-eligible chunk types per the discovery scope.
    pub fn is_eligible(chunk: &Chunk) -> bool {
        chunk.metadata.chunk_type.is_entity_eligible()
            || chunk.metadata.language.as_deref() == Some("markdown")
    }

    /// Discover, filter, and canonicalize entities for one chunk. Returns
    /// `(canonical_key, display_name, entity_type, confidence)` tuples ready
    /// for the orchestrator to resolve against the graph's entity index,
    /// plus any relationships the provider proposed between raw entity names
    /// (unfiltered by confidence — only entities get a confidence gate, not
    /// edges; the orchestrator drops a relationship whose endpoint never
    /// resolved).
    pub fn process_chunk(&self, chunk: &Chunk) -> (Vec<(String, String, EntityType, f32)>, Vec<EntityRelationship>) {
        if !Self::is_eligible(chunk) {
            return (Vec::new(), Vec::new());
        }

        let discovery = self.provider.discover(&chunk.content);
        let mut accepted: Vec<_> = discovery
            .entities
            .into_iter()
            .filter(|e| e.confidence >= self.config.confidence_threshold)
            .collect();
        accepted.truncate(self.config.per_chunk_cap);

        let entities = accepted
            .into_iter()
            .map(|e| {
                let key = canonical_key(&e.name, e.entity_type);
                (key, e.name, e.entity_type, e.confidence)
            })
            .collect();

        (entities, discovery.relationships)
    }
}

/// Lowercased, punctuation-stripped form of a name, the first half of the
/// canonical `(normalized-name, type)` key.
pub fn normalize_name(name: &str) -> String {
    name.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase()
}

/// Normalize to `(lowercased-alphanumeric-name, type)`.
pub fn canonical_key(name: &str, entity_type: EntityType) -> String {
    format!("{}:{}", entity_type.as_str(), normalize_name(name))
}

/// Suffixes stripped for [`symbol_stem`], longest first so a longer overlap
/// (e.g. "ication") wins over a shorter one that would also match
/// ("ation"). Not a real stemmer — just enough shared-root overlap to
/// bridge a declaration's symbol name to a same-concept noun discovered
/// elsewhere (`authenticate` / `authentication`).
const STEM_SUFFIXES: &[&str] = &[
    "ications", "ication", "ibility", "ations", "ation", "icate", "ition", "ances", "ences", "ing", "ers", "ate",
    "ion", "er", "ed", "es", "s", "e",
];

/// Strip the first matching suffix from an already-[`normalize_name`]d
/// string, provided the remaining root is at least 3 characters (otherwise
/// return the input unchanged, to avoid collapsing short unrelated words).
pub fn symbol_stem(normalized: &str) -> String {
    for suffix in STEM_SUFFIXES {
        if let Some(root) = normalized.strip_suffix(suffix) {
            if root.len() >= 3 {
                return root.to_string();
            }
        }
    }
    normalized.to_string()
}

/// Bridge a bare code declaration's symbol name to an entity already
/// discovered elsewhere in the workspace (e.g. a markdown section), when
/// the two names share a stem under [`symbol_stem`]. This is the one
/// additional seam of non-determinism invariant 9 (§3.2) permits beyond
/// exact canonical-key matching: it only ever reuses an entity that
/// already exists in the graph, never coins a new one, so a declaration
/// whose name has no stem match anywhere earns no entity at all.
pub fn symbol_definition_bridge(symbol_name: &str, existing: &[EntityNodeData]) -> Option<String> {
    let target_stem = symbol_stem(&normalize_name(symbol_name));
    if target_stem.len() < 3 {
        return None;
    }
    existing
        .iter()
        .find(|e| {
            let normalized = e.canonical_id.splitn(2, ':').nth(1).unwrap_or(e.canonical_id.as_str());
            symbol_stem(normalized) == target_stem
        })
        .map(|e| e.canonical_id.clone())
}

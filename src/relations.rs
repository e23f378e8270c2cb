//! Relationship Extractor: import analysis and doc↔code pairing.
//!
//! Follows a classify-prefix/normalize-key/resolve-or-skip shape, applied
//! here to ECMAScript `import`/`require` syntax instead of Rust `use`
//! declarations.

use std::path::Path;

use tree_sitter::{Node, Parser as TsParser};

use crate::chunk::{Chunk, ChunkType};

/// One import found in a TS/JS/JSX file before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpecifier {
    pub specifier: String,
    pub named: Vec<String>,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// Bare specifier (`"react"`, `"lodash/debounce"`): external, never resolved.
    External,
    /// Relative (`"./x"`, `"../y"`) or workspace-absolute (`"/src/x"`) path.
    Local,
}

/// Edges this extractor discovers for one file, in the shape the graph store
/// expects (endpoint ids, not yet materialized as sqlitegraph edges).
#[derive(Debug, Default, Clone)]
pub struct ExtractedRelations {
    /// (source_file_path, target_file_path)
    pub imports: Vec<(String, String)>,
    /// (source_chunk_id, target_file_path, named_symbol) — the orchestrator
    /// resolves `named_symbol` against the target file's chunks (by
    /// symbolName substring match) and emits IMPORTS_SYMBOL only for hits,
    /// since this extractor has no graph access of its own.
    pub pending_symbol_imports: Vec<(String, String, String)>,
    /// (jsdoc_chunk_id, code_chunk_id)
    pub documents: Vec<(String, String)>,
}

const RESOLVABLE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];

pub struct RelationshipExtractor {
    typescript: TsParser,
    javascript: TsParser,
}

impl RelationshipExtractor {
    pub fn new() -> anyhow::Result<Self> {
        let mut typescript = TsParser::new();
        typescript.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())?;
        let mut javascript = TsParser::new();
        javascript.set_language(&tree_sitter_javascript::LANGUAGE.into())?;
        Ok(Self { typescript, javascript })
    }

    /// Extract every relationship this file can produce given the current
    /// snapshot of `known_files` (paths already present in the graph).
    pub fn extract(
        &mut self,
        path: &str,
        content: &str,
        chunks: &[Chunk],
        known_files: &[String],
    ) -> ExtractedRelations {
        let mut relations = ExtractedRelations::default();
        relations.documents = documents_edges(chunks);

        let is_ts_like = path.ends_with(".ts") || path.ends_with(".tsx") || path.ends_with(".js") || path.ends_with(".jsx");
        if !is_ts_like {
            return relations;
        }

        let parser = if path.ends_with(".ts") || path.ends_with(".tsx") {
            &mut self.typescript
        } else {
            &mut self.javascript
        };

        let Some(tree) = parser.parse(content.as_bytes(), None) else {
            return relations;
        };

        let specifiers = collect_import_specifiers(tree.root_node(), content.as_bytes());
        for spec in specifiers {
            if spec.kind == ImportKind::External {
                continue;
            }
            let Some(target_path) = resolve_specifier(path, &spec.specifier, known_files) else {
                continue;
            };
            if target_path == path {
                // Self-import via barrel index: already satisfied, not materialized.
                continue;
            }
            relations.imports.push((path.to_string(), target_path.clone()));

            for named in &spec.named {
                for source_chunk in chunks {
                    relations.pending_symbol_imports.push((
                        source_chunk.id.clone(),
                        target_path.clone(),
                        named.clone(),
                    ));
                }
            }
        }

        relations
    }
}

impl Default for RelationshipExtractor {
    fn default() -> Self {
        Self::new().expect("failed to initialize import-analysis grammars")
    }
}

/// Pair jsdoc chunks to code chunks sharing file + symbolName, per the
/// invariant that `DOCUMENTS` only connects same-file, same-symbol pairs.
pub fn documents_edges(chunks: &[Chunk]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for jsdoc in chunks.iter().filter(|c| c.metadata.chunk_type == ChunkType::Jsdoc) {
        let Some(name) = &jsdoc.metadata.symbol_name else { continue };
        if let Some(code) = chunks.iter().find(|c| {
            c.metadata.chunk_type == ChunkType::Code
                && c.metadata.file_path == jsdoc.metadata.file_path
                && c.metadata.symbol_name.as_deref() == Some(name.as_str())
        }) {
            pairs.push((jsdoc.id.clone(), code.id.clone()));
        }
    }
    pairs
}

fn collect_import_specifiers(root: Node, source: &[u8]) -> Vec<ImportSpecifier> {
    let mut out = Vec::new();
    let mut cursor = root.walk();
    walk_for_imports(root, &mut cursor, source, &mut out);
    out
}

fn walk_for_imports(node: Node, cursor: &mut tree_sitter::TreeCursor, source: &[u8], out: &mut Vec<ImportSpecifier>) {
    for child in node.children(cursor) {
        match child.kind() {
            "import_statement" => {
                if let Some(spec) = parse_import_statement(child, source) {
                    out.push(spec);
                }
            }
            "call_expression" => {
                if let Some(spec) = parse_require_call(child, source) {
                    out.push(spec);
                }
            }
            _ => {}
        }
        let mut inner = child.walk();
        walk_for_imports(child, &mut inner, source, out);
    }
}

fn parse_import_statement(node: Node, source: &[u8]) -> Option<ImportSpecifier> {
    let source_node = node.child_by_field_name("source")?;
    let raw = source_node.utf8_text(source).ok()?;
    let specifier = strip_quotes(raw);

    let mut named = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "import_clause" {
            collect_named_imports(child, source, &mut named);
        }
    }

    Some(ImportSpecifier {
        kind: classify_specifier(&specifier),
        specifier,
        named,
    })
}

fn collect_named_imports(node: Node, source: &[u8], out: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "named_imports" => {
                let mut inner = child.walk();
                for spec in child.children(&mut inner) {
                    if spec.kind() == "import_specifier" {
                        if let Some(name_node) = spec.child_by_field_name("name") {
                            if let Ok(name) = name_node.utf8_text(source) {
                                out.push(name.to_string());
                            }
                        }
                    }
                }
            }
            "identifier" => {
                if let Ok(name) = child.utf8_text(source) {
                    out.push(name.to_string());
                }
            }
            _ => collect_named_imports(child, source, out),
        }
    }
}

fn parse_require_call(node: Node, source: &[u8]) -> Option<ImportSpecifier> {
    let function = node.child_by_field_name("function")?;
    if function.utf8_text(source).ok()? != "require" {
        return None;
    }
    let args = node.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    let first_string = args.children(&mut cursor).find(|c| c.kind() == "string")?;
    let raw = first_string.utf8_text(source).ok()?;
    let specifier = strip_quotes(raw);
    Some(ImportSpecifier {
        kind: classify_specifier(&specifier),
        specifier,
        named: Vec::new(),
    })
}

fn strip_quotes(raw: &str) -> String {
    raw.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

fn classify_specifier(specifier: &str) -> ImportKind {
    if specifier.starts_with('.') || specifier.starts_with('/') {
        ImportKind::Local
    } else {
        ImportKind::External
    }
}

/// Resolve a relative/absolute specifier against the directory of `source_path`,
/// probing `{.ts,.tsx,.js,.jsx}` and `index.<ext>` forms, against the current
/// set of `known_files`.
fn resolve_specifier(source_path: &str, specifier: &str, known_files: &[String]) -> Option<String> {
    let base_dir = Path::new(source_path).parent().unwrap_or_else(|| Path::new(""));
    let joined = if specifier.starts_with('/') {
        Path::new(specifier.trim_start_matches('/')).to_path_buf()
    } else {
        base_dir.join(specifier)
    };

    let normalized = normalize_components(&joined);

    for ext in RESOLVABLE_EXTENSIONS {
        let candidate = format!("{normalized}.{ext}");
        if known_files.iter().any(|f| f == &candidate) {
            return Some(candidate);
        }
    }
    for ext in RESOLVABLE_EXTENSIONS {
        let candidate = format!("{normalized}/index.{ext}");
        if known_files.iter().any(|f| f == &candidate) {
            return Some(candidate);
        }
    }
    if known_files.iter().any(|f| f == &normalized) {
        return Some(normalized);
    }
    None
}

fn normalize_components(path: &Path) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                parts.pop();
            }
            std::path::Component::CurDir => {}
            std::path::Component::Normal(os) => {
                if let Some(s) = os.to_str() {
                    parts.push(s);
                }
            }
            _ => {}
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, ChunkType, SymbolKind};

    #[test]
    fn classifies_external_vs_local_specifiers() {
        assert_eq!(classify_specifier("react"), ImportKind::External);
        assert_eq!(classify_specifier("./util"), ImportKind::Local);
        assert_eq!(classify_specifier("../lib/util"), ImportKind::Local);
        assert_eq!(classify_specifier("/src/util"), ImportKind::Local);
    }

    #[test]
    fn resolves_relative_specifier_against_known_files() {
        let known = vec!["src/a.ts".to_string(), "src/b.ts".to_string()];
        let resolved = resolve_specifier("src/a.ts", "./b", &known);
        assert_eq!(resolved, Some("src/b.ts".to_string()));
    }

    #[test]
    fn unresolved_specifier_yields_none() {
        let known = vec!["src/a.ts".to_string()];
        assert_eq!(resolve_specifier("src/a.ts", "./missing", &known), None);
    }

    #[test]
    fn external_import_is_never_resolved_even_if_coincidentally_known() {
        assert_eq!(classify_specifier("lodash"), ImportKind::External);
    }

    #[test]
    fn extracts_import_statement_with_named_specifiers() {
        let mut extractor = RelationshipExtractor::new().unwrap();
        let known = vec!["a.ts".to_string(), "b.ts".to_string()];
        let content = "import { B } from './b';\nexport function useB() { return B; }\n";
        let relations = extractor.extract("a.ts", content, &[], &known);
        assert_eq!(relations.imports, vec![("a.ts".to_string(), "b.ts".to_string())]);
    }

    #[test]
    fn self_import_is_not_materialized() {
        let mut extractor = RelationshipExtractor::new().unwrap();
        let known = vec!["index.ts".to_string()];
        let content = "import { x } from './index';\n";
        let relations = extractor.extract("index.ts", content, &[], &known);
        assert!(relations.imports.is_empty());
    }

    #[test]
    fn documents_edges_pair_matching_symbol_names_only() {
        let jsdoc = Chunk::new("f.ts", 1, 1, ChunkType::Jsdoc, "/** doc */".to_string())
            .with_symbol("f", SymbolKind::Function);
        let code_f = Chunk::new("f.ts", 2, 2, ChunkType::Code, "function f(){}".to_string())
            .with_symbol("f", SymbolKind::Function);
        let code_g = Chunk::new("f.ts", 3, 3, ChunkType::Code, "function g(){}".to_string())
            .with_symbol("g", SymbolKind::Function);

        let pairs = documents_edges(&[jsdoc.clone(), code_f.clone(), code_g]);
        assert_eq!(pairs, vec![(jsdoc.id, code_f.id)]);
    }
}

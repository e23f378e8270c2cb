//! TypeScript / JavaScript / JSX parser.
//!
//! Walks top-level declarations (function, class, interface, type alias,
//! variable) and emits one `jsdoc` chunk per declaration immediately preceded
//! by a `/** ... */` block comment (blank lines only may separate them),
//! optionally paired with a `code` chunk spanning the declaration body.
//! Syntax errors are non-fatal: tree-sitter's error-recovery tree is walked
//! as far as it goes and anything unparseable simply yields no chunk.

use tree_sitter::{Node, Parser as TsParser};

use crate::chunk::{Chunk, ChunkType, SymbolKind};
use crate::content::Language;

/// One pool slot per grammar, built lazily and reused across files to avoid
/// re-allocating a `tree_sitter::Parser` on every call.
pub struct TypeScriptParserPool {
    typescript: TsParser,
    tsx: TsParser,
    javascript: TsParser,
}

impl TypeScriptParserPool {
    pub fn new() -> anyhow::Result<Self> {
        let mut typescript = TsParser::new();
        typescript.set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())?;

        let mut tsx = TsParser::new();
        tsx.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())?;

        let mut javascript = TsParser::new();
        javascript.set_language(&tree_sitter_javascript::LANGUAGE.into())?;

        Ok(Self {
            typescript,
            tsx,
            javascript,
        })
    }

    /// Parse `content` for `path` and emit chunks. Returns an empty
    /// vector on unsupported extension or unparseable content — never errors.
    pub fn parse(&mut self, path: &str, content: &str, language: Language) -> Vec<Chunk> {
        let is_jsx = path.ends_with(".tsx") || path.ends_with(".jsx");
        let parser = match (language, is_jsx) {
            (Language::TypeScript, true) => &mut self.tsx,
            (Language::TypeScript, false) => &mut self.typescript,
            (Language::JavaScript, _) => &mut self.javascript,
            _ => return Vec::new(),
        };

        let Some(tree) = parser.parse(content.as_bytes(), None) else {
            return Vec::new();
        };

        let root = tree.root_node();
        let source = content.as_bytes();
        let mut cursor = root.walk();
        let mut chunks = Vec::new();

        for child in root.children(&mut cursor) {
            let Some(decl) = unwrap_export(child) else { continue };
            let Some((name, kind)) = classify_declaration(decl, source) else { continue };
            emit_chunks_for_declaration(path, content, source, child, &name, kind, &mut chunks);
        }

        let basename = std::path::Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or(path);
        if basename.starts_with("vite.config.") {
            chunks.extend(parse_vite_config_sections(path, content));
        }

        chunks
    }
}

/// `vite.config.*` gets a named-export/object-literal split on top of the
/// ordinary declaration walk: `export default defineConfig({...})` (or a
/// bare `export default {...}`) is not one of the six declaration node
/// kinds the walk above handles, so without this it would yield zero
/// structural chunks and fall straight to the whole-file fallback. Each
/// top-level key of the exported object literal becomes one `config_block`
/// chunk instead.
///
/// This is a line-oriented brace-depth scan, not an AST walk: good enough
/// for the common `defineConfig({ key: value, ... })` shape, not a general
/// JS object-literal parser.
fn parse_vite_config_sections(path: &str, content: &str) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    let Some(marker_idx) = lines.iter().position(|l| l.contains("export default")) else {
        return Vec::new();
    };

    let mut depth = 0i32;
    let mut entered = false;
    let mut key_lines: Vec<usize> = Vec::new();
    let mut end_idx = lines.len();

    for (i, line) in lines.iter().enumerate().skip(marker_idx) {
        let depth_before = depth;
        if entered && depth_before == 1 {
            if top_level_key(line).is_some() {
                key_lines.push(i);
            }
        }
        let opens = line.matches('{').count() as i32;
        let closes = line.matches('}').count() as i32;
        if !entered && opens > 0 {
            entered = true;
        }
        depth += opens - closes;
        if entered && depth <= 0 {
            end_idx = i + 1;
            break;
        }
    }

    if key_lines.is_empty() {
        return Vec::new();
    }

    key_lines
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let finish = key_lines.get(i + 1).copied().unwrap_or(end_idx);
            let key = top_level_key(lines[start]).unwrap_or_default();
            let body = lines[start..finish].join("\n");
            Chunk::new(path, start + 1, finish, ChunkType::ConfigBlock, body)
                .with_symbol(key, SymbolKind::Other)
                .with_language("typescript")
        })
        .collect()
}

/// `key:` or `'key':` / `"key":` at the start of a (trimmed) line.
fn top_level_key(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let rest = trimmed
        .strip_prefix('\'')
        .or_else(|| trimmed.strip_prefix('"'))
        .unwrap_or(trimmed);
    let ident_end = rest.find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))?;
    if ident_end == 0 {
        return None;
    }
    let name = &rest[..ident_end];
    let after = rest[ident_end..].trim_start();
    let after = after.strip_prefix('\'').or_else(|| after.strip_prefix('"')).unwrap_or(after).trim_start();
    if after.starts_with(':') {
        Some(name.to_string())
    } else {
        None
    }
}

impl Default for TypeScriptParserPool {
    fn default() -> Self {
        Self::new().expect("failed to initialize TypeScript/JavaScript grammars")
    }
}

/// `export` and `export default` wrap the real declaration one level down;
/// unwrap so classification sees the actual `function_declaration` etc.
fn unwrap_export<'a>(node: Node<'a>) -> Option<Node<'a>> {
    if node.kind() == "export_statement" {
        if let Some(decl) = node.child_by_field_name("declaration") {
            return Some(decl);
        }
        let mut cursor = node.walk();
        return node.children(&mut cursor).find(|c| is_declaration_kind(c.kind()));
    }
    if is_declaration_kind(node.kind()) {
        return Some(node);
    }
    None
}

fn is_declaration_kind(kind: &str) -> bool {
    matches!(
        kind,
        "function_declaration"
            | "class_declaration"
            | "interface_declaration"
            | "type_alias_declaration"
            | "lexical_declaration"
            | "variable_declaration"
    )
}

fn classify_declaration(node: Node, source: &[u8]) -> Option<(String, SymbolKind)> {
    match node.kind() {
        "function_declaration" => node
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(source).ok())
            .map(|s| (s.to_string(), SymbolKind::Function)),
        "class_declaration" => node
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(source).ok())
            .map(|s| (s.to_string(), SymbolKind::Class)),
        "interface_declaration" => node
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(source).ok())
            .map(|s| (s.to_string(), SymbolKind::Interface)),
        "type_alias_declaration" => node
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(source).ok())
            .map(|s| (s.to_string(), SymbolKind::Type)),
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            node.children(&mut cursor)
                .find(|c| c.kind() == "variable_declarator")
                .and_then(|d| d.child_by_field_name("name"))
                .and_then(|n| n.utf8_text(source).ok())
                .map(|s| (s.to_string(), SymbolKind::Variable))
        }
        _ => None,
    }
}

/// Emit jsdoc/code chunks for one declaration (the `outer` node, which is the
/// `export_statement` when present so the jsdoc-lookahead sees the real
/// preceding sibling in source order).
fn emit_chunks_for_declaration(
    path: &str,
    content: &str,
    source: &[u8],
    outer: Node,
    name: &str,
    kind: SymbolKind,
    chunks: &mut Vec<Chunk>,
) {
    let decl_start_line = outer.start_position().row + 1;
    let decl_end_line = outer.end_position().row + 1;

    if let Some((doc_text, doc_start_line, doc_end_line)) = find_preceding_jsdoc(outer, source) {
        let chunk = Chunk::new(path, doc_start_line, doc_end_line, ChunkType::Jsdoc, doc_text)
            .with_symbol(name, kind);
        chunks.push(chunk);
    }

    let body_text = slice_lines(content, decl_start_line, decl_end_line);
    let code_chunk = Chunk::new(path, decl_start_line, decl_end_line, ChunkType::Code, body_text)
        .with_symbol(name, kind);
    chunks.push(code_chunk);
}

/// Find a `/** ... */` comment immediately above `node`, skipping blank lines
/// only — not other comments or code.
fn find_preceding_jsdoc(node: Node, source: &[u8]) -> Option<(String, usize, usize)> {
    let prev = node.prev_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }
    let text = prev.utf8_text(source).ok()?;
    if !text.starts_with("/**") {
        return None;
    }
    // `prev_sibling` is already the nearest AST sibling, and blank lines
    // produce no node of their own, so any number of blank lines between
    // the comment and the declaration still leaves the comment as `prev`;
    // only a non-blank, non-comment sibling in between would have made
    // `prev` something other than this comment.
    Some((text.to_string(), prev.start_position().row + 1, prev.end_position().row + 1))
}

fn slice_lines(content: &str, line_start: usize, line_end: usize) -> String {
    content
        .lines()
        .skip(line_start.saturating_sub(1))
        .take(line_end.saturating_sub(line_start) + 1)
        .collect::<Vec<_>>()
        .join("\n")
}

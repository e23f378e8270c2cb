//! PHP / Blade parser.
//!
//! PHP and Blade templates are walked with `tree-sitter-php` for top-level
//! function/class declarations, paired with an immediately preceding PHPDoc
//! block (`/** ... */`) the same way the TypeScript parser pairs JSDoc.
//! `.blade.php` files additionally get `html_block` chunks for the template
//! markup outside of `<?php ?>` tags, sectioned by the same top-level
//! tag/comment-boundary heuristic the HTML parser uses (Blade directives
//! like `@if`/`@foreach` carry no declarations tree-sitter-php understands).

use tree_sitter::{Node, Parser as TsParser};

use crate::chunk::{Chunk, ChunkType, SymbolKind};
use crate::parsers::html;

pub struct PhpParserPool {
    php: TsParser,
}

impl PhpParserPool {
    pub fn new() -> anyhow::Result<Self> {
        let mut php = TsParser::new();
        php.set_language(&tree_sitter_php::LANGUAGE_PHP.into())?;
        Ok(Self { php })
    }

    pub fn parse(&mut self, path: &str, content: &str) -> Vec<Chunk> {
        let Some(tree) = self.php.parse(content.as_bytes(), None) else {
            return Vec::new();
        };

        let root = tree.root_node();
        let source = content.as_bytes();
        let mut cursor = root.walk();
        let mut chunks = Vec::new();

        walk_declarations(root, &mut cursor, path, content, source, &mut chunks);

        if path.ends_with(".blade.php") {
            chunks.extend(extract_blade_markup(path, content));
        }

        chunks
    }
}

impl Default for PhpParserPool {
    fn default() -> Self {
        Self::new().expect("failed to initialize PHP grammar")
    }
}

fn walk_declarations(
    node: Node,
    cursor: &mut tree_sitter::TreeCursor,
    path: &str,
    content: &str,
    source: &[u8],
    chunks: &mut Vec<Chunk>,
) {
    for child in node.children(cursor) {
        match child.kind() {
            "function_definition" | "class_declaration" | "method_declaration" | "interface_declaration" => {
                if let Some((name, kind)) = classify(child, source) {
                    emit(path, content, source, child, &name, kind, chunks);
                }
                // Methods live inside class bodies; recurse to pick those up too.
                let mut inner = child.walk();
                walk_declarations(child, &mut inner, path, content, source, chunks);
            }
            _ => {
                let mut inner = child.walk();
                walk_declarations(child, &mut inner, path, content, source, chunks);
            }
        }
    }
}

fn classify(node: Node, source: &[u8]) -> Option<(String, SymbolKind)> {
    let name = node
        .child_by_field_name("name")
        .and_then(|n| n.utf8_text(source).ok())?;
    let kind = match node.kind() {
        "function_definition" | "method_declaration" => SymbolKind::Function,
        "class_declaration" => SymbolKind::Class,
        "interface_declaration" => SymbolKind::Interface,
        _ => SymbolKind::Other,
    };
    Some((name.to_string(), kind))
}

fn emit(
    path: &str,
    content: &str,
    source: &[u8],
    node: Node,
    name: &str,
    kind: SymbolKind,
    chunks: &mut Vec<Chunk>,
) {
    let start_line = node.start_position().row + 1;
    let end_line = node.end_position().row + 1;

    if let Some(prev) = node.prev_sibling() {
        if prev.kind() == "comment" {
            if let Ok(text) = prev.utf8_text(source) {
                if text.starts_with("/**") {
                    let gap = node.start_position().row.saturating_sub(prev.end_position().row);
                    if gap <= 1 {
                        let doc_chunk = Chunk::new(
                            path,
                            prev.start_position().row + 1,
                            prev.end_position().row + 1,
                            ChunkType::Jsdoc,
                            text.to_string(),
                        )
                        .with_symbol(name, kind)
                        .with_language("php");
                        chunks.push(doc_chunk);
                    }
                }
            }
        }
    }

    let body = content
        .lines()
        .skip(start_line - 1)
        .take(end_line - start_line + 1)
        .collect::<Vec<_>>()
        .join("\n");
    let code_chunk = Chunk::new(path, start_line, end_line, ChunkType::Code, body)
        .with_symbol(name, kind)
        .with_language("php");
    chunks.push(code_chunk);
}

/// Section a Blade file's markup into `html_block` chunks at top-level
/// tag/comment boundaries (the same heuristic `parsers::html` uses), tagged
/// with the `php` language since the surrounding file is still PHP-hosted.
/// Falls back to one whole-file chunk when no boundary is found, so a
/// Blade file that is pure directive soup (`@if`/`@foreach`, no markup tags)
/// still yields its template prose.
fn extract_blade_markup(path: &str, content: &str) -> Vec<Chunk> {
    if content.trim().is_empty() {
        return Vec::new();
    }
    let sections = html::parse_sections(path, content);
    if !sections.is_empty() {
        return sections.into_iter().map(|c| c.with_language("php")).collect();
    }
    let line_count = content.lines().count().max(1);
    vec![Chunk::new(path, 1, line_count, ChunkType::HtmlBlock, content.to_string()).with_language("php")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phpdoc_on_function_emits_jsdoc_and_code_chunks() {
        let source = "<?php\n/**\n * Greets someone\n */\nfunction greet($name) {\n    return \"hi $name\";\n}\n";
        let mut pool = PhpParserPool::new().unwrap();
        let chunks = pool.parse("greet.php", source);

        assert!(chunks
            .iter()
            .any(|c| c.metadata.chunk_type == ChunkType::Jsdoc && c.metadata.symbol_name.as_deref() == Some("greet")));
        assert!(chunks
            .iter()
            .any(|c| c.metadata.chunk_type == ChunkType::Code && c.metadata.symbol_name.as_deref() == Some("greet")));
    }

    #[test]
    fn blade_file_emits_html_block() {
        let source = "<div>@if($show)\n  hello\n@endif</div>\n";
        let mut pool = PhpParserPool::new().unwrap();
        let chunks = pool.parse("view.blade.php", source);
        assert!(chunks.iter().any(|c| c.metadata.chunk_type == ChunkType::HtmlBlock));
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        let mut pool = PhpParserPool::new().unwrap();
        let chunks = pool.parse("empty.php", "<?php\n");
        assert!(chunks.is_empty());
    }
}

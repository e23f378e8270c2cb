//! Parser Registry: dispatches a loaded file to the language-specific parser
//! and guarantees every indexable file yields at least one chunk.

pub mod html;
pub mod markdown;
pub mod php;
pub mod typescript;

use crate::chunk::{Chunk, ChunkType};
use crate::config::MarkdownChunkingConfig;
use crate::content::Language;

/// Owns the stateful per-grammar parser pools so they are built once per
/// process and reused across every file of a scan or watch session.
pub struct ParserRegistry {
    typescript: typescript::TypeScriptParserPool,
    php: php::PhpParserPool,
}

impl ParserRegistry {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            typescript: typescript::TypeScriptParserPool::new()?,
            php: php::PhpParserPool::new()?,
        })
    }

    /// Parse `content` for `path`, already known to be `language`. Falls back
    /// to a single whole-file chunk when the language-specific parser exists
    /// but produced nothing (e.g. a file with no top-level declarations).
    pub fn parse(
        &mut self,
        path: &str,
        content: &str,
        language: Language,
        markdown_cfg: &MarkdownChunkingConfig,
    ) -> Vec<Chunk> {
        let chunks = match language {
            Language::TypeScript | Language::JavaScript => self.typescript.parse(path, content, language),
            Language::Php => self.php.parse(path, content),
            Language::Markdown => markdown::parse(path, content, markdown_cfg),
            Language::Html => html::parse_sections(path, content),
            _ => Vec::new(),
        };

        if chunks.is_empty() {
            return fallback_whole_file_chunk(path, content).into_iter().collect();
        }
        chunks
    }
}

/// Synthesize one `code` chunk spanning the whole file, the Glossary's
/// fallback range `[1, total_line_count]`, for files no language parser
/// understands or that produced zero chunks.
fn fallback_whole_file_chunk(path: &str, content: &str) -> Option<Chunk> {
    if content.trim().is_empty() {
        return None;
    }
    let line_count = content.lines().count().max(1);
    Some(Chunk::new(path, 1, line_count, ChunkType::Code, content.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_language_falls_back_to_whole_file_chunk() {
        let mut registry = ParserRegistry::new().unwrap();
        let cfg = MarkdownChunkingConfig::default();
        let chunks = registry.parse("notes.txt", "hello\nworld\n", Language::PlainText, &cfg);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.line_start, 1);
        assert_eq!(chunks[0].metadata.line_end, 2);
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        let mut registry = ParserRegistry::new().unwrap();
        let cfg = MarkdownChunkingConfig::default();
        let chunks = registry.parse("empty.txt", "", Language::PlainText, &cfg);
        assert!(chunks.is_empty());
    }

    #[test]
    fn typescript_file_with_no_declarations_falls_back() {
        let mut registry = ParserRegistry::new().unwrap();
        let cfg = MarkdownChunkingConfig::default();
        let chunks = registry.parse("consts.ts", "1 + 1;\n", Language::TypeScript, &cfg);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.chunk_type, ChunkType::Code);
    }
}

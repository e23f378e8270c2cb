//! Markdown parser: ATX-heading sectioning plus an independent fixed-window
//! overlap mode for doc-style retrieval.

use serde_json::json;

use crate::chunk::{Chunk, ChunkType, SymbolKind};
use crate::config::MarkdownChunkingConfig;

/// Split `content` on ATX headings (levels 1-6). Each section spans from one
/// heading to the next heading of equal-or-higher level (smaller number), or
/// EOF. Section content is rendered as `"## <heading>\n\n<body>"` regardless
/// of the heading's own level, with `heading_level` and `heading` recorded in
/// chunk metadata.
pub fn parse_sections(path: &str, content: &str) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    let headings: Vec<(usize, usize, String)> = lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| heading_level(line).map(|(level, text)| (idx, level, text)))
        .map(|(idx, level, text)| (idx, level, text))
        .collect();

    if headings.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    for (i, (start_idx, level, heading)) in headings.iter().enumerate() {
        let end_idx = headings
            .iter()
            .skip(i + 1)
            .find(|(_, other_level, _)| other_level <= level)
            .map(|(idx, _, _)| *idx)
            .unwrap_or(lines.len());

        let body_lines = &lines[*start_idx + 1..end_idx];
        let body = body_lines.join("\n");
        let rendered = if body.is_empty() {
            format!("## {heading}\n\n")
        } else {
            format!("## {heading}\n\n{body}")
        };

        let line_start = start_idx + 1;
        let line_end = end_idx;
        let chunk = Chunk::new(path, line_start, line_end, ChunkType::MarkdownSection, rendered)
            .with_symbol(heading.clone(), SymbolKind::Heading)
            .with_language("markdown")
            .with_extra("heading_level", json!(level));
        chunks.push(chunk);
    }

    chunks
}

/// Fixed-line-window mode for documents without meaningful heading structure,
/// or when the caller wants overlap-windowed chunks regardless of headings.
/// Windows of `max_tokens` lines (a line stands in for a token here; the
/// embedding service is responsible for true tokenization) sliding forward by
/// `max_tokens - overlap_tokens` each step.
pub fn parse_overlap_windows(path: &str, content: &str, cfg: &MarkdownChunkingConfig) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let window = cfg.max_tokens.max(1);
    let overlap = cfg.overlap_tokens.min(window.saturating_sub(1));
    let stride = window - overlap;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + window).min(lines.len());
        let body = lines[start..end].join("\n");
        let chunk = Chunk::new(path, start + 1, end, ChunkType::DocumentSection, body)
            .with_language("markdown");
        chunks.push(chunk);

        if end >= lines.len() {
            break;
        }
        start += stride.max(1);
    }

    chunks
}

/// Parse top-level chunks for a markdown file: heading sections when
/// `respect_headers` is set and headings exist, falling back to overlap
/// windows otherwise.
pub fn parse(path: &str, content: &str, cfg: &MarkdownChunkingConfig) -> Vec<Chunk> {
    if cfg.respect_headers {
        let sections = parse_sections(path, content);
        if !sections.is_empty() {
            return sections;
        }
    }
    parse_overlap_windows(path, content, cfg)
}

fn heading_level(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') && !rest.is_empty() {
        return None;
    }
    Some((hashes, rest.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_atx_headings_with_level_and_heading_preserved() {
        let content = "# Intro\nhello\n## Details\nworld\n";
        let chunks = parse_sections("readme.md", content);

        assert_eq!(chunks.len(), 2);

        assert_eq!(chunks[0].metadata.symbol_name.as_deref(), Some("Intro"));
        assert_eq!(chunks[0].metadata.extra.get("heading_level"), Some(&json!(1)));
        // "Details" is level 2, lower than "Intro"'s level 1, so the level-1
        // section runs to EOF and swallows the nested "## Details" heading
        // and its body verbatim (equal-or-higher-level rule, spec.md:90).
        assert_eq!(chunks[0].content, "## Intro\n\nhello\n## Details\nworld");

        assert_eq!(chunks[1].metadata.symbol_name.as_deref(), Some("Details"));
        assert_eq!(chunks[1].metadata.extra.get("heading_level"), Some(&json!(2)));
        assert_eq!(chunks[1].content, "## Details\n\nworld");
    }

    #[test]
    fn section_ends_at_equal_or_higher_level_heading() {
        let content = "# A\n## B\ntext\n# C\nmore\n";
        let chunks = parse_sections("doc.md", content);
        assert_eq!(chunks.len(), 3);
        // "B" (level 2) does not end "A" (level 1); only "C" (level 1, equal)
        // does, so "A"'s section runs through "B"'s heading and body.
        assert_eq!(chunks[0].content, "## A\n\n## B\ntext");
        assert_eq!(chunks[1].content, "## B\n\ntext");
        assert_eq!(chunks[2].content, "## C\n\nmore");
    }

    #[test]
    fn no_headings_yields_no_sections() {
        assert!(parse_sections("plain.md", "just text\nno headings\n").is_empty());
    }

    #[test]
    fn overlap_windows_respect_stride_and_cover_whole_file() {
        let cfg = MarkdownChunkingConfig {
            strategy: "hybrid".to_string(),
            max_tokens: 3,
            overlap_tokens: 1,
            respect_headers: false,
        };
        let content = "l1\nl2\nl3\nl4\nl5\n";
        let chunks = parse_overlap_windows("notes.md", content, &cfg);
        assert!(chunks.len() >= 2);
        assert_eq!(chunks.last().unwrap().metadata.line_end, 5);
    }

    #[test]
    fn parse_falls_back_to_windows_when_no_headings() {
        let cfg = MarkdownChunkingConfig::default();
        let chunks = parse("plain.md", "one\ntwo\nthree\n", &cfg);
        assert!(chunks.iter().all(|c| c.metadata.chunk_type == ChunkType::DocumentSection));
    }
}

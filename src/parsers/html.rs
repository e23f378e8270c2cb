//! HTML / Blade markup parser: top-level tag sectioning plus doc-comment
//! absorption, the same "doc precedes section" shape as the TypeScript
//! parser's JSDoc pairing, adapted to markup instead of an AST.
//!
//! No HTML grammar is pulled in for this: boundaries are column-0 lines
//! (no leading whitespace) that open a tag (`<tag`, not `</tag`) or open a
//! comment (`<!--` or Blade's `{{--`). A comment boundary immediately
//! followed by a tag boundary (only blank lines between) is absorbed into
//! one section so the doc comment travels with the markup it describes.

use crate::chunk::{Chunk, ChunkType};

/// Split `content` into `html_block` chunks at top-level tag/comment
/// boundaries. Returns an empty vector when no such boundary exists (e.g. a
/// fragment with no unindented top-level element), letting the registry's
/// whole-file fallback take over.
pub fn parse_sections(path: &str, content: &str) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    let boundaries = find_boundaries(&lines);
    if boundaries.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    for (i, &start_idx) in boundaries.iter().enumerate() {
        let end_idx = boundaries.get(i + 1).copied().unwrap_or(lines.len());
        let body = lines[start_idx..end_idx].join("\n");
        let chunk = Chunk::new(path, start_idx + 1, end_idx, ChunkType::HtmlBlock, body);
        chunks.push(chunk);
    }
    chunks
}

fn find_boundaries(lines: &[&str]) -> Vec<usize> {
    let mut raw: Vec<(usize, bool)> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if is_comment_open(line) {
            raw.push((i, true));
        } else if is_tag_open(line) {
            raw.push((i, false));
        }
    }

    let mut boundaries = Vec::new();
    let mut i = 0;
    while i < raw.len() {
        let (idx, is_comment) = raw[i];
        boundaries.push(idx);
        if is_comment {
            if let Some(&(next_idx, next_is_comment)) = raw.get(i + 1) {
                let only_blank_between = lines[idx + 1..next_idx].iter().all(|l| l.trim().is_empty());
                if !next_is_comment && only_blank_between {
                    i += 1; // absorb the tag boundary the comment describes
                }
            }
        }
        i += 1;
    }
    boundaries
}

/// A top-level (unindented) opening tag, not a closing tag.
fn is_tag_open(line: &str) -> bool {
    if line.starts_with(' ') || line.starts_with('\t') {
        return false;
    }
    let trimmed = line.trim_start();
    trimmed.starts_with('<') && !trimmed.starts_with("</") && !trimmed.starts_with("<!--")
}

/// A top-level (unindented) HTML or Blade comment opener.
fn is_comment_open(line: &str) -> bool {
    if line.starts_with(' ') || line.starts_with('\t') {
        return false;
    }
    let trimmed = line.trim_start();
    trimmed.starts_with("<!--") || trimmed.starts_with("{{--")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_top_level_tags() {
        let content = "<header>\n  <h1>Title</h1>\n</header>\n<main>\n  <p>body</p>\n</main>\n";
        let chunks = parse_sections("page.html", content);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content.starts_with("<header>"));
        assert!(chunks[1].content.starts_with("<main>"));
    }

    #[test]
    fn comment_absorbs_into_following_section() {
        let content = "<!-- nav bar -->\n<nav>\n  <a href=\"/\">Home</a>\n</nav>\n";
        let chunks = parse_sections("page.html", content);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.starts_with("<!-- nav bar -->"));
        assert!(chunks[0].content.contains("<nav>"));
    }

    #[test]
    fn blade_comment_form_absorbs_into_following_section() {
        let content = "{{-- greeting --}}\n<div>\n  hi\n</div>\n";
        let chunks = parse_sections("view.blade.php", content);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.starts_with("{{-- greeting --}}"));
    }

    #[test]
    fn no_top_level_tags_yields_no_sections() {
        assert!(parse_sections("fragment.html", "  <span>inline only, indented</span>\n").is_empty());
    }
}

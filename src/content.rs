//! Content Store: hashing, language detection, byte loading.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::LoadError;
use crate::validation::resolve_against_root;

/// Result of loading a file's bytes, whatever the source.
pub struct LoadedContent {
    pub absolute_path: PathBuf,
    pub content: Vec<u8>,
    pub hash: String,
    pub size: usize,
    pub language: Language,
    pub is_inlined: bool,
}

/// Language table entry (Glossary "Language table"; >= 25 languages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    TypeScript,
    JavaScript,
    Python,
    Java,
    Cpp,
    C,
    Go,
    Rust,
    Php,
    Ruby,
    CSharp,
    Swift,
    Kotlin,
    Scala,
    Markdown,
    Json,
    Yaml,
    Xml,
    Html,
    Css,
    Scss,
    Sql,
    PlainText,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::C => "c",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Php => "php",
            Language::Ruby => "ruby",
            Language::CSharp => "csharp",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Scala => "scala",
            Language::Markdown => "markdown",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Xml => "xml",
            Language::Html => "html",
            Language::Css => "css",
            Language::Scss => "scss",
            Language::Sql => "sql",
            Language::PlainText => "plaintext",
        }
    }
}

/// Detect a file's language by extension (Glossary "Language table"), then by
/// filename pattern for the handful of extension-less configs the Parser
/// Registry also dispatches on.
pub fn detect_language(path: &Path) -> Language {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if file_name.ends_with(".blade.php") {
        return Language::Php;
    }
    if file_name.starts_with("vite.config.") {
        return Language::TypeScript;
    }

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "ts" | "tsx" => Language::TypeScript,
        "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
        "py" => Language::Python,
        "java" => Language::Java,
        "cpp" | "cc" | "cxx" | "hpp" => Language::Cpp,
        "c" | "h" => Language::C,
        "go" => Language::Go,
        "rs" => Language::Rust,
        "php" => Language::Php,
        "rb" => Language::Ruby,
        "cs" => Language::CSharp,
        "swift" => Language::Swift,
        "kt" => Language::Kotlin,
        "scala" => Language::Scala,
        "md" | "mdx" => Language::Markdown,
        "json" => Language::Json,
        "yaml" | "yml" => Language::Yaml,
        "xml" => Language::Xml,
        "html" | "htm" => Language::Html,
        "css" => Language::Css,
        "scss" => Language::Scss,
        "sql" => Language::Sql,
        _ => Language::PlainText,
    }
}

/// SHA-256 hex digest of raw bytes. Used for change detection and
/// available as chunk-id salt should the line-range scheme ever collide.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// The Content Store: loads file bytes either from disk or from a base64
/// inline payload, always producing a hash and detected language.
pub struct ContentStore {
    workspace_root: PathBuf,
}

impl ContentStore {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    /// Load content for `path_or_id`, optionally bypassing disk with `inline_payload`
    /// (a base64 string). Hash is always computed over the decoded/raw bytes.
    pub fn load(&self, path_or_id: &str, inline_payload: Option<&str>) -> Result<LoadedContent, LoadError> {
        let relative = Path::new(path_or_id);
        let absolute_path = resolve_against_root(relative, &self.workspace_root);

        if let Some(payload) = inline_payload {
            let content = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, payload)
                .map_err(|_| LoadError::BadInlinePayload)?;
            if content.is_empty() {
                return Err(LoadError::Empty {
                    path: path_or_id.to_string(),
                });
            }
            let hash = hash_bytes(&content);
            let size = content.len();
            let language = detect_language(&absolute_path);
            return Ok(LoadedContent {
                absolute_path,
                content,
                hash,
                size,
                language,
                is_inlined: true,
            });
        }

        if !absolute_path.exists() {
            return Err(LoadError::NotFound {
                path: path_or_id.to_string(),
            });
        }

        let content = std::fs::read(&absolute_path).map_err(|e| LoadError::Unreadable {
            path: path_or_id.to_string(),
            source: e,
        })?;

        if content.is_empty() {
            return Err(LoadError::Empty {
                path: path_or_id.to_string(),
            });
        }

        let hash = hash_bytes(&content);
        let size = content.len();
        let language = detect_language(&absolute_path);

        Ok(LoadedContent {
            absolute_path,
            content,
            hash,
            size,
            language,
            is_inlined: false,
        })
    }
}

/// Count lines-of-code the way `File.linesOfCode` is derived: a trailing
/// partial line still counts as a line.
pub fn count_lines(content: &[u8]) -> usize {
    if content.is_empty() {
        return 0;
    }
    let newlines = content.iter().filter(|b| **b == b'\n').count();
    if content.last() == Some(&b'\n') {
        newlines
    } else {
        newlines + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn detects_known_extensions() {
        assert_eq!(detect_language(Path::new("a.ts")).as_str(), "typescript");
        assert_eq!(detect_language(Path::new("a.tsx")).as_str(), "typescript");
        assert_eq!(detect_language(Path::new("a.js")).as_str(), "javascript");
        assert_eq!(detect_language(Path::new("a.md")).as_str(), "markdown");
        assert_eq!(detect_language(Path::new("a.rs")).as_str(), "rust");
        assert_eq!(detect_language(Path::new("a.unknown")).as_str(), "plaintext");
    }

    #[test]
    fn detects_filename_patterns() {
        assert_eq!(detect_language(Path::new("x.blade.php")).as_str(), "php");
        assert_eq!(detect_language(Path::new("vite.config.ts")).as_str(), "typescript");
    }

    #[test]
    fn hash_is_stable_and_sensitive_to_content() {
        let a = hash_bytes(b"hello");
        let b = hash_bytes(b"hello");
        let c = hash_bytes(b"world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn load_from_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("add.ts"), b"export const x = 1;").unwrap();
        let store = ContentStore::new(dir.path());
        let loaded = store.load("add.ts", None).unwrap();
        assert_eq!(loaded.content, b"export const x = 1;");
        assert!(!loaded.is_inlined);
        assert_eq!(loaded.language.as_str(), "typescript");
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let err = store.load("missing.ts", None).unwrap_err();
        assert!(matches!(err, LoadError::NotFound { .. }));
    }

    #[test]
    fn load_inline_payload_bypasses_disk() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let payload = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"hello world");
        let loaded = store.load("upload.md", Some(&payload)).unwrap();
        assert!(loaded.is_inlined);
        assert_eq!(loaded.content, b"hello world");
    }

    #[test]
    fn count_lines_counts_trailing_partial_line() {
        assert_eq!(count_lines(b"a\nb\nc"), 3);
        assert_eq!(count_lines(b"a\nb\nc\n"), 3);
        assert_eq!(count_lines(b""), 0);
    }
}

//! Workspace Scanner & Watcher: turns a directory tree into a stream of
//! enqueue/delete reconciliations against the Processing Queue and File
//! Metadata DB.
//!
//! Combines a sorted directory walk with path-traversal validation and a
//! notify-debouncer-mini batching thread, driving cappy's file-hash-and-
//! enqueue model instead of direct symbol indexing. A 300ms default debounce
//! keeps pace with cappy's cheaper per-file pipeline, and a `.cappyignore`
//! file is honored at the same precedence tier as `.gitignore`/`.ignore`.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;

use crate::content::hash_bytes;
use crate::error::ScanError;
use crate::graph::{GraphStore, SqliteGraphStore};
use crate::queue::ProcessingQueue;
use crate::validation::{validate_path_within_root, PathValidationError};
use crate::vector_store::VectorStore;

/// Directories never walked or watched, regardless of `.gitignore` content.
const INTERNAL_IGNORE_DIRS: &[&str] = &[".git", ".cappy", "target", "node_modules", ".venv", "venv", "__pycache__"];

/// Extensions never indexed: cappy's own backing stores, to avoid a feedback
/// loop where indexing the graph/vector/metadata db files triggers more writes.
const INTERNAL_IGNORE_EXTS: &[&str] = &[".db", ".db-journal", ".db-wal", ".db-shm", ".sqlite", ".sqlite3"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAFile,
    IgnoredInternal,
    IgnoredByGitignore,
}

/// Deterministic, pure filtering: same path and same `.gitignore`/`.ignore`/
/// `.cappyignore` contents always produce the same verdict.
pub struct FileFilter {
    root: PathBuf,
    gitignore: Option<Gitignore>,
}

impl FileFilter {
    pub fn new(root: &Path) -> Self {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let gitignore = Self::load_gitignore(&root);
        Self { root, gitignore }
    }

    fn load_gitignore(root: &Path) -> Option<Gitignore> {
        let mut builder = GitignoreBuilder::new(root);
        let mut any_loaded = false;
        for name in [".gitignore", ".ignore", ".cappyignore"] {
            let path = root.join(name);
            if !path.exists() {
                continue;
            }
            if let Some(err) = builder.add(&path) {
                eprintln!("cappy: warning: failed to load {name}: {err}");
                continue;
            }
            any_loaded = true;
        }
        if !any_loaded {
            return None;
        }
        match builder.build() {
            Ok(matcher) => Some(matcher),
            Err(e) => {
                eprintln!("cappy: warning: failed to compile ignore rules: {e}");
                None
            }
        }
    }

    pub fn should_skip(&self, path: &Path) -> Option<SkipReason> {
        if path.is_dir() {
            return Some(SkipReason::NotAFile);
        }
        if self.is_internal_ignore(path) {
            return Some(SkipReason::IgnoredInternal);
        }
        if let Some(ref gitignore) = self.gitignore {
            let check_path = path.strip_prefix(&self.root).unwrap_or(path);
            if gitignore.matched(check_path, false).is_ignore() {
                return Some(SkipReason::IgnoredByGitignore);
            }
            let mut current = check_path.parent();
            while let Some(ancestor) = current {
                if ancestor.as_os_str().is_empty() {
                    break;
                }
                if gitignore.matched(ancestor, true).is_ignore() {
                    return Some(SkipReason::IgnoredByGitignore);
                }
                current = ancestor.parent();
            }
        }
        None
    }

    fn is_internal_ignore(&self, path: &Path) -> bool {
        if path.components().any(|c| INTERNAL_IGNORE_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref())) {
            return true;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        INTERNAL_IGNORE_EXTS.iter().any(|ext| name.ends_with(ext))
    }
}

/// Outcome of [`scan_initial`].
#[derive(Debug, Default, Clone)]
pub struct ScanReport {
    pub scanned: usize,
    pub enqueued: usize,
    pub skipped: usize,
    pub deleted: usize,
}

/// Workspace-relative, forward-slash path for a file under `root`.
fn relative_path(path: &Path, root: &Path) -> Option<String> {
    path.strip_prefix(root).ok().map(|rel| rel.to_string_lossy().replace('\\', "/"))
}

/// Full directory walk: every candidate file is hash-compared
/// against its File Metadata DB row; missing or changed files are enqueued,
/// unchanged files are left alone, and DB rows for files that vanished since
/// the last run are reconciled as deletes.
pub fn scan_initial(root: &Path, filter: &FileFilter, queue: &ProcessingQueue) -> Result<ScanReport, ScanError> {
    let mut report = ScanReport::default();
    let mut seen_paths: HashSet<String> = HashSet::new();

    let mut candidates: Vec<PathBuf> = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(false).into_iter() {
        let entry = entry.map_err(|e| ScanError::WalkFailed(e.to_string()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        candidates.push(entry.into_path());
    }
    candidates.sort();

    for path in candidates {
        report.scanned += 1;

        match validate_path_within_root(&path, root) {
            Ok(_) => {}
            Err(PathValidationError::CannotCanonicalize(_)) => {
                // Deleted between the walk and here; not our concern during scan.
                continue;
            }
            Err(_) => {
                report.skipped += 1;
                continue;
            }
        }

        if filter.should_skip(&path).is_some() {
            report.skipped += 1;
            continue;
        }

        let Some(rel) = relative_path(&path, root) else {
            report.skipped += 1;
            continue;
        };
        seen_paths.insert(rel.clone());

        let Ok(bytes) = std::fs::read(&path) else {
            report.skipped += 1;
            continue;
        };
        let hash = hash_bytes(&bytes);

        let existing = queue.metadata().get_file_by_path(&rel).map_err(|e| ScanError::WalkFailed(e.to_string()))?;
        let needs_enqueue = match &existing {
            None => true,
            Some(record) => record.hash.as_deref() != Some(hash.as_str()),
        };
        if needs_enqueue {
            queue
                .enqueue(&rel, Some(&hash), bytes.len() as u64)
                .map_err(|e| ScanError::WalkFailed(e.to_string()))?;
            report.enqueued += 1;
        }
    }

    // Reconcile rows whose file vanished since the last scan: the initial
    // scan also converges the DB, not just the filesystem -> DB direction.
    let all_records = queue
        .metadata()
        .list(1, u32::MAX, "path", true)
        .map_err(|e| ScanError::WalkFailed(e.to_string()))?;
    for record in all_records {
        if seen_paths.contains(&record.path) {
            continue;
        }
        if let Err(e) = queue.metadata().delete(&record.file_id) {
            eprintln!("cappy: warning: failed to delete stale metadata row for {}: {e}", record.path);
            continue;
        }
        report.deleted += 1;
    }

    Ok(report)
}

/// Handle to a running background watcher thread.
pub struct WatcherHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WatcherHandle {
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Start watching `root` for changes. Each debounced batch of dirty paths is
/// reconciled against disk: present + changed hash -> enqueue; absent ->
/// delete from the graph, vector store, and File Metadata DB. Runs until
/// [`WatcherHandle::stop`] is called or the process exits.
pub fn spawn_watcher(
    root: PathBuf,
    debounce: Duration,
    queue: ProcessingQueue,
    graph_db_path: PathBuf,
    vectors: Arc<dyn VectorStore>,
) -> Result<WatcherHandle, ScanError> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_for_thread = shutdown.clone();

    let thread = thread::Builder::new()
        .name("cappy-watcher".to_string())
        .spawn(move || {
            if let Err(e) = run_watcher(root, debounce, queue, graph_db_path, vectors, shutdown_for_thread) {
                eprintln!("cappy: watcher thread exited with error: {e}");
            }
        })
        .map_err(|e| ScanError::WatcherStartFailed(e.to_string()))?;

    Ok(WatcherHandle { shutdown, thread: Some(thread) })
}

fn run_watcher(
    root: PathBuf,
    debounce: Duration,
    queue: ProcessingQueue,
    graph_db_path: PathBuf,
    vectors: Arc<dyn VectorStore>,
    shutdown: Arc<AtomicBool>,
) -> Result<(), ScanError> {
    let filter = FileFilter::new(&root);
    let mut graph = SqliteGraphStore::open(&graph_db_path)
        .map_err(|e| ScanError::WatcherStartFailed(format!("failed to open graph store for watcher: {e}")))?;

    let (batch_tx, batch_rx): (Sender<BTreeSet<PathBuf>>, Receiver<BTreeSet<PathBuf>>) = mpsc::channel();
    let watch_root = root.clone();
    let mut debouncer = new_debouncer(debounce, move |result: notify_debouncer_mini::DebounceEventResult| {
        match result {
            Ok(events) => {
                let paths: BTreeSet<PathBuf> = events.into_iter().map(|e| e.path).collect();
                if !paths.is_empty() {
                    let _ = batch_tx.send(paths);
                }
            }
            Err(e) => eprintln!("cappy: watcher error: {e:?}"),
        }
    })
    .map_err(|e| ScanError::WatcherStartFailed(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&watch_root, RecursiveMode::Recursive)
        .map_err(|e| ScanError::WatcherStartFailed(e.to_string()))?;

    while !shutdown.load(Ordering::SeqCst) {
        match batch_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(paths) => {
                for path in paths {
                    reconcile_path(&path, &root, &filter, &queue, &mut graph, &vectors);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

fn reconcile_path(
    path: &Path,
    root: &Path,
    filter: &FileFilter,
    queue: &ProcessingQueue,
    graph: &mut SqliteGraphStore,
    vectors: &Arc<dyn VectorStore>,
) {
    if filter.should_skip(path).is_some() {
        return;
    }
    let Some(rel) = relative_path(path, root) else { return };

    if !path.exists() {
        if let Err(e) = graph.delete_file(&rel) {
            eprintln!("cappy: watcher failed to delete graph facts for {rel}: {e}");
        }
        if let Err(e) = vectors.delete_by_file(&rel) {
            eprintln!("cappy: watcher failed to delete vectors for {rel}: {e}");
        }
        if let Ok(Some(record)) = queue.metadata().get_file_by_path(&rel) {
            if let Err(e) = queue.metadata().delete(&record.file_id) {
                eprintln!("cappy: watcher failed to delete metadata row for {rel}: {e}");
            }
        }
        return;
    }

    let Ok(bytes) = std::fs::read(path) else { return };
    let hash = hash_bytes(&bytes);
    let existing = queue.metadata().get_file_by_path(&rel).ok().flatten();
    let changed = existing.as_ref().map(|r| r.hash.as_deref() != Some(hash.as_str())).unwrap_or(true);
    if changed {
        if let Err(e) = queue.enqueue(&rel, Some(&hash), bytes.len() as u64) {
            eprintln!("cappy: watcher failed to enqueue {rel}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use tempfile::TempDir;

    fn build_queue() -> ProcessingQueue {
        ProcessingQueue::new(StdArc::new(crate::metadata_db::FileMetadataDb::in_memory().unwrap()), 3)
    }

    #[test]
    fn scan_initial_enqueues_new_files_and_skips_unchanged() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ts"), b"export const x = 1;").unwrap();
        std::fs::write(dir.path().join("b.ts"), b"export const y = 2;").unwrap();

        let queue = build_queue();
        let filter = FileFilter::new(dir.path());
        let report = scan_initial(dir.path(), &filter, &queue).unwrap();
        assert_eq!(report.enqueued, 2);

        // Re-scanning with no changes enqueues nothing new.
        let report2 = scan_initial(dir.path(), &filter, &queue).unwrap();
        assert_eq!(report2.enqueued, 0);
    }

    #[test]
    fn scan_initial_skips_internal_ignore_dirs() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/lib.ts"), b"export const z = 1;").unwrap();
        std::fs::write(dir.path().join("app.ts"), b"export const x = 1;").unwrap();

        let queue = build_queue();
        let filter = FileFilter::new(dir.path());
        let report = scan_initial(dir.path(), &filter, &queue).unwrap();
        assert_eq!(report.enqueued, 1);
    }

    #[test]
    fn scan_initial_honors_cappyignore() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".cappyignore"), b"ignored.ts\n").unwrap();
        std::fs::write(dir.path().join("ignored.ts"), b"export const z = 1;").unwrap();
        std::fs::write(dir.path().join("kept.ts"), b"export const x = 1;").unwrap();

        let queue = build_queue();
        let filter = FileFilter::new(dir.path());
        let report = scan_initial(dir.path(), &filter, &queue).unwrap();
        assert_eq!(report.enqueued, 1);
    }

    #[test]
    fn scan_initial_reconciles_deleted_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ts"), b"export const x = 1;").unwrap();

        let queue = build_queue();
        let filter = FileFilter::new(dir.path());
        scan_initial(dir.path(), &filter, &queue).unwrap();

        std::fs::remove_file(dir.path().join("a.ts")).unwrap();
        let report = scan_initial(dir.path(), &filter, &queue).unwrap();
        assert_eq!(report.deleted, 1);
        assert!(queue.metadata().get_file_by_path("a.ts").unwrap().is_none());
    }
}

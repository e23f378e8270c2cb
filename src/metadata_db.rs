//! File Metadata DB: durable per-file state machine, retry counters, timings.
//!
//! A `rusqlite`-backed table in the same auxiliary database file the chunk
//! and vector stores use, with its own schema migration kept separate from
//! the graph backend's private connection. Per-file write serialization is a
//! `Mutex`-guarded connection, same style as the content/vector stores.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};

use crate::error::GraphStoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Preprocessed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
            FileStatus::Failed => "failed",
            FileStatus::Preprocessed => "preprocessed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => FileStatus::Pending,
            "processing" => FileStatus::Processing,
            "completed" => FileStatus::Completed,
            "failed" => FileStatus::Failed,
            "preprocessed" => FileStatus::Preprocessed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub file_id: String,
    pub path: String,
    pub status: FileStatus,
    pub progress: u8,
    pub current_step: Option<String>,
    pub hash: Option<String>,
    pub size: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub chunks_count: u32,
    pub nodes_count: u32,
    pub relationships_count: u32,
    pub processing_started_at: Option<i64>,
    pub processing_completed_at: Option<i64>,
    pub enqueued_at: i64,
    /// Earliest epoch-millis at which a `pending` file becomes eligible for
    /// dequeue again; nonzero only after a retry backoff.
    pub next_eligible_at_ms: i64,
}

/// Deterministic fileId from a workspace-relative path.
pub fn file_id(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct FileMetadataDb {
    conn: Mutex<Connection>,
}

impl FileMetadataDb {
    pub fn open(path: &Path) -> Result<Self, GraphStoreError> {
        let conn = Connection::open(path).map_err(|e| GraphStoreError::SchemaMigration(e.to_string()))?;
        let db = Self { conn: Mutex::new(conn) };
        db.ensure_schema()?;
        db.reset_processing_on_startup()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self, GraphStoreError> {
        let conn = Connection::open(":memory:").map_err(|e| GraphStoreError::SchemaMigration(e.to_string()))?;
        let db = Self { conn: Mutex::new(conn) };
        db.ensure_schema()?;
        Ok(db)
    }

    fn ensure_schema(&self) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().expect("metadata db mutex poisoned");
        conn.execute(
            "CREATE TABLE IF NOT EXISTS files (
                file_id TEXT PRIMARY KEY,
                path TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                current_step TEXT,
                hash TEXT,
                size INTEGER NOT NULL DEFAULT 0,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                error_message TEXT,
                chunks_count INTEGER NOT NULL DEFAULT 0,
                nodes_count INTEGER NOT NULL DEFAULT 0,
                relationships_count INTEGER NOT NULL DEFAULT 0,
                processing_started_at INTEGER,
                processing_completed_at INTEGER,
                enqueued_at INTEGER NOT NULL,
                next_eligible_at_ms INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )
        .map_err(|e| GraphStoreError::SchemaMigration(e.to_string()))?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_files_status ON files(status)", [])
            .map_err(|e| GraphStoreError::SchemaMigration(e.to_string()))?;
        Ok(())
    }

    /// Crash recovery: any file left `processing` from a prior run never
    /// finished; reset it to `pending` so a worker can retry it.
    fn reset_processing_on_startup(&self) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().expect("metadata db mutex poisoned");
        conn.execute(
            "UPDATE files SET status = 'pending', current_step = NULL WHERE status = 'processing'",
            [],
        )
        .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub fn insert_file(&self, path: &str, hash: Option<&str>, size: u64, max_retries: u32) -> Result<String, GraphStoreError> {
        let conn = self.conn.lock().expect("metadata db mutex poisoned");
        let id = file_id(path);
        let now = Utc::now().timestamp();
        conn.execute(
            "INSERT INTO files (file_id, path, status, progress, hash, size, retry_count, max_retries, enqueued_at, next_eligible_at_ms)
             VALUES (?1, ?2, 'pending', 0, ?3, ?4, 0, ?5, ?6, 0)
             ON CONFLICT(path) DO UPDATE SET
                status = 'pending',
                hash = excluded.hash,
                size = excluded.size,
                retry_count = CASE WHEN files.hash IS NOT excluded.hash THEN 0 ELSE files.retry_count END,
                next_eligible_at_ms = CASE WHEN files.hash IS NOT excluded.hash THEN 0 ELSE files.next_eligible_at_ms END,
                enqueued_at = excluded.enqueued_at",
            params![id, path, hash, size as i64, max_retries, now],
        )
        .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
        Ok(id)
    }

    pub fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>, GraphStoreError> {
        let conn = self.conn.lock().expect("metadata db mutex poisoned");
        conn.query_row("SELECT * FROM files WHERE file_id = ?1", params![file_id], row_to_record)
            .optional()
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))
    }

    pub fn get_file_by_path(&self, path: &str) -> Result<Option<FileRecord>, GraphStoreError> {
        let conn = self.conn.lock().expect("metadata db mutex poisoned");
        conn.query_row("SELECT * FROM files WHERE path = ?1", params![path], row_to_record)
            .optional()
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))
    }

    pub fn list_by_status(&self, status: FileStatus) -> Result<Vec<FileRecord>, GraphStoreError> {
        let conn = self.conn.lock().expect("metadata db mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT * FROM files WHERE status = ?1 ORDER BY enqueued_at ASC")
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;
        let rows = stmt
            .query_map(params![status.as_str()], row_to_record)
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| GraphStoreError::ReadFailed(e.to_string()))
    }

    pub fn list(&self, page: u32, limit: u32, sort_by: &str, ascending: bool) -> Result<Vec<FileRecord>, GraphStoreError> {
        let column = match sort_by {
            "path" | "status" | "progress" | "enqueued_at" => sort_by,
            _ => "enqueued_at",
        };
        let direction = if ascending { "ASC" } else { "DESC" };
        let offset = page.saturating_sub(1) as i64 * limit as i64;

        let conn = self.conn.lock().expect("metadata db mutex poisoned");
        let query = format!("SELECT * FROM files ORDER BY {column} {direction} LIMIT ?1 OFFSET ?2");
        let mut stmt = conn.prepare(&query).map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;
        let rows = stmt
            .query_map(params![limit, offset], row_to_record)
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| GraphStoreError::ReadFailed(e.to_string()))
    }

    pub fn mark_processing(&self, file_id: &str) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().expect("metadata db mutex poisoned");
        let now = Utc::now().timestamp();
        conn.execute(
            "UPDATE files SET status = 'processing', progress = 0, processing_started_at = ?2, error_message = NULL WHERE file_id = ?1",
            params![file_id, now],
        )
        .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub fn update_progress(&self, file_id: &str, progress: u8, current_step: &str) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().expect("metadata db mutex poisoned");
        conn.execute(
            "UPDATE files SET progress = ?2, current_step = ?3 WHERE file_id = ?1",
            params![file_id, progress, current_step],
        )
        .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub fn mark_completed(
        &self,
        file_id: &str,
        chunks_count: u32,
        nodes_count: u32,
        relationships_count: u32,
    ) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().expect("metadata db mutex poisoned");
        let now = Utc::now().timestamp();
        conn.execute(
            "UPDATE files SET status = 'completed', progress = 100, current_step = NULL,
                chunks_count = ?2, nodes_count = ?3, relationships_count = ?4,
                processing_completed_at = ?5
             WHERE file_id = ?1",
            params![file_id, chunks_count, nodes_count, relationships_count, now],
        )
        .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    /// Apply the retry policy: increment retryCount; `pending` with
    /// exponential backoff (`retry_delay_millis * 2^(retryCount-1)`, capped at
    /// 1 minute) if still under the cap, else terminal `failed`. Returns the
    /// resulting status and retry count for the caller to schedule or report.
    pub fn mark_failed_or_retry(
        &self,
        file_id: &str,
        error_message: &str,
        retry_delay_millis: u64,
    ) -> Result<(FileStatus, u32), GraphStoreError> {
        let conn = self.conn.lock().expect("metadata db mutex poisoned");
        let (retry_count, max_retries): (u32, u32) = conn
            .query_row(
                "SELECT retry_count, max_retries FROM files WHERE file_id = ?1",
                params![file_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;

        let new_retry_count = retry_count + 1;
        let status = if new_retry_count <= max_retries { FileStatus::Pending } else { FileStatus::Failed };

        const MAX_BACKOFF_MS: u64 = 60_000;
        let backoff_ms = retry_delay_millis
            .saturating_mul(1u64 << (new_retry_count.saturating_sub(1)).min(32))
            .min(MAX_BACKOFF_MS);
        let next_eligible_at_ms = if status == FileStatus::Pending {
            Utc::now().timestamp_millis() + backoff_ms as i64
        } else {
            0
        };

        conn.execute(
            "UPDATE files SET status = ?2, retry_count = ?3, error_message = ?4, current_step = NULL, next_eligible_at_ms = ?5 WHERE file_id = ?1",
            params![file_id, status.as_str(), new_retry_count, error_message, next_eligible_at_ms],
        )
        .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;

        Ok((status, new_retry_count))
    }

    /// Atomically claim the earliest eligible `pending` file (hash-change
    /// coalescing already collapsed duplicates, so exactly one worker may
    /// process a given file at a time) and flip it to `processing`.
    /// The connection mutex makes this a single critical section even with
    /// several worker threads calling it concurrently.
    pub fn claim_next_pending(&self) -> Result<Option<FileRecord>, GraphStoreError> {
        let conn = self.conn.lock().expect("metadata db mutex poisoned");
        let now_ms = Utc::now().timestamp_millis();
        let record = conn
            .query_row(
                "SELECT * FROM files WHERE status = 'pending' AND next_eligible_at_ms <= ?1 ORDER BY enqueued_at ASC LIMIT 1",
                params![now_ms],
                row_to_record,
            )
            .optional()
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;

        let Some(record) = record else { return Ok(None) };

        let now = Utc::now().timestamp();
        conn.execute(
            "UPDATE files SET status = 'processing', progress = 0, processing_started_at = ?2, error_message = NULL WHERE file_id = ?1",
            params![record.file_id, now],
        )
        .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;

        Ok(Some(record))
    }

    pub fn delete(&self, file_id: &str) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().expect("metadata db mutex poisoned");
        conn.execute("DELETE FROM files WHERE file_id = ?1", params![file_id])
            .map_err(|e| GraphStoreError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub fn count_by_status(&self) -> Result<Vec<(FileStatus, usize)>, GraphStoreError> {
        let conn = self.conn.lock().expect("metadata db mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM files GROUP BY status")
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let status_str: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((status_str, count as usize))
            })
            .map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            let (status_str, count) = row.map_err(|e| GraphStoreError::ReadFailed(e.to_string()))?;
            if let Some(status) = FileStatus::from_str(&status_str) {
                out.push((status, count));
            }
        }
        Ok(out)
    }
}

fn row_to_record(row: &Row) -> rusqlite::Result<FileRecord> {
    let status_str: String = row.get("status")?;
    Ok(FileRecord {
        file_id: row.get("file_id")?,
        path: row.get("path")?,
        status: FileStatus::from_str(&status_str).unwrap_or(FileStatus::Pending),
        progress: row.get("progress")?,
        current_step: row.get("current_step")?,
        hash: row.get("hash")?,
        size: row.get::<_, i64>("size")? as u64,
        retry_count: row.get("retry_count")?,
        max_retries: row.get("max_retries")?,
        error_message: row.get("error_message")?,
        chunks_count: row.get("chunks_count")?,
        nodes_count: row.get("nodes_count")?,
        relationships_count: row.get("relationships_count")?,
        processing_started_at: row.get("processing_started_at")?,
        processing_completed_at: row.get("processing_completed_at")?,
        enqueued_at: row.get("enqueued_at")?,
        next_eligible_at_ms: row.get("next_eligible_at_ms")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_is_deterministic() {
        assert_eq!(file_id("src/a.ts"), file_id("src/a.ts"));
        assert_ne!(file_id("src/a.ts"), file_id("src/b.ts"));
    }

    #[test]
    fn insert_then_get_round_trips() {
        let db = FileMetadataDb::in_memory().unwrap();
        let id = db.insert_file("a.ts", Some("hash1"), 100, 3).unwrap();
        let record = db.get_file(&id).unwrap().unwrap();
        assert_eq!(record.path, "a.ts");
        assert_eq!(record.status, FileStatus::Pending);
        assert_eq!(record.hash.as_deref(), Some("hash1"));
    }

    #[test]
    fn reinsert_with_same_hash_preserves_retry_count() {
        let db = FileMetadataDb::in_memory().unwrap();
        let id = db.insert_file("a.ts", Some("hash1"), 100, 3).unwrap();
        db.mark_failed_or_retry(&id, "boom", 500).unwrap();
        db.insert_file("a.ts", Some("hash1"), 100, 3).unwrap();
        let record = db.get_file(&id).unwrap().unwrap();
        assert_eq!(record.retry_count, 1);
    }

    #[test]
    fn retry_policy_caps_at_max_retries() {
        let db = FileMetadataDb::in_memory().unwrap();
        let id = db.insert_file("a.ts", None, 0, 2).unwrap();

        let (status1, count1) = db.mark_failed_or_retry(&id, "e1", 500).unwrap();
        assert_eq!(status1, FileStatus::Pending);
        assert_eq!(count1, 1);

        let (status2, count2) = db.mark_failed_or_retry(&id, "e2", 500).unwrap();
        assert_eq!(status2, FileStatus::Pending);
        assert_eq!(count2, 2);

        let (status3, count3) = db.mark_failed_or_retry(&id, "e3", 500).unwrap();
        assert_eq!(status3, FileStatus::Failed);
        assert_eq!(count3, 3);
    }

    #[test]
    fn mark_completed_sets_progress_to_100() {
        let db = FileMetadataDb::in_memory().unwrap();
        let id = db.insert_file("a.ts", Some("h"), 10, 3).unwrap();
        db.mark_processing(&id).unwrap();
        db.mark_completed(&id, 2, 3, 1).unwrap();
        let record = db.get_file(&id).unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.chunks_count, 2);
    }

    #[test]
    fn count_by_status_aggregates_correctly() {
        let db = FileMetadataDb::in_memory().unwrap();
        db.insert_file("a.ts", None, 0, 3).unwrap();
        db.insert_file("b.ts", None, 0, 3).unwrap();
        let counts = db.count_by_status().unwrap();
        let pending = counts.iter().find(|(s, _)| *s == FileStatus::Pending).unwrap();
        assert_eq!(pending.1, 2);
    }

    #[test]
    fn claim_next_pending_flips_to_processing_in_fifo_order() {
        let db = FileMetadataDb::in_memory().unwrap();
        db.insert_file("a.ts", None, 0, 3).unwrap();
        db.insert_file("b.ts", None, 0, 3).unwrap();

        let claimed = db.claim_next_pending().unwrap().unwrap();
        assert_eq!(claimed.path, "a.ts");
        assert_eq!(claimed.status, FileStatus::Pending, "returned record reflects pre-claim state");

        let record = db.get_file_by_path("a.ts").unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Processing);
    }

    #[test]
    fn claim_next_pending_respects_backoff_window() {
        let db = FileMetadataDb::in_memory().unwrap();
        let id = db.insert_file("a.ts", None, 0, 3).unwrap();
        db.mark_failed_or_retry(&id, "boom", 60_000).unwrap();

        // Backoff window (60s) has not elapsed: nothing eligible yet.
        assert!(db.claim_next_pending().unwrap().is_none());
    }

    #[test]
    fn claim_next_pending_is_none_when_queue_empty() {
        let db = FileMetadataDb::in_memory().unwrap();
        assert!(db.claim_next_pending().unwrap().is_none());
    }
}

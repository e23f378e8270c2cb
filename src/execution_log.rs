//! Execution log: an audit trail of cappy CLI runs, recorded alongside the
//! graph database with execution id, timestamps, arguments, and outcome.

use anyhow::Result;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub execution_id: String,
    pub tool_version: String,
    pub args: String,
    pub root: Option<String>,
    pub db_path: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub duration_ms: Option<i64>,
    pub outcome: String,
    pub error_message: Option<String>,
    pub files_indexed: i64,
    pub symbols_indexed: i64,
    pub references_indexed: i64,
}

/// Execution log storage: a separate `rusqlite` connection to the same
/// database file as the graph store, holding one side table.
pub struct ExecutionLog {
    db_path: std::path::PathBuf,
}

impl ExecutionLog {
    pub fn new(db_path: &Path) -> Self {
        Self { db_path: db_path.to_path_buf() }
    }

    pub fn connect(&self) -> Result<rusqlite::Connection, rusqlite::Error> {
        rusqlite::Connection::open(&self.db_path)
    }

    pub fn ensure_schema(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS execution_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                execution_id TEXT NOT NULL UNIQUE,
                tool_version TEXT NOT NULL,
                args TEXT NOT NULL,
                root TEXT,
                db_path TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                finished_at INTEGER,
                duration_ms INTEGER,
                outcome TEXT NOT NULL,
                error_message TEXT,
                files_indexed INTEGER DEFAULT 0,
                symbols_indexed INTEGER DEFAULT 0,
                references_indexed INTEGER DEFAULT 0
            )",
            [],
        )
        .map_err(|e| anyhow::anyhow!("failed to create execution_log table: {e}"))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_execution_log_started_at
                ON execution_log(started_at DESC)",
            [],
        )
        .map_err(|e| anyhow::anyhow!("failed to create started_at index: {e}"))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_execution_log_execution_id
                ON execution_log(execution_id)",
            [],
        )
        .map_err(|e| anyhow::anyhow!("failed to create execution_id index: {e}"))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_execution_log_outcome
                ON execution_log(outcome)",
            [],
        )
        .map_err(|e| anyhow::anyhow!("failed to create outcome index: {e}"))?;

        Ok(())
    }

    pub fn start_execution(
        &self,
        execution_id: &str,
        tool_version: &str,
        args: &[String],
        root: Option<&str>,
        db_path: &str,
    ) -> Result<i64> {
        let conn = self.connect()?;
        let args_json = serde_json::to_string(args)?;
        let started_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;

        conn.execute(
            "INSERT INTO execution_log
                (execution_id, tool_version, args, root, db_path, started_at, outcome)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'running')",
            params![execution_id, tool_version, args_json, root, db_path, started_at],
        )
        .map_err(|e| anyhow::anyhow!("failed to insert execution log row: {e}"))?;

        Ok(conn.last_insert_rowid())
    }

    pub fn finish_execution(
        &self,
        execution_id: &str,
        outcome: &str,
        error_message: Option<&str>,
        files_indexed: usize,
        symbols_indexed: usize,
        references_indexed: usize,
    ) -> Result<()> {
        let conn = self.connect()?;
        let finished_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;

        let started_at: i64 = conn
            .query_row(
                "SELECT started_at FROM execution_log WHERE execution_id = ?1",
                params![execution_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(finished_at);

        let duration_ms = (finished_at - started_at) * 1000;

        conn.execute(
            "UPDATE execution_log
                SET finished_at = ?1, outcome = ?2, error_message = ?3,
                    duration_ms = ?4, files_indexed = ?5, symbols_indexed = ?6,
                    references_indexed = ?7
                WHERE execution_id = ?8",
            params![
                finished_at,
                outcome,
                error_message,
                duration_ms,
                files_indexed as i64,
                symbols_indexed as i64,
                references_indexed as i64,
                execution_id,
            ],
        )
        .map_err(|e| anyhow::anyhow!("failed to update execution log row: {e}"))?;

        Ok(())
    }

    pub fn get_by_execution_id(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        let conn = self.connect()?;

        conn.query_row(
            "SELECT id, execution_id, tool_version, args, root, db_path,
                started_at, finished_at, duration_ms, outcome, error_message,
                files_indexed, symbols_indexed, references_indexed
                FROM execution_log WHERE execution_id = ?1",
            params![execution_id],
            |row| {
                Ok(ExecutionRecord {
                    id: row.get(0)?,
                    execution_id: row.get(1)?,
                    tool_version: row.get(2)?,
                    args: row.get(3)?,
                    root: row.get(4)?,
                    db_path: row.get(5)?,
                    started_at: row.get(6)?,
                    finished_at: row.get(7)?,
                    duration_ms: row.get(8)?,
                    outcome: row.get(9)?,
                    error_message: row.get(10)?,
                    files_indexed: row.get(11)?,
                    symbols_indexed: row.get(12)?,
                    references_indexed: row.get(13)?,
                })
            },
        )
        .optional()
        .map_err(|e| anyhow::anyhow!("failed to read execution log row: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn temp_log() -> (NamedTempFile, ExecutionLog) {
        let file = NamedTempFile::new().unwrap();
        let log = ExecutionLog::new(file.path());
        log.ensure_schema().unwrap();
        (file, log)
    }

    #[test]
    fn start_then_finish_execution_updates_the_same_row() {
        let (_file, log) = temp_log();
        log.start_execution("exec-1", "0.1.0", &["scan".to_string()], Some("/repo"), "/repo/.cappy/graph.db").unwrap();

        log.finish_execution("exec-1", "success", None, 12, 34, 56).unwrap();

        let record = log.get_by_execution_id("exec-1").unwrap().unwrap();
        assert_eq!(record.outcome, "success");
        assert_eq!(record.files_indexed, 12);
        assert_eq!(record.symbols_indexed, 34);
        assert_eq!(record.references_indexed, 56);
        assert!(record.finished_at.is_some());
        assert!(record.duration_ms.is_some());
    }

    #[test]
    fn finish_execution_records_error_message_on_failure() {
        let (_file, log) = temp_log();
        log.start_execution("exec-2", "0.1.0", &[], None, "/repo/.cappy/graph.db").unwrap();

        log.finish_execution("exec-2", "error", Some("workspace root missing"), 0, 0, 0).unwrap();

        let record = log.get_by_execution_id("exec-2").unwrap().unwrap();
        assert_eq!(record.outcome, "error");
        assert_eq!(record.error_message.as_deref(), Some("workspace root missing"));
    }

    #[test]
    fn unknown_execution_id_returns_none() {
        let (_file, log) = temp_log();
        assert!(log.get_by_execution_id("nope").unwrap().is_none());
    }
}

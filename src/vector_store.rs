//! Vector Store: persists chunk embeddings and serves brute-force cosine
//! similarity queries.
//!
//! Default implementation rides on the same `rusqlite` connection style the
//! File Metadata DB uses: one dedicated connection behind a mutex, since
//! SQLite serializes writers anyway and the traffic here is one write per
//! indexed chunk plus the occasional full-table scan for search.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::embeddings::cosine_similarity;
use crate::error::VectorStoreError;

pub struct VectorSearchResult {
    pub chunk_id: String,
    pub score: f32,
}

pub trait VectorStore: Send + Sync {
    fn upsert(&self, chunk_id: &str, file_path: &str, vector: &[f32]) -> Result<(), VectorStoreError>;
    fn delete_by_file(&self, file_path: &str) -> Result<(), VectorStoreError>;
    fn delete_chunk(&self, chunk_id: &str) -> Result<(), VectorStoreError>;
    /// Top-`k` chunks by cosine similarity to `query`, ties broken by chunk id
    /// ascending to keep result order deterministic.
    fn query(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorSearchResult>, VectorStoreError>;
    fn len(&self) -> Result<usize, VectorStoreError>;
}

pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    pub fn open(path: &Path) -> Result<Self, VectorStoreError> {
        let conn = Connection::open(path).map_err(|e| VectorStoreError::OperationFailed(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS vectors (
                chunk_id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                vector BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| VectorStoreError::OperationFailed(e.to_string()))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_vectors_file_path ON vectors(file_path)",
            [],
        )
        .map_err(|e| VectorStoreError::OperationFailed(e.to_string()))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self, VectorStoreError> {
        Self::open(Path::new(":memory:"))
    }
}

impl VectorStore for SqliteVectorStore {
    fn upsert(&self, chunk_id: &str, file_path: &str, vector: &[f32]) -> Result<(), VectorStoreError> {
        let conn = self.conn.lock().expect("vector store mutex poisoned");
        let bytes = encode_vector(vector);
        conn.execute(
            "INSERT INTO vectors (chunk_id, file_path, vector) VALUES (?1, ?2, ?3)
             ON CONFLICT(chunk_id) DO UPDATE SET file_path = excluded.file_path, vector = excluded.vector",
            params![chunk_id, file_path, bytes],
        )
        .map_err(|e| VectorStoreError::OperationFailed(e.to_string()))?;
        Ok(())
    }

    fn delete_by_file(&self, file_path: &str) -> Result<(), VectorStoreError> {
        let conn = self.conn.lock().expect("vector store mutex poisoned");
        conn.execute("DELETE FROM vectors WHERE file_path = ?1", params![file_path])
            .map_err(|e| VectorStoreError::OperationFailed(e.to_string()))?;
        Ok(())
    }

    fn delete_chunk(&self, chunk_id: &str) -> Result<(), VectorStoreError> {
        let conn = self.conn.lock().expect("vector store mutex poisoned");
        conn.execute("DELETE FROM vectors WHERE chunk_id = ?1", params![chunk_id])
            .map_err(|e| VectorStoreError::OperationFailed(e.to_string()))?;
        Ok(())
    }

    fn query(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorSearchResult>, VectorStoreError> {
        let conn = self.conn.lock().expect("vector store mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT chunk_id, vector FROM vectors")
            .map_err(|e| VectorStoreError::OperationFailed(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let chunk_id: String = row.get(0)?;
                let bytes: Vec<u8> = row.get(1)?;
                Ok((chunk_id, bytes))
            })
            .map_err(|e| VectorStoreError::OperationFailed(e.to_string()))?;

        let mut scored: Vec<VectorSearchResult> = Vec::new();
        for row in rows {
            let (chunk_id, bytes) = row.map_err(|e| VectorStoreError::OperationFailed(e.to_string()))?;
            let vector = decode_vector(&bytes);
            let score = cosine_similarity(query, &vector);
            scored.push(VectorSearchResult { chunk_id, score });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    fn len(&self) -> Result<usize, VectorStoreError> {
        let conn = self.conn.lock().expect("vector store mutex poisoned");
        conn.query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))
            .optional()
            .map_err(|e| VectorStoreError::OperationFailed(e.to_string()))
            .map(|v: Option<i64>| v.unwrap_or(0) as usize)
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_vectors_through_encoding() {
        let v = vec![0.5f32, -0.25, 1.0];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
    }

    #[test]
    fn upsert_then_query_returns_closest_match_first() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store.upsert("chunk:a.ts:1-1", "a.ts", &[1.0, 0.0, 0.0]).unwrap();
        store.upsert("chunk:b.ts:1-1", "b.ts", &[0.0, 1.0, 0.0]).unwrap();

        let results = store.query(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results[0].chunk_id, "chunk:a.ts:1-1");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn ties_break_by_chunk_id_ascending() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store.upsert("chunk:z.ts:1-1", "z.ts", &[1.0, 0.0]).unwrap();
        store.upsert("chunk:a.ts:1-1", "a.ts", &[1.0, 0.0]).unwrap();

        let results = store.query(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].chunk_id, "chunk:a.ts:1-1");
        assert_eq!(results[1].chunk_id, "chunk:z.ts:1-1");
    }

    #[test]
    fn upsert_is_idempotent_by_chunk_id() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store.upsert("chunk:a.ts:1-1", "a.ts", &[1.0, 0.0]).unwrap();
        store.upsert("chunk:a.ts:1-1", "a.ts", &[0.0, 1.0]).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn delete_by_file_removes_all_its_chunks() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store.upsert("chunk:a.ts:1-1", "a.ts", &[1.0, 0.0]).unwrap();
        store.upsert("chunk:a.ts:2-2", "a.ts", &[0.0, 1.0]).unwrap();
        store.upsert("chunk:b.ts:1-1", "b.ts", &[1.0, 1.0]).unwrap();

        store.delete_by_file("a.ts").unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }
}

//! SQLite-based vector store implementation.
//!
//! Uses SQLite with cosine similarity computed in Rust for simplicity.
//! For large corpora, point the `VectorStore` trait at a dedicated
//! nearest-neighbor service instead.

use super::{check_dimensions, rank_chunks, IndexedSource, QueryFilter, VectorMatch, VectorStore};
use crate::error::{KlippError, Result};
use crate::model::Chunk;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS chunks (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL,
        source_title TEXT NOT NULL,
        text TEXT NOT NULL,
        start_time REAL NOT NULL,
        end_time REAL NOT NULL,
        embedding BLOB NOT NULL,
        indexed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_source_id ON chunks(source_id);
"#;

const SELECT_COLUMNS: &str =
    "SELECT id, source_id, source_title, text, start_time, end_time, embedding FROM chunks";

/// SQLite-based vector store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Create a new SQLite vector store.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL lets the graph store share the file
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite vector store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite vector store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| KlippError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    pub(crate) fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    pub(crate) fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
        let embedding_bytes: Vec<u8> = row.get(6)?;
        Ok(Chunk {
            id: row.get(0)?,
            source_id: row.get(1)?,
            source_title: row.get(2)?,
            text: row.get(3)?,
            start_time: row.get(4)?,
            end_time: row.get(5)?,
            embedding: Self::bytes_to_embedding(&embedding_bytes),
        })
    }

    fn load_chunks(conn: &Connection, clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Chunk>> {
        let sql = format!("{} {}", SELECT_COLUMNS, clause);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(args, Self::row_to_chunk)?;
        let chunks = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    async fn replace_source(&self, source_id: &str, chunks: &[Chunk]) -> Result<usize> {
        let conn = self.lock()?;
        let stored: Option<i64> = conn
            .query_row(
                "SELECT length(embedding) FROM chunks WHERE source_id != ?1 LIMIT 1",
                params![source_id],
                |row| row.get(0),
            )
            .optional()?;
        check_dimensions(chunks, stored.map(|bytes| bytes as usize / 4))?;
        if let Some(stray) = chunks.iter().find(|c| c.source_id != source_id) {
            return Err(KlippError::InvalidInput(format!(
                "chunk {} does not belong to source {}",
                stray.id, source_id
            )));
        }

        let tx = conn.unchecked_transaction()?;
        let deleted = tx.execute("DELETE FROM chunks WHERE source_id = ?1", params![source_id])?;
        let indexed_at = Utc::now().to_rfc3339();

        for chunk in chunks {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO chunks
                (id, source_id, source_title, text, start_time, end_time, embedding, indexed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    chunk.id,
                    chunk.source_id,
                    chunk.source_title,
                    chunk.text,
                    chunk.start_time,
                    chunk.end_time,
                    Self::embedding_to_bytes(&chunk.embedding),
                    indexed_at,
                ],
            )?;
        }

        tx.commit()?;
        info!(
            "Replaced {} chunks of source {} with {}",
            deleted,
            source_id,
            chunks.len()
        );
        Ok(chunks.len())
    }

    #[instrument(skip(self, embedding, filter))]
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<VectorMatch>> {
        let conn = self.lock()?;
        let chunks = Self::load_chunks(&conn, "", &[])?;
        let matches = rank_chunks(&chunks, embedding, k, filter);
        debug!("Found {} matching chunks", matches.len());
        Ok(matches)
    }

    #[instrument(skip(self))]
    async fn get_by_source(&self, source_id: &str) -> Result<Vec<Chunk>> {
        let conn = self.lock()?;
        let chunks = Self::load_chunks(
            &conn,
            "WHERE source_id = ?1 ORDER BY start_time",
            &[&source_id],
        )?;
        debug!("Found {} chunks for source {}", chunks.len(), source_id);
        Ok(chunks)
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        let conn = self.lock()?;
        Self::load_chunks(&conn, "ORDER BY id", &[])
    }

    #[instrument(skip(self))]
    async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT source_id, source_title, COUNT(*) as chunk_count,
                   MAX(end_time) as total_duration, MAX(indexed_at) as indexed_at
            FROM chunks
            GROUP BY source_id
            ORDER BY indexed_at DESC, source_id
            "#,
        )?;

        let sources = stmt.query_map([], |row| {
            let indexed_at_str: String = row.get(4)?;
            Ok(IndexedSource {
                source_id: row.get(0)?,
                source_title: row.get(1)?,
                chunk_count: row.get(2)?,
                total_duration_seconds: row.get(3)?,
                indexed_at: DateTime::parse_from_rfc3339(&indexed_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;

        Ok(sources.collect::<rusqlite::Result<Vec<_>>>()?)
    }

}

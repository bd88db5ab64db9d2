//! SQLite persistence for chapters and edges.

use super::{Edge, EdgeType, KnowledgeGraph};
use crate::error::{KlippError, Result};
use crate::model::{Chapter, ChapterLevel, Chunk};
use crate::vector_store::SqliteVectorStore;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS chapters (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL,
        source_title TEXT NOT NULL,
        text TEXT NOT NULL,
        start_time REAL NOT NULL,
        end_time REAL NOT NULL,
        embedding BLOB NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        topics TEXT NOT NULL,
        level INTEGER NOT NULL,
        position INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chapters_source_id ON chapters(source_id);

    CREATE TABLE IF NOT EXISTS edges (
        from_id TEXT NOT NULL,
        to_id TEXT NOT NULL,
        edge_type TEXT NOT NULL,
        strength REAL NOT NULL,
        PRIMARY KEY (from_id, to_id, edge_type)
    );

    CREATE TABLE IF NOT EXISTS graph_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

const BUILT_AT_KEY: &str = "built_at";

/// SQLite-backed chapter and edge store.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Open (or create) the store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite graph store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
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
            .map_err(|e| KlippError::GraphStore(format!("Failed to acquire lock: {}", e)))
    }

    /// Replace every chapter of `source_id` with `chapters`.
    #[instrument(skip(self, chapters), fields(count = chapters.len()))]
    pub fn replace_source_chapters(&self, source_id: &str, chapters: &[Chapter]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM chapters WHERE source_id = ?1", params![source_id])?;
        for chapter in chapters {
            let topics = serde_json::to_string(&chapter.topics)?;
            tx.execute(
                r#"
                INSERT OR REPLACE INTO chapters
                (id, source_id, source_title, text, start_time, end_time, embedding,
                 title, description, topics, level, position)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
                params![
                    chapter.chunk.id,
                    chapter.chunk.source_id,
                    chapter.chunk.source_title,
                    chapter.chunk.text,
                    chapter.chunk.start_time,
                    chapter.chunk.end_time,
                    SqliteVectorStore::embedding_to_bytes(&chapter.chunk.embedding),
                    chapter.title,
                    chapter.description,
                    topics,
                    chapter.level.as_u8(),
                    chapter.position as i64,
                ],
            )?;
        }

        tx.commit()?;
        debug!("Stored {} chapters for {}", chapters.len(), source_id);
        Ok(chapters.len())
    }

    fn row_to_chapter(row: &Row<'_>) -> rusqlite::Result<Chapter> {
        let embedding: Vec<u8> = row.get(6)?;
        let topics: String = row.get(9)?;
        let topics: Vec<String> = serde_json::from_str(&topics)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;
        let level: u8 = row.get(10)?;
        let level = ChapterLevel::from_u8(level).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                10,
                Type::Integer,
                format!("unknown chapter level {}", level).into(),
            )
        })?;
        let position: i64 = row.get(11)?;
        let position = usize::try_from(position)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Integer, Box::new(e)))?;

        Ok(Chapter {
            chunk: Chunk {
                id: row.get(0)?,
                source_id: row.get(1)?,
                source_title: row.get(2)?,
                text: row.get(3)?,
                start_time: row.get(4)?,
                end_time: row.get(5)?,
                embedding: SqliteVectorStore::bytes_to_embedding(&embedding),
            },
            title: row.get(7)?,
            description: row.get(8)?,
            topics,
            level,
            position,
        })
    }

    /// Every stored chapter, ordered by id.
    pub fn all_chapters(&self) -> Result<Vec<Chapter>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, source_id, source_title, text, start_time, end_time, embedding,
                   title, description, topics, level, position
            FROM chapters
            ORDER BY id
            "#,
        )?;
        let chapters = stmt
            .query_map([], Self::row_to_chapter)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chapters)
    }

    /// Swap the whole edge set in one transaction.
    #[instrument(skip(self, edges), fields(count = edges.len()))]
    pub fn replace_edges(&self, edges: &[Edge], built_at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM edges", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO edges (from_id, to_id, edge_type, strength) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for edge in edges {
                stmt.execute(params![edge.from, edge.to, edge.edge_type.as_str(), edge.strength])?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO graph_meta (key, value) VALUES (?1, ?2)",
            params![BUILT_AT_KEY, built_at.to_rfc3339()],
        )?;

        tx.commit()?;
        info!("Stored {} edges", edges.len());
        Ok(())
    }

    /// Every stored edge, ordered by source, type and target.
    pub fn all_edges(&self) -> Result<Vec<Edge>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT from_id, to_id, edge_type, strength FROM edges ORDER BY from_id, edge_type, to_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f32>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut edges = rows
            .into_iter()
            .map(|(from, to, edge_type, strength)| {
                Ok(Edge {
                    from,
                    to,
                    edge_type: edge_type.parse::<EdgeType>()?,
                    strength,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // enum order, not string order
        edges.sort_by(|x, y| {
            x.from
                .cmp(&y.from)
                .then_with(|| x.edge_type.cmp(&y.edge_type))
                .then_with(|| x.to.cmp(&y.to))
        });
        Ok(edges)
    }

    /// When the edges were last rebuilt.
    pub fn built_at(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM graph_meta WHERE key = ?1",
                params![BUILT_AT_KEY],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    /// Load the persisted graph snapshot.
    pub fn load_graph(&self) -> Result<KnowledgeGraph> {
        let chapters = self.all_chapters()?;
        let edges = self.all_edges()?;
        let built_at = self.built_at()?;
        debug!(
            "Loaded graph: {} chapters, {} edges",
            chapters.len(),
            edges.len()
        );
        Ok(KnowledgeGraph::new(chapters, edges, built_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::chapter;

    #[test]
    fn test_chapters_round_trip() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let mut first = chapter("v1", 0, vec![0.5, -0.25]);
        first.topics = vec!["rust".to_string(), "ownership".to_string()];
        first.level = ChapterLevel::Introduction;
        let chapters = vec![first, chapter("v1", 1, vec![1.0, 0.0])];

        store.replace_source_chapters("v1", &chapters).unwrap();
        assert_eq!(store.all_chapters().unwrap(), chapters);
    }

    #[test]
    fn test_corrupt_rows_are_errors() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store
            .replace_source_chapters("v1", &[chapter("v1", 0, vec![1.0])])
            .unwrap();

        for corruption in [
            "UPDATE chapters SET topics = 'not json'",
            "UPDATE chapters SET topics = '[]', level = 7",
            "UPDATE chapters SET level = 1, position = -1",
        ] {
            store.lock().unwrap().execute_batch(corruption).unwrap();
            assert!(
                matches!(store.all_chapters(), Err(KlippError::Database(_))),
                "{}",
                corruption
            );
        }
    }

    #[test]
    fn test_replacing_a_source_drops_old_chapters() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store
            .replace_source_chapters("v1", &[chapter("v1", 0, vec![1.0]), chapter("v1", 1, vec![1.0])])
            .unwrap();
        store
            .replace_source_chapters("v2", &[chapter("v2", 0, vec![1.0])])
            .unwrap();
        store
            .replace_source_chapters("v1", &[chapter("v1", 0, vec![1.0])])
            .unwrap();

        let ids: Vec<String> = store
            .all_chapters()
            .unwrap()
            .into_iter()
            .map(|c| c.chunk.id)
            .collect();
        assert_eq!(ids, vec!["v1:0000", "v2:0000"]);
    }

    #[test]
    fn test_replace_edges_is_wholesale() {
        let store = SqliteGraphStore::in_memory().unwrap();
        assert_eq!(store.built_at().unwrap(), None);

        let first = vec![
            Edge::new("a", "b", EdgeType::SimilarTo, 0.9),
            Edge::new("a", "b", EdgeType::PrerequisiteOf, 0.9),
        ];
        store.replace_edges(&first, Utc::now()).unwrap();
        assert_eq!(store.all_edges().unwrap(), vec![first[0].clone(), first[1].clone()]);

        let second = vec![Edge::new("c", "d", EdgeType::NextTopic, 1.0)];
        store.replace_edges(&second, Utc::now()).unwrap();
        assert_eq!(store.all_edges().unwrap(), second);
        assert!(store.built_at().unwrap().is_some());
    }

    #[test]
    fn test_load_graph() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store
            .replace_source_chapters("v1", &[chapter("v1", 0, vec![1.0]), chapter("v1", 1, vec![1.0])])
            .unwrap();
        store
            .replace_edges(
                &[Edge::new("v1:0000", "v1:0001", EdgeType::NextTopic, 1.0)],
                Utc::now(),
            )
            .unwrap();

        let graph = store.load_graph().unwrap();
        assert_eq!(graph.chapters().count(), 2);
        assert_eq!(graph.edges().len(), 1);
        assert!(graph.built_at().is_some());
    }
}

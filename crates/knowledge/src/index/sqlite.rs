//! SQLite-backed vector index.
//!
//! Entries are persisted in `entries` and mirrored in an in-memory snapshot
//! that serves queries. Each batch is written in one transaction before the
//! snapshot is swapped, so disk and memory agree after every call.

use super::{DistanceMetric, IndexEntry, IndexSnapshot, VectorIndex};
use crate::types::{Metadata, QueryResult};
use grounded_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id TEXT PRIMARY KEY,
    seq INTEGER NOT NULL,
    vector BLOB NOT NULL,
    text TEXT NOT NULL,
    metadata TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entries_seq ON entries(seq);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

#[derive(Debug)]
pub struct SqliteIndex {
    collection: String,
    metric: DistanceMetric,
    path: PathBuf,
    conn: Mutex<Connection>,
    snapshot: RwLock<Arc<IndexSnapshot>>,
}

impl SqliteIndex {
    /// Open or create the index at `db_path`.
    ///
    /// An existing index built with a different metric is refused.
    pub fn open(db_path: &Path, collection: impl Into<String>, metric: DistanceMetric) -> AppResult<Self> {
        let conn = connect(db_path)?;

        match read_meta(&conn, "metric")? {
            Some(stored) => {
                let stored: DistanceMetric = stored.parse()?;
                if stored != metric {
                    return Err(AppError::Config(format!(
                        "Index at {} was built with the {} metric, but {} was requested. Run `grounded reset` to rebuild it.",
                        db_path.display(),
                        stored,
                        metric
                    )));
                }
            }
            None => write_meta(&conn, "metric", metric.as_str())?,
        }

        Self::load(conn, db_path, collection.into(), metric)
    }

    /// Open the index at `db_path` emptied and rebound to `metric`, whatever
    /// metric it was built with. Returns the index and the number of entries
    /// removed.
    pub fn open_reset(
        db_path: &Path,
        collection: impl Into<String>,
        metric: DistanceMetric,
    ) -> AppResult<(Self, usize)> {
        let mut conn = connect(db_path)?;

        let tx = conn
            .transaction()
            .map_err(db_err("Failed to begin transaction"))?;
        let removed = tx
            .execute("DELETE FROM entries", [])
            .map_err(db_err("Failed to clear entries"))?;
        tx.execute("DELETE FROM meta WHERE key = 'dimension'", [])
            .map_err(db_err("Failed to clear index meta"))?;
        write_meta(&tx, "metric", metric.as_str())?;
        tx.commit().map_err(db_err("Failed to commit reset"))?;

        let collection = collection.into();
        tracing::info!(%collection, removed, metric = %metric, "Reset vector index");

        Ok((Self::load(conn, db_path, collection, metric)?, removed))
    }

    fn load(
        conn: Connection,
        db_path: &Path,
        collection: String,
        metric: DistanceMetric,
    ) -> AppResult<Self> {
        let dimension = read_meta(&conn, "dimension")?
            .map(|d| {
                d.parse::<usize>()
                    .map_err(|e| AppError::Index(format!("Corrupt dimension in index meta: {}", e)))
            })
            .transpose()?;

        let entries = load_entries(&conn)?;
        let snapshot = IndexSnapshot::from_entries(entries, dimension);

        tracing::debug!(
            path = %db_path.display(),
            entries = snapshot.len(),
            "Opened SQLite index"
        );

        Ok(Self {
            collection,
            metric,
            path: db_path.to_path_buf(),
            conn: Mutex::new(conn),
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn current(&self) -> Arc<IndexSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn publish(&self, next: IndexSnapshot) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
    }

    /// Mutate the published snapshot; it is copied only if a reader holds it.
    fn update<R>(&self, f: impl FnOnce(&mut IndexSnapshot) -> R) -> R {
        let mut slot = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        f(Arc::make_mut(&mut slot))
    }
}

impl VectorIndex for SqliteIndex {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn dimension(&self) -> Option<usize> {
        self.current().dimension()
    }

    fn add(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        texts: &[String],
        metadatas: &[Metadata],
    ) -> AppResult<()> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.current();
        let written = current.prepare_add(ids, vectors, texts, metadatas)?;
        if written.is_empty() {
            return Ok(());
        }

        let tx = conn
            .transaction()
            .map_err(db_err("Failed to begin transaction"))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO entries (id, seq, vector, text, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(db_err("Failed to prepare insert"))?;

            for entry in &written {
                let metadata = serde_json::to_string(&entry.metadata)?;
                stmt.execute(params![
                    entry.id,
                    entry.seq as i64,
                    embedding_to_bytes(&entry.vector),
                    entry.text,
                    metadata,
                ])
                .map_err(db_err("Failed to insert entry"))?;
            }
        }

        if current.dimension().is_none() {
            write_meta(&tx, "dimension", &written[0].vector.len().to_string())?;
        }

        tx.commit().map_err(db_err("Failed to commit batch"))?;
        drop(current);
        let entries = written.len();
        self.update(|snapshot| snapshot.apply(written));

        tracing::debug!(entries, collection = %self.collection, "Persisted entries");
        Ok(())
    }

    fn query(&self, vector: &[f32], k: usize) -> AppResult<Vec<QueryResult>> {
        self.current().query(self.metric, vector, k)
    }

    fn count(&self) -> usize {
        self.current().len()
    }

    fn delete(&self, ids: &[String]) -> AppResult<usize> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        if self.current().count_present(ids) == 0 {
            return Ok(0);
        }

        let tx = conn
            .transaction()
            .map_err(db_err("Failed to begin transaction"))?;
        {
            let mut stmt = tx
                .prepare("DELETE FROM entries WHERE id = ?1")
                .map_err(db_err("Failed to prepare delete"))?;
            for id in ids {
                stmt.execute(params![id])
                    .map_err(db_err("Failed to delete entry"))?;
            }
        }
        tx.commit().map_err(db_err("Failed to commit delete"))?;

        Ok(self.update(|snapshot| snapshot.remove(ids)))
    }

    fn ids_for_document(&self, document_id: &str) -> Vec<String> {
        self.current().ids_for_document(document_id)
    }

    fn reset(&self) -> AppResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(
            "BEGIN;
             DELETE FROM entries;
             DELETE FROM meta WHERE key = 'dimension';
             COMMIT;",
        )
        .map_err(db_err("Failed to reset index"))?;
        self.publish(IndexSnapshot::new());

        tracing::info!(collection = %self.collection, "Reset vector index");
        Ok(())
    }
}

fn connect(db_path: &Path) -> AppResult<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::Index(format!("Failed to create index directory: {}", e)))?;
    }

    let conn = Connection::open(db_path).map_err(db_err("Failed to open SQLite index"))?;
    conn.execute_batch(SCHEMA)
        .map_err(db_err("Failed to create tables"))?;
    Ok(conn)
}

fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> AppError {
    move |e| AppError::Index(format!("{}: {}", context, e))
}

fn read_meta(conn: &Connection, key: &str) -> AppResult<Option<String>> {
    conn.query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
        row.get(0)
    })
    .optional()
    .map_err(db_err("Failed to read index meta"))
}

fn write_meta(conn: &Connection, key: &str, value: &str) -> AppResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )
    .map_err(db_err("Failed to write index meta"))?;
    Ok(())
}

fn load_entries(conn: &Connection) -> AppResult<Vec<IndexEntry>> {
    let mut stmt = conn
        .prepare("SELECT id, seq, vector, text, metadata FROM entries ORDER BY seq")
        .map_err(db_err("Failed to prepare load"))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .map_err(db_err("Failed to load entries"))?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, seq, vector, text, metadata) = row.map_err(db_err("Failed to read entry"))?;
        entries.push(IndexEntry {
            id,
            seq: seq as u64,
            vector: bytes_to_embedding(&vector)?,
            text,
            metadata: serde_json::from_str(&metadata)?,
        });
    }

    Ok(entries)
}

/// Convert embedding vector to little-endian bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Index("Invalid embedding bytes length".to_string()));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

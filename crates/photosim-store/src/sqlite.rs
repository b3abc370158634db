//! SQLite-backed photo embedding store.
//!
//! One `images` row per photo id. Every write is a single
//! `INSERT OR REPLACE`, committed with `synchronous = FULL`, so a record is
//! either fully present or absent and a returned `upsert` survives a crash.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ndarray::Array1;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::embedding::{decode_f32_le, encode_f32_le};
use crate::schema::SCHEMA_SQL;
use crate::types::*;
use photosim_core::{Error, Result};

/// File name of the database inside the vectordb directory.
pub const DB_FILE: &str = "photosim.db";

/// SQLite store for photo embeddings.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    /// Tag written alongside every embedding.
    model: String,
}

impl SqliteStore {
    /// Open or create the store.
    ///
    /// `db_dir` is the directory (e.g., `data/vectordb/`). The file will be
    /// `db_dir/photosim.db`. `model` tags every record written through this
    /// handle.
    pub fn open(db_dir: impl AsRef<Path>, model: impl Into<String>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join(DB_FILE);

        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            model: model.into(),
        };

        let count = store.count()?;
        let stale = store.count_stale()?;
        info!(
            "SqliteStore initialized: {} photos, model={}, path={}",
            count,
            store.model,
            store.db_path.display()
        );
        if stale > 0 {
            warn!(
                "{} photos were embedded by a different model than {}; re-index to compare them reliably",
                stale, store.model
            );
        }

        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory(model: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
            model: model.into(),
        })
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(storage_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA cache_size = -16384;",
        )
        .map_err(storage_err)?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Storage(format!("Schema init failed: {}", e)))?;
        Ok(())
    }

    /// Model tag this handle writes.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Path of the database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Insert the record for `id`, or replace its location and embedding.
    pub fn upsert(&self, id: &str, location: &str, embedding: &Array1<f32>) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidInput("photo id must not be empty".into()));
        }
        if embedding.is_empty() {
            return Err(Error::InvalidInput(format!(
                "empty embedding for photo {}",
                id
            )));
        }

        let blob = encode_f32_le(embedding);
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT OR REPLACE INTO images (id, location, embedding, dim, model, indexed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .map_err(storage_err)?
        .execute(params![
            id,
            location,
            blob,
            embedding.len() as i64,
            self.model,
            now_millis()
        ])
        .map_err(storage_err)?;
        debug!("Upserted photo {} ({} dims)", id, embedding.len());
        Ok(())
    }

    /// Delete the record for `id`. Returns whether a record existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM images WHERE id = ?1", params![id])
            .map_err(storage_err)?;
        Ok(count > 0)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Every stored location and embedding, in no particular order.
    pub fn get_all(&self) -> Result<Vec<StoredEmbedding>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id, location, embedding FROM images")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })
            .map_err(storage_err)?;

        let mut out = Vec::new();
        for row in rows {
            let (id, location, blob) = row.map_err(storage_err)?;
            let embedding = decode_blob(&id, &blob)?;
            out.push(StoredEmbedding {
                location,
                embedding,
            });
        }
        Ok(out)
    }

    /// Ids of every indexed photo.
    pub fn get_indexed_ids(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id FROM images")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(storage_err)?;
        rows.collect::<rusqlite::Result<HashSet<_>>>()
            .map_err(storage_err)
    }

    /// Whether any record currently points at exactly this location.
    pub fn is_location_indexed(&self, location: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found = conn
            .prepare_cached("SELECT 1 FROM images WHERE location = ?1 LIMIT 1")
            .map_err(storage_err)?
            .query_row(params![location], |_| Ok(()))
            .optional()
            .map_err(storage_err)?;
        Ok(found.is_some())
    }

    /// Get the full record for `id`.
    pub fn get(&self, id: &str) -> Result<Option<PhotoRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached(
                "SELECT id, location, embedding, model, indexed_at FROM images WHERE id = ?1",
            )
            .map_err(storage_err)?
            .query_row(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .optional()
            .map_err(storage_err)?;

        match row {
            Some((id, location, blob, model, indexed_at)) => {
                let embedding = decode_blob(&id, &blob)?;
                Ok(Some(PhotoRecord {
                    id,
                    location,
                    embedding,
                    model,
                    indexed_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// Count stored photos.
    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))
            .map_err(storage_err)
    }

    /// Count photos embedded under a different model tag than this handle's.
    pub fn count_stale(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM images WHERE model != ?1",
            params![self.model],
            |row| row.get(0),
        )
        .map_err(storage_err)
    }

    /// Ids of photos embedded under a different model tag.
    pub fn stale_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id FROM images WHERE model != ?1 ORDER BY id")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![self.model], |row| row.get::<_, String>(0))
            .map_err(storage_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err)
    }

    /// Get store statistics.
    pub fn get_stats(&self) -> Result<StoreStats> {
        let total_records = self.count()?;
        let stale_records = self.count_stale()?;

        let dimensions = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare("SELECT DISTINCT dim FROM images ORDER BY dim")
                .map_err(storage_err)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, i64>(0))
                .map_err(storage_err)?;
            rows.map(|r| r.map(|d| d as usize))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage_err)?
        };

        let db_size_mb = std::fs::metadata(&self.db_path)
            .map(|m| m.len() as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0);

        Ok(StoreStats {
            total_records,
            stale_records,
            dimensions,
            model: self.model.clone(),
            db_path: self.db_path.display().to_string(),
            db_size_mb: (db_size_mb * 100.0).round() / 100.0,
        })
    }
}

fn decode_blob(id: &str, blob: &[u8]) -> Result<Array1<f32>> {
    decode_f32_le(blob).ok_or_else(|| {
        Error::Storage(format!(
            "corrupt embedding for photo {}: {} bytes",
            id,
            blob.len()
        ))
    })
}

fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

use super::schema::METADATA_VERSIONED_SCHEMAS;
use super::TrackMetadata;
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Persistent index of scanned tracks, keyed by path.
pub trait MetadataStore: Send + Sync {
    fn save(&self, meta: &TrackMetadata) -> Result<()>;
    fn save_batch(&self, metas: &[TrackMetadata]) -> Result<()>;
    /// All tracks ordered by filename. `limit = None` returns everything from `offset`.
    fn get_all(&self, limit: Option<usize>, offset: usize) -> Result<Vec<TrackMetadata>>;
    fn count(&self) -> Result<usize>;
    fn search(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<TrackMetadata>>;
    fn delete_by_path(&self, path: &str) -> Result<bool>;
    /// Removes every track located inside `dir`. Returns the number of rows removed.
    fn delete_under(&self, dir: &str) -> Result<usize>;
    fn clear_all(&self) -> Result<()>;
    fn optimize(&self) -> Result<()>;
}

const SELECT_COLUMNS: &str =
    "path, filename, artist, title, album, album_artist, duration, size_mb, bitrate, search_text";

pub struct SqliteMetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetadataStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), METADATA_VERSIONED_SCHEMAS, "metadata")?;
        conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
            .context("Failed to enable WAL journal mode")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Metadata database lock poisoned"))
    }

    fn row_to_track(row: &Row) -> rusqlite::Result<TrackMetadata> {
        Ok(TrackMetadata {
            path: row.get(0)?,
            filename: row.get(1)?,
            artist: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            album: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            album_artist: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            duration: row.get::<_, Option<i64>>(6)?.unwrap_or(0) as u32,
            size_mb: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
            bitrate: row.get::<_, Option<i64>>(8)?.unwrap_or(0) as u32,
            search_text: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
        })
    }

    fn upsert(conn: &Connection, meta: &TrackMetadata) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT OR REPLACE INTO metadata
                (path, filename, artist, title, album, album_artist, duration, size_mb, bitrate, search_text, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))",
            params![
                meta.path,
                meta.filename,
                meta.artist,
                meta.title,
                meta.album,
                meta.album_artist,
                meta.duration as i64,
                meta.size_mb,
                meta.bitrate as i64,
                meta.search_text,
            ],
        )
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn save(&self, meta: &TrackMetadata) -> Result<()> {
        let conn = self.lock()?;
        Self::upsert(&conn, meta).with_context(|| format!("Failed to save {}", meta.path))?;
        Ok(())
    }

    fn save_batch(&self, metas: &[TrackMetadata]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for meta in metas {
            Self::upsert(&tx, meta).with_context(|| format!("Failed to save {}", meta.path))?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_all(&self, limit: Option<usize>, offset: usize) -> Result<Vec<TrackMetadata>> {
        let conn = self.lock()?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM metadata ORDER BY filename LIMIT ?1 OFFSET ?2",
            SELECT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit, offset as i64], Self::row_to_track)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM metadata", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn search(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<TrackMetadata>> {
        let conn = self.lock()?;
        let pattern = format!("%{}%", query.to_lowercase());
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM metadata
             WHERE lower(filename) LIKE ?1 OR lower(artist) LIKE ?1 OR lower(title) LIKE ?1
             ORDER BY filename LIMIT ?2 OFFSET ?3",
            SELECT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![pattern, limit as i64, offset as i64],
                Self::row_to_track,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn delete_by_path(&self, path: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM metadata WHERE path = ?1", params![path])?;
        Ok(deleted > 0)
    }

    fn delete_under(&self, dir: &str) -> Result<usize> {
        let conn = self.lock()?;
        let dir = dir.trim_end_matches('/');
        let prefix = format!("{}/", dir);
        let deleted = conn.execute(
            "DELETE FROM metadata WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2",
            params![dir, prefix],
        )?;
        Ok(deleted)
    }

    fn clear_all(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM metadata", [])?;
        Ok(())
    }

    fn optimize(&self) -> Result<()> {
        let conn = self.lock()?;
        info!("Optimizing metadata database");
        conn.execute_batch("VACUUM; ANALYZE;")
            .context("Failed to optimize metadata database")?;
        Ok(())
    }
}

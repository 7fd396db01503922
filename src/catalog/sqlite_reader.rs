//! Catalog reader over the engine's SQLite database (`songs` table).

use super::{CatalogEntry, CatalogListing, CatalogReader};
use crate::metrics;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

const SONGS_TABLE: &str = "songs";

pub struct SqliteCatalogReader {
    db_path: PathBuf,
}

impl SqliteCatalogReader {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    fn read_entries(db_path: &Path) -> Result<Vec<CatalogEntry>> {
        if !db_path.is_file() {
            bail!("catalog database not found at {:?}", db_path);
        }
        // A fresh read-only connection per call: nothing is held between reads.
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open catalog database {:?}", db_path))?;

        let columns = table_columns(&conn, SONGS_TABLE)?;
        if columns.is_empty() {
            bail!("catalog database has no '{}' table", SONGS_TABLE);
        }
        let has = |name: &str| columns.iter().any(|c| c.eq_ignore_ascii_case(name));

        let id_column = if has("id") {
            "id"
        } else if has("_id") {
            "_id"
        } else {
            "rowid"
        };
        let title_column = if has("title") { "title" } else { "NULL" };
        let artist_column = if has("artist") { "artist" } else { "NULL" };
        let key_column = if has("key") { "key" } else { "NULL" };
        if title_column == "NULL" && key_column == "NULL" {
            bail!("'{}' table has neither title nor key column", SONGS_TABLE);
        }

        let sql = format!(
            "SELECT CAST({} AS TEXT), {}, {}, {} FROM {}",
            id_column, title_column, artist_column, key_column, SONGS_TABLE
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, title, artist, key) = row?;
            match CatalogEntry::from_parts(
                id.unwrap_or_default(),
                title.as_deref(),
                artist.as_deref(),
                key.as_deref(),
            ) {
                Some(entry) => entries.push(entry),
                None => debug!("Skipping catalog row without title or key"),
            }
        }
        Ok(entries)
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

#[async_trait]
impl CatalogReader for SqliteCatalogReader {
    async fn list_entries(&self) -> CatalogListing {
        let db_path = self.db_path.clone();
        let started = Instant::now();
        let result = tokio::task::spawn_blocking(move || Self::read_entries(&db_path)).await;
        metrics::record_catalog_read("sqlite", started.elapsed());

        match result {
            Ok(Ok(entries)) => CatalogListing::ok(entries),
            Ok(Err(e)) => {
                warn!("Catalog read from {:?} failed: {:#}", self.db_path, e);
                CatalogListing::unavailable(format!("{:#}", e))
            }
            Err(e) => {
                warn!("Catalog read task failed: {}", e);
                CatalogListing::unavailable(e.to_string())
            }
        }
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.db_path.display())
    }
}

//! SQLite-backed persistent link store
//!
//! Every link ever collected is recorded once in the `telegram_links` table,
//! keyed by a uniqueness constraint on the link itself. The store is shared
//! between a background collection run and an interactive query/delete flow,
//! so every operation opens its own short-lived connection instead of holding
//! a long-lived handle; no cross-call lock is ever held.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

/// A single persisted link row.
#[derive(Debug, Clone, Serialize)]
pub struct LinkRecord {
    pub id: i64,
    pub link: String,
    pub source: String,
    pub keyword: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Durable, deduplicating store for collected invite links.
///
/// Cloning is cheap: the store is only a path, and each operation opens its
/// own connection.
#[derive(Debug, Clone)]
pub struct LinkStore {
    path: PathBuf,
}

impl LinkStore {
    /// Create a store handle and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Path of the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Connection::open(&self.path).context("Failed to open SQLite database")
    }

    /// Idempotently create the table and its indexes. Safe on every startup.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS telegram_links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                link TEXT UNIQUE NOT NULL,
                source TEXT,
                keyword TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_link ON telegram_links(link);

            CREATE INDEX IF NOT EXISTS idx_keyword ON telegram_links(keyword);
            "#,
        )
        .context("Failed to create link store schema")?;

        Ok(())
    }

    /// Point lookup on the link index.
    pub fn exists(&self, link: &str) -> Result<bool> {
        let conn = self.connect()?;
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM telegram_links WHERE link = ?1)",
                params![link],
                |row| row.get(0),
            )
            .context("Failed to check link existence")?;

        Ok(exists)
    }

    /// Insert a link, returning `true` only when a new row was created.
    ///
    /// A uniqueness conflict is the normal "already known" path, not an
    /// error: the link stays recorded under its first keyword.
    pub fn save(&self, link: &str, source: &str, keyword: &str) -> Result<bool> {
        let conn = self.connect()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO telegram_links (link, source, keyword) VALUES (?1, ?2, ?3)",
                params![link, source, keyword],
            )
            .context("Failed to save link")?;

        Ok(inserted > 0)
    }

    /// Search rows, newest first. Both filters are optional substring
    /// matches combined with AND; absent filters match everything.
    pub fn search(
        &self,
        keyword: Option<&str>,
        link_contains: Option<&str>,
    ) -> Result<Vec<LinkRecord>> {
        let conn = self.connect()?;

        let mut sql = String::from(
            "SELECT id, link, source, keyword, created_at, updated_at
             FROM telegram_links WHERE 1=1",
        );
        let mut args: Vec<String> = Vec::new();

        if let Some(kw) = keyword {
            sql.push_str(" AND keyword LIKE ?");
            args.push(format!("%{kw}%"));
        }
        if let Some(fragment) = link_contains {
            sql.push_str(" AND link LIKE ?");
            args.push(format!("%{fragment}%"));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut stmt = conn.prepare(&sql).context("Failed to prepare search")?;
        let params: Vec<&dyn rusqlite::ToSql> =
            args.iter().map(|a| a as &dyn rusqlite::ToSql).collect();

        let rows = stmt
            .query_map(params.as_slice(), |row| {
                Ok(LinkRecord {
                    id: row.get(0)?,
                    link: row.get(1)?,
                    source: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    keyword: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    created_at: parse_timestamp(&row.get::<_, String>(4)?),
                    updated_at: parse_timestamp(&row.get::<_, String>(5)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to read search rows")?;

        Ok(rows)
    }

    /// Delete a single row by id.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.connect()?;
        let deleted = conn
            .execute("DELETE FROM telegram_links WHERE id = ?1", params![id])
            .context("Failed to delete link")?;

        Ok(deleted > 0)
    }

    /// Delete every row recorded under the given keyword (exact match).
    pub fn delete_by_keyword(&self, keyword: &str) -> Result<usize> {
        let conn = self.connect()?;
        let deleted = conn
            .execute(
                "DELETE FROM telegram_links WHERE keyword = ?1",
                params![keyword],
            )
            .context("Failed to delete links by keyword")?;

        Ok(deleted)
    }

    /// Delete every row in the store.
    pub fn clear(&self) -> Result<usize> {
        let conn = self.connect()?;
        let deleted = conn
            .execute("DELETE FROM telegram_links", [])
            .context("Failed to clear link store")?;

        Ok(deleted)
    }

    /// Import rows from a legacy `links`-table database into the canonical
    /// store, preserving original timestamps. Returns the number of rows
    /// actually added; links already known are skipped.
    pub fn import_legacy(&self, legacy_path: impl AsRef<Path>) -> Result<usize> {
        let legacy =
            Connection::open(legacy_path.as_ref()).context("Failed to open legacy database")?;

        let has_table: bool = legacy
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'links')",
                [],
                |row| row.get(0),
            )
            .context("Failed to inspect legacy database")?;
        if !has_table {
            anyhow::bail!("No `links` table in {}", legacy_path.as_ref().display());
        }

        let mut stmt = legacy
            .prepare("SELECT link, source, keyword, created_at FROM links")
            .context("Failed to read legacy rows")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to read legacy rows")?;

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut imported = 0usize;
        for (link, source, keyword, created_at) in rows {
            let created = created_at
                .unwrap_or_else(|| Utc::now().format("%Y-%m-%d %H:%M:%S").to_string());
            imported += tx.execute(
                "INSERT OR IGNORE INTO telegram_links (link, source, keyword, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![link, source, keyword, created],
            )?;
        }
        tx.commit().context("Failed to commit legacy import")?;

        Ok(imported)
    }
}

/// Parse a SQLite `CURRENT_TIMESTAMP` value, falling back to now on
/// unexpected formats.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .unwrap_or_else(|_| Utc::now())
}

//! SQLite-backed persistence for template records.
//! Records survive restarts; the cache directory is rebuilt from `source`
//! on update, never from the DB.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use terraclaw_core::{Result, TerraclawError};

use crate::record::TemplateRecord;

/// Registry records database.
pub struct RegistryDb {
    conn: rusqlite::Connection,
}

fn db_err(e: impl std::fmt::Display) -> TerraclawError {
    TerraclawError::Persistence(format!("registry db: {e}"))
}

impl RegistryDb {
    /// Open or create the registry database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path).map_err(db_err)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(db_err)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS templates (
                name TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                sub_path TEXT,
                git_ref TEXT,
                version TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
         ",
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Insert a new record. The caller checks for duplicates first.
    pub fn insert(&self, rec: &TemplateRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO templates
                 (name, source, sub_path, git_ref, version, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    rec.name,
                    rec.source,
                    rec.sub_path,
                    rec.git_ref,
                    rec.version,
                    rec.description,
                    rec.created_at.to_rfc3339(),
                    rec.updated_at.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Fetch one record by name.
    pub fn get(&self, name: &str) -> Result<Option<TemplateRecord>> {
        self.conn
            .query_row(
                "SELECT name, source, sub_path, git_ref, version, description,
                        created_at, updated_at
                 FROM templates WHERE name = ?1",
                [name],
                row_to_record,
            )
            .optional()
            .map_err(db_err)
    }

    /// All records, ordered by name.
    pub fn list(&self) -> Result<Vec<TemplateRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name, source, sub_path, git_ref, version, description,
                        created_at, updated_at
                 FROM templates ORDER BY name",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], row_to_record)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    /// Bump version and updated_at after a successful re-fetch.
    pub fn touch_version(&self, name: &str, version: &str, at: DateTime<Utc>) -> Result<bool> {
        let n = self
            .conn
            .execute(
                "UPDATE templates SET version = ?2, updated_at = ?3 WHERE name = ?1",
                rusqlite::params![name, version, at.to_rfc3339()],
            )
            .map_err(db_err)?;
        Ok(n > 0)
    }

    /// Delete a record. Returns false when the name was unknown.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM templates WHERE name = ?1", [name])
            .map_err(db_err)?;
        Ok(n > 0)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TemplateRecord> {
    let created: String = row.get(6)?;
    let updated: String = row.get(7)?;
    Ok(TemplateRecord {
        name: row.get(0)?,
        source: row.get(1)?,
        sub_path: row.get(2)?,
        git_ref: row.get(3)?,
        version: row.get(4)?,
        description: row.get(5)?,
        created_at: parse_ts(&created),
        updated_at: parse_ts(&updated),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

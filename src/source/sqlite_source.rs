//! SQLite-backed participant record source
//!
//! Reads the experiment server's participant table (psiTurk layout, default
//! name `assignments`). The connection is opened read-only; the pipeline never
//! writes to the store.

use super::RecordSource;
use crate::error::StoreError;
use crate::record::ParticipantRecord;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

pub const DEFAULT_TABLE: &str = "assignments";

/// Turns a store URL into a database file path.
///
/// Accepts `sqlite:///relative.db`, `sqlite:////absolute.db` and bare paths.
pub fn database_path_from_url(url: &str) -> Result<PathBuf, StoreError> {
    let url = url.trim();
    match url.split_once("://") {
        None => Ok(PathBuf::from(url)),
        Some(("sqlite", rest)) => match rest.strip_prefix('/') {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Err(StoreError::Unavailable {
                reason: format!("no database path in '{}'", url),
            }),
        },
        Some((scheme, _)) => Err(StoreError::Unavailable {
            reason: format!("unsupported store scheme '{}'", scheme),
        }),
    }
}

/// Participant table reader
pub struct SqliteRecordSource {
    conn: Connection,
    table: String,
}

impl SqliteRecordSource {
    /// Open the store at `db_path` and check that `table` exists.
    pub fn open(db_path: impl AsRef<Path>, table: impl Into<String>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        let table = table.into();

        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::Unavailable {
                reason: format!("invalid participant table name '{}'", table),
            });
        }

        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StoreError::Unavailable {
            reason: format!("cannot open {}: {}", db_path.display(), e),
        })?;

        let exists: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [&table],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Unavailable {
                reason: format!("cannot read {}: {}", db_path.display(), e),
            })?;

        if exists == 0 {
            return Err(StoreError::Unavailable {
                reason: format!("table '{}' not found in {}", table, db_path.display()),
            });
        }

        log::info!("📥 Record store opened: {} (table {})", db_path.display(), table);

        Ok(Self { conn, table })
    }

    /// Open the store named by a `sqlite:///` URL.
    pub fn from_url(url: &str, table: impl Into<String>) -> Result<Self, StoreError> {
        let path = database_path_from_url(url)?;
        Self::open(path, table)
    }
}

impl RecordSource for SqliteRecordSource {
    fn fetch(&self, version: &str) -> Result<Vec<ParticipantRecord>, StoreError> {
        let sql = format!(
            "SELECT uniqueid, status, cond, counterbalance, datastring
             FROM {}
             WHERE codeversion = ?1
             ORDER BY rowid ASC",
            self.table
        );
        // A table without the expected columns means the cached location
        // points at the wrong store.
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| StoreError::Unavailable {
                reason: format!("cannot query table '{}': {}", self.table, e),
            })?;

        let rows = stmt.query_map([version], |row| {
            Ok(ParticipantRecord {
                id: row.get(0)?,
                completion_status: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
                condition: row.get(2)?,
                counterbalance: row.get(3)?,
                datastring: row.get(4)?,
            })
        })?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }

        log::debug!("📥 Fetched {} records for version {}", records.len(), version);
        Ok(records)
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

//! SQLite-backed tour state.
//!
//! A single `kv` table holds every persisted key as JSON text. A
//! [`WriteBatch`] is applied inside one transaction, so a crash or a failed
//! statement leaves either the whole batch or none of it on disk.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{data_dir, StateStore, WriteBatch};
use crate::error::{CoreError, StoreError};

/// SQLite database for tour state.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `<data_dir>/onboard.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("onboard.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) the database at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Number of keys currently present.
    pub fn key_count(&self) -> Result<u64, StoreError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get::<_, u64>(0))?;
        Ok(count)
    }
}

impl StateStore for Database {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let raw = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;

        match raw {
            None => Ok(None),
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| StoreError::Decode {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    fn apply(&mut self, batch: &WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        for (key, value) in batch.iter() {
            match value {
                Some(v) => {
                    tx.execute(
                        "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                        params![key, v.to_string(), now],
                    )?;
                }
                None => {
                    tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

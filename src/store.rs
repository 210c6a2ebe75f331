// SQLite-backed blob store

use crate::blob::{BlobStore, validate_key};
use crate::clock::now_ms;
use eyre::{Context, Result};
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CURRENT_VERSION: u32 = 1;

/// Blob store persisted in a single SQLite table
pub struct SqliteBlobStore {
    base_path: PathBuf,
    db: Connection,
}

impl SqliteBlobStore {
    /// Open or create a store at the given path
    ///
    /// The store will be created in a `.tasktally` subdirectory of the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().join(".tasktally");

        fs::create_dir_all(&base_path).context("Failed to create store directory")?;

        let db_path = base_path.join("tasktally.db");
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;

        let store = Self { base_path, db };

        store.create_schema()?;
        store.create_gitignore()?;
        store.write_version()?;

        info!(path = ?db_path, "Opened SQLite blob store");
        Ok(store)
    }

    /// Get the base path of this store
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn create_schema(&self) -> Result<()> {
        debug!("Creating database schema");

        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn create_gitignore(&self) -> Result<()> {
        let gitignore_path = self.base_path.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(gitignore_path, "tasktally.db\ntasktally.db-shm\ntasktally.db-wal\n")?;
        }
        Ok(())
    }

    fn write_version(&self) -> Result<()> {
        let version_path = self.base_path.join(".version");
        if !version_path.exists() {
            fs::write(version_path, CURRENT_VERSION.to_string())?;
        }
        Ok(())
    }

    fn upsert(conn: &Connection, key: &str, value: &str, updated_at: i64) -> Result<()> {
        validate_key(key)?;
        conn.execute(
            "INSERT OR REPLACE INTO blobs (key, value, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, value, updated_at],
        )?;
        Ok(())
    }
}

impl BlobStore for SqliteBlobStore {
    fn is_available(&self) -> bool {
        self.db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .query_row("SELECT value FROM blobs WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to read key {}", key))?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        Self::upsert(&self.db, key, value, now_ms()).with_context(|| format!("Failed to write key {}", key))
    }

    fn set_many(&mut self, entries: &[(&str, String)]) -> Result<()> {
        let updated_at = now_ms();
        let tx = self.db.transaction()?;

        for (key, value) in entries {
            Self::upsert(&tx, key, value, updated_at).with_context(|| format!("Failed to write key {}", key))?;
        }

        tx.commit()?;
        debug!(count = entries.len(), "Committed snapshot");
        Ok(())
    }
}

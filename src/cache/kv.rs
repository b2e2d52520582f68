//! Key-value backends for the local cache

use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ProgressError, Result};

/// Durable string key-value store
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value under `key` in one write
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// SQLite-backed store, one row per key
pub struct SqliteKv {
    db: Connection,
}

impl SqliteKv {
    /// Open or create the cache database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Connection::open(path)?;

        // WAL keeps readers unblocked while a save is in flight
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(&db)?;

        info!(path = %path.display(), "Local cache opened");
        Ok(Self { db })
    }

    /// Volatile store for guest sessions and tests
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init(&db)?;
        Ok(Self { db })
    }

    fn init(db: &Connection) -> Result<()> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );",
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.db.prepare_cached("SELECT value FROM kv WHERE key = ?1")?;
        let value = stmt
            .query_row([key], |row| row.get::<_, String>(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db.execute(
            "INSERT INTO kv (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now'))
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = strftime('%s', 'now')",
            rusqlite::params![key, value],
        )?;
        debug!(key, bytes = value.len(), "Cache entry written");
        Ok(())
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ProgressError::Cache("memory cache lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ProgressError::Cache("memory cache lock poisoned".into()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

//! `SQLite` store backend.
//!
//! One table holds every store: `kv(store, key, value)` with JSON text
//! values. Access is synchronous under a `parking_lot` mutex; statements are
//! short single-row operations.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::info;
use veil_core::StoreName;

use crate::errors::{Result, StoreError};
use crate::kv::KeyValueStore;

const PRAGMAS: &str = "PRAGMA journal_mode = WAL;
     PRAGMA synchronous = NORMAL;";

const CREATE_TABLES: &str = "CREATE TABLE IF NOT EXISTS kv (
         store TEXT NOT NULL,
         key TEXT NOT NULL,
         value TEXT NOT NULL,
         updated_at TEXT NOT NULL DEFAULT (datetime('now')),
         PRIMARY KEY (store, key)
     );";

/// Durable store backed by a single `SQLite` database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::NotInitialized(format!("create dir: {e}")))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(PRAGMAS)?;
        conn.execute_batch(CREATE_TABLES)?;
        info!(path = %path.display(), "store database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn parse_value(store: StoreName, key: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| StoreError::Validation {
        store,
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, store: StoreName, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT value FROM kv WHERE store = ?1 AND key = ?2",
                params![store.as_str(), key],
                |row| row.get(0),
            )
            .optional()?
        };
        raw.map(|r| parse_value(store, key, &r)).transpose()
    }

    async fn set(&self, store: StoreName, key: &str, value: Value) -> Result<()> {
        let text = serde_json::to_string(&value)?;
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO kv (store, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(store, key) DO UPDATE SET value = excluded.value,
                                                   updated_at = datetime('now')",
            params![store.as_str(), key, text],
        )?;
        Ok(())
    }

    async fn delete(&self, store: StoreName, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        let _ = conn.execute(
            "DELETE FROM kv WHERE store = ?1 AND key = ?2",
            params![store.as_str(), key],
        )?;
        Ok(())
    }

    async fn get_all(&self, store: StoreName) -> Result<BTreeMap<String, Value>> {
        let rows: Vec<(String, String)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare("SELECT key, value FROM kv WHERE store = ?1")?;
            let mapped = stmt.query_map(params![store.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            mapped.collect::<std::result::Result<_, _>>()?
        };
        rows.into_iter()
            .map(|(key, raw)| {
                let value = parse_value(store, &key, &raw)?;
                Ok((key, value))
            })
            .collect()
    }
}

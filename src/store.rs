use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS notified (
    listing_id    TEXT PRIMARY KEY,
    fingerprint   TEXT NOT NULL,
    first_seen    TEXT NOT NULL,
    last_notified TEXT NOT NULL
);";

/// Remembers which listing versions have already been sent
pub trait NotificationStore: Send + Sync {
    /// True only when `listing_id` was notified with exactly this fingerprint.
    fn already_notified(&self, listing_id: &str, fingerprint: &str) -> Result<bool>;
    fn upsert_notification(&self, listing_id: &str, fingerprint: &str) -> Result<()>;
}

/// SQLite-backed store; survives restarts
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create state directory {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open state db {}", path.display()))?;
        let store = Self::from_connection(conn)?;
        info!(path = %path.display(), "state_store_opened");
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory state db")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let conn = Self::init(conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: Connection) -> Result<Connection> {
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            error!("Failed to enable WAL mode: {err}");
        }
        if let Err(err) = conn.pragma_update(None, "synchronous", "NORMAL") {
            error!("Failed to set synchronous mode: {err}");
        }
        conn.execute_batch(SCHEMA)
            .context("failed to create notified table")?;
        Ok(conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("state store lock poisoned"))
    }
}

impl NotificationStore for SqliteStore {
    fn already_notified(&self, listing_id: &str, fingerprint: &str) -> Result<bool> {
        let conn = self.lock()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT fingerprint FROM notified WHERE listing_id = ?1",
                params![listing_id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query notified table")?;
        Ok(stored.as_deref() == Some(fingerprint))
    }

    fn upsert_notification(&self, listing_id: &str, fingerprint: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO notified (listing_id, fingerprint, first_seen, last_notified)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(listing_id) DO UPDATE SET
                 fingerprint = excluded.fingerprint,
                 last_notified = excluded.last_notified",
            params![listing_id, fingerprint, now],
        )
        .context("failed to upsert notification")?;
        Ok(())
    }
}

/// Process-local store for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationStore for MemoryStore {
    fn already_notified(&self, listing_id: &str, fingerprint: &str) -> Result<bool> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(rows.get(listing_id).map(String::as_str) == Some(fingerprint))
    }

    fn upsert_notification(&self, listing_id: &str, fingerprint: &str) -> Result<()> {
        self.rows
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .insert(listing_id.to_string(), fingerprint.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(store: &dyn NotificationStore) {
        assert!(!store.already_notified("L1", "fp-a").unwrap());

        store.upsert_notification("L1", "fp-a").unwrap();
        assert!(store.already_notified("L1", "fp-a").unwrap());
        assert!(!store.already_notified("L1", "fp-b").unwrap());
        assert!(!store.already_notified("L2", "fp-a").unwrap());

        // price change gives a new fingerprint
        store.upsert_notification("L1", "fp-b").unwrap();
        assert!(store.already_notified("L1", "fp-b").unwrap());
        assert!(!store.already_notified("L1", "fp-a").unwrap());
    }

    #[test]
    fn memory_store() {
        let store = MemoryStore::new();
        exercise(&store);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn sqlite_in_memory() {
        exercise(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn sqlite_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state/notified.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            exercise(&store);
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.already_notified("L1", "fp-b").unwrap());

        let conn = store.lock().unwrap();
        let (first_seen, last_notified): (String, String) = conn
            .query_row(
                "SELECT first_seen, last_notified FROM notified WHERE listing_id = 'L1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert!(first_seen <= last_notified);
    }
}

//! SQLite-backed device-local storage.
//!
//! Two tables:
//! - `kv`: small key-value pairs, notably the persisted lockout timestamp
//!   and the CLI's session snapshot.
//! - `children`: one JSON [`ChildProgress`] document per child.
//!
//! The database implements both [`LockoutStore`] and [`ProgressStore`].
//! Progress transactions run with immediate behavior and a bounded busy
//! retry, and every committed transaction feeds the child's watch channel,
//! giving subscribers read-your-writes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{params, Connection, TransactionBehavior};
use tokio::sync::watch;

use super::data_dir;
use crate::error::StorageError;
use crate::ledger::{ChildProgress, ProgressStore};
use crate::lockout::LockoutStore;

/// kv key holding the persisted cool-down expiry.
const UNLOCK_AT_KEY: &str = "unlock_at_epoch_ms";

/// Attempts per progress transaction before the error propagates.
const TRANSACT_ATTEMPTS: u32 = 3;

pub struct Database {
    conn: Mutex<Connection>,
    watchers: Mutex<HashMap<String, watch::Sender<ChildProgress>>>,
}

impl Database {
    /// Open the database at `~/.config/starpath/starpath.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StorageError> {
        let path = data_dir()
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?
            .join("starpath.db");
        Self::open_at(path)
    }

    /// Open a database at an explicit path (tests and tooling).
    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let conn =
            Connection::open(&path).map_err(|source| StorageError::OpenFailed { path, source })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        let db = Self {
            conn: Mutex::new(conn),
            watchers: Mutex::new(HashMap::new()),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), StorageError> {
        self.lock_conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS children (
                child_id TEXT PRIMARY KEY,
                progress TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    // A poisoned mutex still guards a usable connection.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock_conn().execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove a key from the kv store.
    pub fn kv_delete(&self, key: &str) -> Result<(), StorageError> {
        self.lock_conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn read_child(conn: &Connection, child_id: &str) -> Result<ChildProgress, StorageError> {
        let mut stmt = conn.prepare("SELECT progress FROM children WHERE child_id = ?1")?;
        let result = stmt.query_row(params![child_id], |row| row.get::<_, String>(0));
        match result {
            Ok(json) => {
                serde_json::from_str(&json).map_err(|e| StorageError::CorruptDocument {
                    key: child_id.to_string(),
                    message: e.to_string(),
                })
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(ChildProgress::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn transact_once(
        &self,
        child_id: &str,
        mutate: &mut dyn FnMut(&mut ChildProgress),
    ) -> Result<ChildProgress, StorageError> {
        let mut conn = self.lock_conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut doc = Self::read_child(&tx, child_id)?;
        mutate(&mut doc);
        let json = serde_json::to_string(&doc).map_err(|e| StorageError::CorruptDocument {
            key: child_id.to_string(),
            message: e.to_string(),
        })?;
        tx.execute(
            "INSERT OR REPLACE INTO children (child_id, progress) VALUES (?1, ?2)",
            params![child_id, json],
        )?;
        tx.commit()?;
        Ok(doc)
    }

    fn notify_watchers(&self, child_id: &str, progress: &ChildProgress) {
        if let Some(tx) = self
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(child_id)
        {
            let _ = tx.send(progress.clone());
        }
    }
}

impl LockoutStore for Database {
    fn load_unlock_at(&self) -> Result<Option<i64>, StorageError> {
        match self.kv_get(UNLOCK_AT_KEY)? {
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|e| StorageError::CorruptDocument {
                    key: UNLOCK_AT_KEY.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn save_unlock_at(&self, unlock_at_epoch_ms: i64) -> Result<(), StorageError> {
        self.kv_set(UNLOCK_AT_KEY, &unlock_at_epoch_ms.to_string())
    }
}

impl ProgressStore for Database {
    fn load(&self, child_id: &str) -> Result<ChildProgress, StorageError> {
        Self::read_child(&self.lock_conn(), child_id)
    }

    fn transact(
        &self,
        child_id: &str,
        mutate: &mut dyn FnMut(&mut ChildProgress),
    ) -> Result<ChildProgress, StorageError> {
        let mut attempt = 0;
        let doc = loop {
            match self.transact_once(child_id, mutate) {
                Ok(doc) => break doc,
                Err(e) if e.is_retryable() && attempt + 1 < TRANSACT_ATTEMPTS => {
                    attempt += 1;
                    tracing::debug!(child_id, attempt, "progress transaction busy, retrying");
                    std::thread::sleep(Duration::from_millis(25 * attempt as u64));
                }
                Err(e) => return Err(e),
            }
        };
        self.notify_watchers(child_id, &doc);
        Ok(doc)
    }

    fn watch(&self, child_id: &str) -> watch::Receiver<ChildProgress> {
        let current = self.load(child_id).unwrap_or_default();
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(child_id.to_string())
            .or_insert_with(|| watch::channel(current).0)
            .subscribe()
    }
}

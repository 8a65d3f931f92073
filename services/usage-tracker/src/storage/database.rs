use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use model_quota_ledger::{
    ChangeOrigin, PersistenceAdapter, PersistenceError, StoreChange, StoreEntries,
};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::error::StorageError;
use super::schema::init_database;
use super::USAGE_DB_FILENAME;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// SQLite-backed key-value store holding the ledger's persisted entries.
pub struct UsageDatabase {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StoreChange>,
    data_version: AtomicI64,
}

impl UsageDatabase {
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(USAGE_DB_FILENAME);
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        init_database(&conn)?;

        let version = read_data_version(&conn)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        info!(path = %db_path.display(), "opened usage database");

        Ok(Self {
            conn: Mutex::new(conn),
            changes,
            data_version: AtomicI64::new(version),
        })
    }

    pub fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        let conn = self.connection()?;
        let raw = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|source| StorageError::InvalidValue {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    pub fn put_values(&self, entries: &StoreEntries) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                r#"
                INSERT INTO kv_store (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
                params![key, value.to_string(), now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    /// Checks whether another connection committed since the last poll and,
    /// if so, announces it as an external change.
    pub fn poll_external_changes(&self) -> Result<bool, StorageError> {
        let version = {
            let conn = self.connection()?;
            read_data_version(&conn)?
        };
        if self.data_version.swap(version, Ordering::SeqCst) == version {
            return Ok(false);
        }

        let keys = self.list_keys()?;
        debug!(keys = keys.len(), "usage database changed externally");
        let _ = self.changes.send(StoreChange {
            keys,
            origin: ChangeOrigin::External,
        });
        Ok(true)
    }

    pub fn start_change_watcher(self: &Arc<Self>, poll_interval: Duration) -> JoinHandle<()> {
        let database = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if let Err(err) = database.poll_external_changes() {
                    error!(error = %err, "failed to poll usage database for changes");
                }
            }
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

#[async_trait]
impl PersistenceAdapter for UsageDatabase {
    async fn get(&self, keys: &[&str]) -> Result<StoreEntries, PersistenceError> {
        let mut entries = StoreEntries::new();
        for key in keys {
            if let Some(value) = self.get_value(key)? {
                entries.insert(key.to_string(), value);
            }
        }
        Ok(entries)
    }

    async fn set(&self, entries: StoreEntries) -> Result<(), PersistenceError> {
        self.put_values(&entries)?;
        let _ = self.changes.send(StoreChange {
            keys: entries.into_keys().collect(),
            origin: ChangeOrigin::Local,
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

fn read_data_version(conn: &Connection) -> Result<i64, StorageError> {
    Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
}

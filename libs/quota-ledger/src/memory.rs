use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::persistence::{
    ChangeOrigin, PersistenceAdapter, PersistenceError, StoreChange, StoreEntries,
};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// In-process store, used by tests, benches and hosts without durable storage.
pub struct MemoryStore {
    entries: RwLock<StoreEntries>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(StoreEntries::new()),
            changes,
        }
    }

    /// Writes as if another context sharing the store had made the change.
    pub fn apply_external(&self, entries: StoreEntries) -> Result<(), PersistenceError> {
        self.write(entries, ChangeOrigin::External)
    }

    fn write(&self, entries: StoreEntries, origin: ChangeOrigin) -> Result<(), PersistenceError> {
        let keys: Vec<String> = entries.keys().cloned().collect();
        {
            let mut guard = self
                .entries
                .write()
                .map_err(|_| PersistenceError::Backend("memory store poisoned".into()))?;
            guard.extend(entries);
        }
        // No receivers is fine.
        let _ = self.changes.send(StoreChange { keys, origin });
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreEntries, PersistenceError> {
        let guard = self
            .entries
            .read()
            .map_err(|_| PersistenceError::Backend("memory store poisoned".into()))?;
        Ok(keys
            .iter()
            .filter_map(|key| guard.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, entries: StoreEntries) -> Result<(), PersistenceError> {
        self.write(entries, ChangeOrigin::Local)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

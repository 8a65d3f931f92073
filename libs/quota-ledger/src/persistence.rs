use std::collections::BTreeMap;
use std::io;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

use crate::catalog::EntityKey;
use crate::state::{LedgerState, QuotaRecord};

pub const USAGE_DATA_KEY: &str = "usageData";
pub const LAST_USED_MODEL_KEY: &str = "lastUsedModel";
pub const LAST_ACTIVE_ENTITY_KEY: &str = "lastActiveEntity";
pub const ONBOARDING_KEY: &str = "hasShownSplash";

pub const LEDGER_KEYS: [&str; 3] = [USAGE_DATA_KEY, LAST_USED_MODEL_KEY, LAST_ACTIVE_ENTITY_KEY];

pub type StoreEntries = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Written through this adapter instance.
    Local,
    /// Written by another process or context sharing the store.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub keys: Vec<String>,
    pub origin: ChangeOrigin,
}

impl StoreChange {
    pub fn touches_ledger(&self) -> bool {
        self.keys
            .iter()
            .any(|key| LEDGER_KEYS.contains(&key.as_str()))
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value store with change notification supplied by the host.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Returns the subset of `keys` that exist in the store.
    async fn get(&self, keys: &[&str]) -> Result<StoreEntries, PersistenceError>;

    async fn set(&self, entries: StoreEntries) -> Result<(), PersistenceError>;

    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Rebuilds ledger state from stored entries. Unknown model names are dropped.
pub fn decode_state(entries: &StoreEntries) -> Result<LedgerState, serde_json::Error> {
    let mut state = LedgerState::new();

    if let Some(usage) = entries.get(USAGE_DATA_KEY).filter(|value| !value.is_null()) {
        let raw: BTreeMap<String, Value> = serde_json::from_value(usage.clone())?;
        for (name, value) in raw {
            let key = match name.parse::<EntityKey>() {
                Ok(key) if !key.is_unlimited() => key,
                Ok(key) => {
                    warn!(model = %key, "ignoring stored record for unlimited model");
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "ignoring stored record for unknown model");
                    continue;
                }
            };
            match serde_json::from_value::<QuotaRecord>(value) {
                Ok(record) => {
                    state.records.insert(key, record);
                }
                Err(err) => {
                    warn!(model = %key, error = %err, "ignoring malformed stored record");
                }
            }
        }
    }

    let last_active = entries
        .get(LAST_USED_MODEL_KEY)
        .or_else(|| entries.get(LAST_ACTIVE_ENTITY_KEY))
        .and_then(Value::as_str);
    if let Some(name) = last_active {
        match name.parse::<EntityKey>() {
            Ok(key) => state.last_active = Some(key),
            Err(err) => warn!(error = %err, "ignoring unknown last used model"),
        }
    }

    Ok(state)
}

pub fn encode_state(state: &LedgerState) -> Result<StoreEntries, serde_json::Error> {
    let mut entries = StoreEntries::new();
    entries.insert(USAGE_DATA_KEY.to_string(), serde_json::to_value(&state.records)?);
    entries.insert(
        LAST_USED_MODEL_KEY.to_string(),
        serde_json::to_value(state.last_active)?,
    );
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_encode_uses_stored_field_names() {
        let mut state = LedgerState::new();
        let now = Utc.timestamp_millis_opt(1_726_833_600_000).unwrap();
        state.record_event_at(EntityKey::O1Mini, now);

        let entries = encode_state(&state).unwrap();
        assert_eq!(
            entries[USAGE_DATA_KEY],
            json!({ "o1-mini": { "count": 1, "resetTime": 1_726_920_000_000i64 } })
        );
        assert_eq!(entries[LAST_USED_MODEL_KEY], json!("o1-mini"));
    }

    #[test]
    fn test_decode_tolerates_unknown_and_aliases() {
        let mut entries = StoreEntries::new();
        entries.insert(
            USAGE_DATA_KEY.to_string(),
            json!({
                "4": { "count": 3, "resetDeadline": 1_726_833_600_000i64 },
                "4o": { "count": 0, "resetTime": null },
                "gpt-9": { "count": 7, "resetTime": 1 },
                "4o-mini": { "count": 2, "resetTime": 1 }
            }),
        );
        entries.insert(LAST_ACTIVE_ENTITY_KEY.to_string(), json!("4"));

        let state = decode_state(&entries).unwrap();
        assert_eq!(state.records.len(), 2);
        assert_eq!(state.records[&EntityKey::Gpt4].count, 3);
        assert_eq!(
            state.records[&EntityKey::Gpt4].reset_deadline,
            Some(Utc.timestamp_millis_opt(1_726_833_600_000).unwrap())
        );
        assert_eq!(state.records[&EntityKey::Gpt4o].reset_deadline, None);
        assert_eq!(state.last_active, Some(EntityKey::Gpt4));
    }

    #[test]
    fn test_decode_skips_foreign_and_malformed_records() {
        let mut entries = StoreEntries::new();
        entries.insert(
            USAGE_DATA_KEY.to_string(),
            json!({
                "4o": { "count": 3, "resetTime": 1_726_833_600_000i64 },
                "gpt-5": { "uses": 1 },
                "4": { "count": -2 }
            }),
        );

        let state = decode_state(&entries).unwrap();
        assert_eq!(state.records.len(), 1);
        assert_eq!(state.records[&EntityKey::Gpt4o].count, 3);
    }

    #[test]
    fn test_decode_rejects_non_object_usage() {
        let mut entries = StoreEntries::new();
        entries.insert(USAGE_DATA_KEY.to_string(), json!([1, 2, 3]));
        assert!(decode_state(&entries).is_err());
    }

    #[test]
    fn test_decode_empty_store() {
        let state = decode_state(&StoreEntries::new()).unwrap();
        assert_eq!(state, LedgerState::new());

        let mut entries = StoreEntries::new();
        entries.insert(USAGE_DATA_KEY.to_string(), Value::Null);
        entries.insert(LAST_USED_MODEL_KEY.to_string(), Value::Null);
        assert_eq!(decode_state(&entries).unwrap(), LedgerState::new());
    }

}

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use model_quota_ledger::persistence::{LAST_USED_MODEL_KEY, USAGE_DATA_KEY};
use model_quota_ledger::{EntityKey, ManualClock, MemoryStore, QuotaLedger, StoreEntries};
use serde_json::json;

pub use model_quota_ledger;

pub struct LedgerBenchFixture {
    pub ledger: Arc<QuotaLedger>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl LedgerBenchFixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(bench_epoch()));
        let ledger = Arc::new(QuotaLedger::new(store.clone(), clock.clone()));
        Self {
            ledger,
            store,
            clock,
        }
    }

    /// Fixture whose every tracked model already has an open window with `count` uses.
    pub fn with_usage(count: u64) -> Self {
        let fixture = Self::new();
        let deadline = bench_epoch().timestamp_millis() + 60 * 60 * 1000;
        let usage: serde_json::Map<String, serde_json::Value> = EntityKey::tracked()
            .map(|key| {
                (
                    key.as_str().to_string(),
                    json!({ "count": count, "resetTime": deadline }),
                )
            })
            .collect();

        let mut entries = StoreEntries::new();
        entries.insert(USAGE_DATA_KEY.to_string(), serde_json::Value::Object(usage));
        entries.insert(LAST_USED_MODEL_KEY.to_string(), json!(EntityKey::Gpt4o));
        fixture
            .store
            .apply_external(entries)
            .expect("seed bench usage");
        fixture
    }
}

impl Default for LedgerBenchFixture {
    fn default() -> Self {
        Self::new()
    }
}

pub fn bench_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 20, 12, 0, 0)
        .single()
        .expect("valid bench epoch")
}

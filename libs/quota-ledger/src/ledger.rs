use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::catalog::EntityKey;
use crate::clock::Clock;
use crate::error::LedgerError;
use crate::persistence::{
    decode_state, encode_state, PersistenceAdapter, PersistenceError, StoreChange, StoreEntries,
    LEDGER_KEYS, ONBOARDING_KEY, USAGE_DATA_KEY,
};
use crate::state::{
    LedgerState, LimitExceeded, QuotaRecord, RecordOutcome, UsageSnapshot, WindowTransition,
};

const LIMIT_CHANNEL_CAPACITY: usize = 64;

/// Owns the quota transition rules on top of a persistence adapter.
///
/// Every mutating call holds `write_lock` across its read-modify-write, so
/// concurrent callers inside one process never lose updates. Writers in
/// other processes are only observed through the store's change feed.
pub struct QuotaLedger {
    store: Arc<dyn PersistenceAdapter>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
    limit_tx: broadcast::Sender<LimitExceeded>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn PersistenceAdapter>, clock: Arc<dyn Clock>) -> Self {
        let (limit_tx, _) = broadcast::channel(LIMIT_CHANNEL_CAPACITY);
        Self {
            store,
            clock,
            write_lock: Mutex::new(()),
            limit_tx,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Loads persisted state, seeding an empty usage map when none exists yet.
    pub async fn initialize(&self) -> Result<LedgerState, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let entries = self.store.get(&LEDGER_KEYS).await?;

        if entries.contains_key(USAGE_DATA_KEY) {
            let state = decode_state(&entries).map_err(LedgerError::Corrupt)?;
            info!(models = state.records.len(), "restored usage data");
            return Ok(state);
        }

        let state = LedgerState::new();
        let mut seed = StoreEntries::new();
        seed.insert(USAGE_DATA_KEY.to_string(), Value::Object(Default::default()));
        self.store.set(seed).await?;
        info!("initialized empty usage data");
        Ok(state)
    }

    pub async fn record_event(&self, key: EntityKey) -> Result<Option<RecordOutcome>, LedgerError> {
        if key.is_unlimited() {
            debug!(model = %key, "unlimited model, nothing to track");
            return Ok(None);
        }

        let outcome = {
            let _guard = self.write_lock.lock().await;
            let mut state = self.load().await?;
            let outcome = state.record_event_at(key, self.clock.now());
            self.persist(&state).await?;
            outcome
        };

        if let Some(outcome) = &outcome {
            let limit = key.config().map(|cfg| cfg.limit).unwrap_or_default();
            match outcome.transition {
                WindowTransition::Started => {
                    info!(model = %key, "first message for model, window started")
                }
                WindowTransition::Restarted => {
                    info!(model = %key, "usage window lapsed, window restarted")
                }
                WindowTransition::Continued => {
                    debug!(model = %key, count = outcome.record.count, limit, "usage incremented")
                }
            }
            if let Some(exceeded) = outcome.exceeded {
                self.publish(exceeded);
            }
        }

        Ok(outcome)
    }

    /// Lazy reset for idle models. Returns whether any record changed.
    pub async fn sweep_expired(&self) -> Result<bool, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await?;
        let now = self.clock.now();

        if !state.sweep_expired(now) {
            debug!("no usage windows lapsed");
            return Ok(false);
        }

        self.persist(&state).await?;
        info!("reset lapsed usage windows");
        Ok(true)
    }

    pub async fn query(&self, key: EntityKey) -> Result<UsageSnapshot, LedgerError> {
        let state = self.load().await?;
        Ok(state.query(key, self.clock.now()))
    }

    /// Snapshots for every tracked model, in display order.
    pub async fn query_all(&self) -> Result<Vec<UsageSnapshot>, LedgerError> {
        let state = self.load().await?;
        let now = self.clock.now();
        Ok(EntityKey::tracked().map(|key| state.query(key, now)).collect())
    }

    pub async fn last_active(&self) -> Result<Option<EntityKey>, LedgerError> {
        Ok(self.load().await?.last_active)
    }

    pub async fn snapshot(&self) -> Result<LedgerState, LedgerError> {
        self.load().await
    }

    pub async fn apply_manual_override(
        &self,
        key: EntityKey,
        remaining_uses: i64,
        reset_at: DateTime<Utc>,
    ) -> Result<QuotaRecord, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await?;
        let record = state.apply_manual_override(key, remaining_uses, reset_at, self.clock.now())?;
        self.persist(&state).await?;

        info!(
            model = %key,
            count = record.count,
            remaining_uses,
            reset_at = %reset_at,
            "applied manual usage override"
        );
        Ok(record)
    }

    pub async fn clear_all(&self) -> Result<(), LedgerError> {
        let _guard = self.write_lock.lock().await;
        self.persist(&LedgerState::new()).await?;
        info!("cleared all usage data");
        Ok(())
    }

    /// Re-publishes `LimitExceeded` for every model currently over its limit.
    pub async fn recheck_limits(&self) -> Result<Vec<LimitExceeded>, LedgerError> {
        let exceeded = self.load().await?.over_limit();
        for event in &exceeded {
            self.publish(*event);
        }
        Ok(exceeded)
    }

    /// True exactly once per store: whether the welcome notice should be shown.
    pub async fn take_onboarding(&self) -> Result<bool, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let entries = self.store.get(&[ONBOARDING_KEY]).await?;
        if entries
            .get(ONBOARDING_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return Ok(false);
        }

        let mut flag = StoreEntries::new();
        flag.insert(ONBOARDING_KEY.to_string(), Value::Bool(true));
        self.store.set(flag).await?;
        Ok(true)
    }

    pub fn subscribe_limits(&self) -> broadcast::Receiver<LimitExceeded> {
        self.limit_tx.subscribe()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.store.subscribe()
    }

    fn publish(&self, event: LimitExceeded) {
        warn!(
            model = %event.key,
            count = event.count,
            limit = event.limit,
            "usage limit exceeded"
        );
        // Nobody listening is not an error.
        let _ = self.limit_tx.send(event);
    }

    async fn load(&self) -> Result<LedgerState, LedgerError> {
        let entries = self.store.get(&LEDGER_KEYS).await?;
        decode_state(&entries).map_err(LedgerError::Corrupt)
    }

    async fn persist(&self, state: &LedgerState) -> Result<(), LedgerError> {
        let entries = encode_state(state).map_err(PersistenceError::from)?;
        self.store.set(entries).await?;
        Ok(())
    }
}

use dashmap::DashMap;
use model_quota_ledger::{EntityKey, LedgerState, LimitExceeded};
use tracing::info;

/// Tracks which models are over their limit, so the chat input can be locked.
#[derive(Debug, Default)]
pub struct InputGate {
    locked: DashMap<EntityKey, LimitExceeded>,
}

impl InputGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self, event: LimitExceeded) {
        if self.locked.insert(event.key, event).is_none() {
            info!(model = %event.key, "input locked, usage limit reached");
        }
    }

    pub fn is_locked(&self) -> bool {
        !self.locked.is_empty()
    }

    pub fn is_model_locked(&self, key: EntityKey) -> bool {
        self.locked.contains_key(&key)
    }

    pub fn locked_models(&self) -> Vec<EntityKey> {
        let mut models: Vec<EntityKey> = self.locked.iter().map(|entry| *entry.key()).collect();
        models.sort();
        models
    }

    pub fn release_all(&self) -> usize {
        let released = self.locked.len();
        self.locked.clear();
        if released > 0 {
            info!(released, "input enabled");
        }
        released
    }

    /// Drops locks for models no longer over their limit in `state`.
    pub fn reconcile(&self, state: &LedgerState) -> usize {
        let over: Vec<EntityKey> = state.over_limit().iter().map(|event| event.key).collect();
        let before = self.locked.len();
        self.locked.retain(|key, _| over.contains(key));
        let released = before - self.locked.len();
        if released > 0 {
            info!(released, "input enabled for models back within limit");
        }
        released
    }
}

use std::sync::Arc;

pub mod handlers;
pub mod router;
pub mod types;

pub use router::create_router;
pub use types::*;

use model_quota_ledger::QuotaLedger;

use crate::config::UsageTrackerConfig;
use crate::tracker::InputGate;

pub struct ApiState {
    pub ledger: Arc<QuotaLedger>,
    pub gate: Arc<InputGate>,
    pub config: Arc<UsageTrackerConfig>,
}

impl ApiState {
    pub fn new(ledger: Arc<QuotaLedger>, gate: Arc<InputGate>, config: UsageTrackerConfig) -> Self {
        Self {
            ledger,
            gate,
            config: Arc::new(config),
        }
    }
}

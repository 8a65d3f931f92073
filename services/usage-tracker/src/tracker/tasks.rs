use std::sync::Arc;
use std::time::Duration;

use model_quota_ledger::{ChangeOrigin, LedgerError, LimitExceeded, QuotaLedger};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::gate::InputGate;

pub fn limit_message(event: &LimitExceeded) -> String {
    format!(
        "Usage limit reached for {}. Limit: {} messages.",
        event.key.display_name(),
        event.limit
    )
}

/// Runs one idle sweep; when windows reset, releases locks only for models
/// that are back within their limit.
pub async fn sweep_and_reconcile(
    ledger: &QuotaLedger,
    gate: &InputGate,
) -> Result<bool, LedgerError> {
    if !ledger.sweep_expired().await? {
        return Ok(false);
    }
    let state = ledger.snapshot().await?;
    gate.reconcile(&state);
    Ok(true)
}

/// Periodically resets idle windows and re-enables input for models they free.
pub fn start_sweep_task(
    ledger: Arc<QuotaLedger>,
    gate: Arc<InputGate>,
    sweep_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(err) = sweep_and_reconcile(&ledger, &gate).await {
                error!(error = %err, "failed to sweep expired usage windows");
            }
        }
    })
}

/// Turns `LimitExceeded` events into user notifications and input locks.
pub fn start_limit_notifier(ledger: Arc<QuotaLedger>, gate: Arc<InputGate>) -> JoinHandle<()> {
    let mut limits = ledger.subscribe_limits();
    tokio::spawn(async move {
        loop {
            match limits.recv().await {
                Ok(event) => {
                    warn!(
                        model = %event.key,
                        count = event.count,
                        limit = event.limit,
                        "{}",
                        limit_message(&event)
                    );
                    gate.lock(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "limit notifier lagging behind");
                }
                Err(RecvError::Closed) => {
                    info!("limit channel closed, notifier stopping");
                    break;
                }
            }
        }
    })
}

/// Re-checks limits whenever stored usage changes, so edits made from another
/// context lock or release input just like local events do.
pub fn start_change_listener(ledger: Arc<QuotaLedger>, gate: Arc<InputGate>) -> JoinHandle<()> {
    let mut changes = ledger.subscribe_changes();
    tokio::spawn(async move {
        loop {
            let change = match changes.recv().await {
                Ok(change) => change,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change listener lagging behind");
                    continue;
                }
                Err(RecvError::Closed) => {
                    info!("store change channel closed, listener stopping");
                    break;
                }
            };

            if !change.touches_ledger() {
                continue;
            }
            debug!(origin = ?change.origin, keys = ?change.keys, "usage data changed");

            match ledger.snapshot().await {
                Ok(state) => {
                    gate.reconcile(&state);
                }
                Err(err) => {
                    error!(error = %err, "failed to read usage data after change");
                    continue;
                }
            }

            if change.origin == ChangeOrigin::External {
                if let Err(err) = ledger.recheck_limits().await {
                    error!(error = %err, "failed to re-check usage limits");
                }
            }
        }
    })
}

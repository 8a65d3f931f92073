use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use model_quota_ledger::{EntityKey, LimitExceeded, ManualClock, MemoryStore, QuotaLedger};
use model_usage_tracker::tracker::{start_limit_notifier, start_sweep_task, sweep_and_reconcile};
use model_usage_tracker::InputGate;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 20, 12, 0, 0).unwrap()
}

fn fixture() -> (Arc<QuotaLedger>, Arc<InputGate>, Arc<ManualClock>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(t0()));
    let ledger = Arc::new(QuotaLedger::new(store, clock.clone()));
    (ledger, Arc::new(InputGate::new()), clock)
}

async fn push_over_limit(ledger: &QuotaLedger, key: EntityKey) {
    let limit = key.config().expect("tracked model").limit;
    for _ in 0..=limit {
        ledger.record_event(key).await.unwrap();
    }
}

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_sweep_task_zeroes_idle_window_and_keeps_other_locks() {
    let (ledger, gate, clock) = fixture();
    let _notifier = start_limit_notifier(Arc::clone(&ledger), Arc::clone(&gate));

    push_over_limit(&ledger, EntityKey::Gpt4).await;
    clock.advance(Duration::hours(2));
    push_over_limit(&ledger, EntityKey::O1Mini).await;

    wait_for(|| {
        let gate = Arc::clone(&gate);
        async move { gate.is_model_locked(EntityKey::Gpt4) && gate.is_model_locked(EntityKey::O1Mini) }
    })
    .await;

    // Only the 3h window of model 4 has lapsed.
    clock.advance(Duration::minutes(61));
    let _sweeper = start_sweep_task(
        Arc::clone(&ledger),
        Arc::clone(&gate),
        StdDuration::from_millis(10),
    );

    wait_for(|| {
        let ledger = Arc::clone(&ledger);
        async move { ledger.query(EntityKey::Gpt4).await.unwrap().count == 0 }
    })
    .await;
    wait_for(|| {
        let gate = Arc::clone(&gate);
        async move { !gate.is_model_locked(EntityKey::Gpt4) }
    })
    .await;

    let gpt4 = ledger.query(EntityKey::Gpt4).await.unwrap();
    assert_eq!(gpt4.reset_deadline, Some(t0() + Duration::hours(6) + Duration::minutes(1)));

    let o1_mini = ledger.query(EntityKey::O1Mini).await.unwrap();
    assert_eq!(o1_mini.count, o1_mini.limit.unwrap() + 1);
    assert_eq!(gate.locked_models(), vec![EntityKey::O1Mini]);
}

#[tokio::test]
async fn test_sweep_and_reconcile_without_lapse_keeps_locks() {
    let (ledger, gate, _clock) = fixture();
    push_over_limit(&ledger, EntityKey::Gpt4).await;
    gate.lock(LimitExceeded {
        key: EntityKey::Gpt4,
        count: 41,
        limit: 40,
    });

    assert!(!sweep_and_reconcile(&ledger, &gate).await.unwrap());
    assert!(gate.is_model_locked(EntityKey::Gpt4));
}

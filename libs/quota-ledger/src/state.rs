use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::EntityKey;

/// Usage observed for one model inside its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub count: u64,
    #[serde(
        rename = "resetTime",
        alias = "resetDeadline",
        default,
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub reset_deadline: Option<DateTime<Utc>>,
}

impl QuotaRecord {
    fn window_start(now: DateTime<Utc>, period: Duration) -> Self {
        Self {
            count: 1,
            reset_deadline: Some(now + period),
        }
    }
}

/// Emitted whenever an increment leaves a model above its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitExceeded {
    pub key: EntityKey,
    pub count: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowTransition {
    /// First event ever seen for the model.
    Started,
    /// The previous window had lapsed; this event opens the next one.
    Restarted,
    Continued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    pub key: EntityKey,
    pub record: QuotaRecord,
    pub transition: WindowTransition,
    pub exceeded: Option<LimitExceeded>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("model {0} is not quota tracked")]
    Untracked(EntityKey),
    #[error("remaining uses {remaining} outside 0..={limit}")]
    RemainingOutOfRange { remaining: i64, limit: u64 },
    #[error("reset time {reset_at} is not after {now}")]
    ResetNotInFuture {
        reset_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}

/// Point-in-time view of one model's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub key: EntityKey,
    pub count: u64,
    /// `None` for the unlimited category.
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset_deadline: Option<DateTime<Utc>>,
    /// `None` when no window is active.
    pub time_remaining: Option<Duration>,
}

impl UsageSnapshot {
    pub fn is_unlimited(&self) -> bool {
        self.limit.is_none()
    }

    /// Time left in the window, or the full period when no window is active.
    pub fn time_remaining_or_period(&self) -> Option<Duration> {
        self.time_remaining
            .or_else(|| self.key.config().map(|cfg| cfg.period))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    pub records: BTreeMap<EntityKey, QuotaRecord>,
    pub last_active: Option<EntityKey>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: EntityKey) -> Option<&QuotaRecord> {
        self.records.get(&key)
    }

    /// Counts one event for `key` at `now`. Returns `None` for the unlimited
    /// category, which never gets a record.
    pub fn record_event_at(&mut self, key: EntityKey, now: DateTime<Utc>) -> Option<RecordOutcome> {
        let cfg = key.config()?;

        let transition = match self.records.get_mut(&key) {
            Some(record) => match record.reset_deadline {
                Some(deadline) if now > deadline => {
                    *record = QuotaRecord::window_start(now, cfg.period);
                    WindowTransition::Restarted
                }
                Some(_) => {
                    record.count = record.count.saturating_add(1);
                    WindowTransition::Continued
                }
                None => {
                    *record = QuotaRecord::window_start(now, cfg.period);
                    WindowTransition::Started
                }
            },
            None => {
                self.records
                    .insert(key, QuotaRecord::window_start(now, cfg.period));
                WindowTransition::Started
            }
        };

        self.last_active = Some(key);
        let record = self.records[&key];
        let exceeded = (record.count > cfg.limit).then_some(LimitExceeded {
            key,
            count: record.count,
            limit: cfg.limit,
        });

        Some(RecordOutcome {
            key,
            record,
            transition,
            exceeded,
        })
    }

    /// Idle expiry: zeroes every lapsed window and opens a fresh one.
    /// Returns whether anything changed.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        for (key, record) in self.records.iter_mut() {
            let Some(cfg) = key.config() else {
                continue;
            };
            match record.reset_deadline {
                Some(deadline) if now >= deadline => {
                    record.count = 0;
                    record.reset_deadline = Some(now + cfg.period);
                    changed = true;
                }
                _ => {}
            }
        }

        changed
    }

    pub fn query(&self, key: EntityKey, now: DateTime<Utc>) -> UsageSnapshot {
        let record = self.records.get(&key).copied().unwrap_or_default();
        let limit = key.config().map(|cfg| cfg.limit);
        let time_remaining = record
            .reset_deadline
            .map(|deadline| (deadline - now).max(Duration::zero()));

        UsageSnapshot {
            key,
            count: record.count,
            limit,
            remaining: limit.map(|limit| limit.saturating_sub(record.count)),
            reset_deadline: record.reset_deadline,
            time_remaining,
        }
    }

    pub fn apply_manual_override(
        &mut self,
        key: EntityKey,
        remaining_uses: i64,
        reset_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<QuotaRecord, ValidationError> {
        let cfg = key.config().ok_or(ValidationError::Untracked(key))?;

        let remaining = u64::try_from(remaining_uses)
            .ok()
            .filter(|remaining| *remaining <= cfg.limit)
            .ok_or(ValidationError::RemainingOutOfRange {
                remaining: remaining_uses,
                limit: cfg.limit,
            })?;

        if reset_at <= now {
            return Err(ValidationError::ResetNotInFuture { reset_at, now });
        }

        let record = QuotaRecord {
            count: cfg.limit - remaining,
            reset_deadline: Some(reset_at),
        };
        self.records.insert(key, record);
        Ok(record)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.last_active = None;
    }

    /// Every tracked model currently above its limit.
    pub fn over_limit(&self) -> Vec<LimitExceeded> {
        self.records
            .iter()
            .filter_map(|(key, record)| {
                let cfg = key.config()?;
                (record.count > cfg.limit).then_some(LimitExceeded {
                    key: *key,
                    count: record.count,
                    limit: cfg.limit,
                })
            })
            .collect()
    }
}

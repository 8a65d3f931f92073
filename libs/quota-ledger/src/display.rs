//! Text rendering for the usage indicator and the summary view.

use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::catalog::EntityKey;
use crate::state::UsageSnapshot;

const NOT_AVAILABLE: &str = "N/A";

/// `"{hours}h {minutes}m"`; hours are never folded into days.
pub fn format_remaining(duration: Duration) -> String {
    let duration = duration.max(Duration::zero());
    format!("{}h {}m", duration.num_hours(), duration.num_minutes() % 60)
}

/// Reset text for a model with no running window: its full period.
pub fn default_reset_text(key: EntityKey) -> String {
    let Some(cfg) = key.config() else {
        return NOT_AVAILABLE.to_string();
    };
    if cfg.period.num_days() >= 7 {
        format!("{}d {}h", cfg.period.num_days(), cfg.period.num_hours() % 24)
    } else {
        format_remaining(cfg.period)
    }
}

/// Countdown shown next to a model; falls back to the period once lapsed.
pub fn reset_in_text(snapshot: &UsageSnapshot) -> String {
    match snapshot.time_remaining {
        Some(remaining) if remaining > Duration::zero() => format_remaining(remaining),
        _ => default_reset_text(snapshot.key),
    }
}

pub fn indicator_line(snapshot: &UsageSnapshot) -> String {
    let name = snapshot.key.display_name();
    match (snapshot.limit, snapshot.remaining) {
        (Some(limit), Some(remaining)) => format!(
            "{name}: {}/{limit} messages ({remaining} remaining) | Resets in: {}",
            snapshot.count,
            reset_in_text(snapshot)
        ),
        _ => format!("{name}: unlimited"),
    }
}

/// One-line header for the collapsed indicator, built from the last used model.
pub fn collapsed_text(last_active: Option<&UsageSnapshot>) -> String {
    match last_active {
        Some(snapshot) => {
            let name = snapshot.key.display_name();
            match snapshot.remaining {
                Some(remaining) => format!("{name}: {remaining} uses remaining"),
                None => format!("{name}: {NOT_AVAILABLE}"),
            }
        }
        None => format!("ChatGPT Usage: {NOT_AVAILABLE}"),
    }
}

pub fn summary_line<Tz>(snapshot: &UsageSnapshot, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let resets_at = snapshot
        .reset_deadline
        .map(|deadline| deadline.with_timezone(tz).format("%H:%M").to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    let remaining = snapshot
        .remaining
        .map(|remaining| remaining.to_string())
        .unwrap_or_else(|| "unlimited".to_string());

    format!(
        "{}: {remaining} remaining, Resets at: {resets_at}",
        snapshot.key.display_name()
    )
}

pub fn summary<Tz>(snapshots: &[UsageSnapshot], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    snapshots
        .iter()
        .map(|snapshot| summary_line(snapshot, tz))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Human-readable reset deadline for management views.
pub fn format_reset_timestamp<Tz>(deadline: DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    deadline
        .with_timezone(tz)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LedgerState;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::minutes(130)), "2h 10m");
        assert_eq!(format_remaining(Duration::days(7) - Duration::minutes(1)), "167h 59m");
        assert_eq!(format_remaining(Duration::seconds(-5)), "0h 0m");
    }

    #[test]
    fn test_default_reset_text() {
        assert_eq!(default_reset_text(EntityKey::Gpt4o), "3h 0m");
        assert_eq!(default_reset_text(EntityKey::Gpt4), "3h 0m");
        assert_eq!(default_reset_text(EntityKey::O1Mini), "24h 0m");
        assert_eq!(default_reset_text(EntityKey::O1Preview), "7d 0h");
        assert_eq!(default_reset_text(EntityKey::Gpt4oMini), "N/A");
    }

    #[test]
    fn test_indicator_line() {
        let mut state = LedgerState::new();
        for _ in 0..3 {
            state.record_event_at(EntityKey::Gpt4, t0());
        }
        let snapshot = state.query(EntityKey::Gpt4, t0() + Duration::minutes(50));
        assert_eq!(
            indicator_line(&snapshot),
            "ChatGPT 4: 3/40 messages (37 remaining) | Resets in: 2h 10m"
        );

        let lapsed = state.query(EntityKey::Gpt4, t0() + Duration::hours(9));
        assert!(indicator_line(&lapsed).ends_with("Resets in: 3h 0m"));

        let idle = state.query(EntityKey::O1Preview, t0());
        assert_eq!(
            indicator_line(&idle),
            "ChatGPT o1-preview: 0/50 messages (50 remaining) | Resets in: 7d 0h"
        );
    }

    #[test]
    fn test_collapsed_text() {
        let mut state = LedgerState::new();
        for _ in 0..5 {
            state.record_event_at(EntityKey::Gpt4o, t0());
        }
        let snapshot = state.query(EntityKey::Gpt4o, t0());
        assert_eq!(collapsed_text(Some(&snapshot)), "ChatGPT 4o: 75 uses remaining");
        assert_eq!(collapsed_text(None), "ChatGPT Usage: N/A");
    }

    #[test]
    fn test_summary_in_fixed_zone() {
        let mut state = LedgerState::new();
        state.record_event_at(EntityKey::Gpt4, t0());
        let snapshots = vec![
            state.query(EntityKey::Gpt4, t0()),
            state.query(EntityKey::O1Mini, t0()),
        ];
        let tz = chrono::FixedOffset::east_opt(2 * 3600).unwrap();

        assert_eq!(
            summary(&snapshots, &tz),
            "ChatGPT 4: 39 remaining, Resets at: 17:00\nChatGPT o1-mini: 50 remaining, Resets at: N/A"
        );
        assert_eq!(
            format_reset_timestamp(t0(), &tz),
            "2024-09-20 14:00:00"
        );
    }
}

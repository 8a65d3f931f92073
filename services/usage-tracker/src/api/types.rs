use chrono::Local;
use model_quota_ledger::{display, UsageSnapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEventRequest {
    /// Model wire name, e.g. `"o1-mini"`.
    pub model: Option<String>,
    /// Raw label texts scraped from the page; used when `model` is absent.
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEventResponse {
    pub model: Option<String>,
    pub tracked: bool,
    pub limit_exceeded: bool,
    pub usage: Option<UsageView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageView {
    pub model: String,
    pub display_name: String,
    pub count: u64,
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    /// Epoch milliseconds.
    pub reset_time: Option<i64>,
    pub reset_at_local: Option<String>,
    pub resets_in: String,
}

impl From<&UsageSnapshot> for UsageView {
    fn from(snapshot: &UsageSnapshot) -> Self {
        Self {
            model: snapshot.key.as_str().to_string(),
            display_name: snapshot.key.display_name().to_string(),
            count: snapshot.count,
            limit: snapshot.limit,
            remaining: snapshot.remaining,
            reset_time: snapshot.reset_deadline.map(|deadline| deadline.timestamp_millis()),
            reset_at_local: snapshot
                .reset_deadline
                .map(|deadline| display::format_reset_timestamp(deadline, &Local)),
            resets_in: display::reset_in_text(snapshot),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageListResponse {
    pub models: Vec<UsageView>,
    pub last_used_model: Option<String>,
    pub locked_models: Vec<String>,
    pub input_locked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorResponse {
    pub collapsed: String,
    pub lines: Vec<String>,
    pub last_used_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRequest {
    pub remaining_uses: i64,
    /// Epoch milliseconds.
    pub reset_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingResponse {
    pub show_welcome: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<serde_json::Value>,
}

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Local, TimeZone, Utc};
use model_quota_ledger::{detect_model, display, EntityKey, LedgerError};
use tracing::{debug, error, info};

use crate::tracker::sweep_and_reconcile;

use super::types::{
    ErrorResponse, IndicatorResponse, OnboardingResponse, OverrideRequest, RecordEventRequest,
    RecordEventResponse, SuccessResponse, UsageListResponse, UsageView,
};
use super::ApiState;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

const WELCOME_MESSAGE: &str = "Usage is tracked by watching new messages in the chat. \
Messages sent with limited models before the tracker was installed are not counted, \
so remaining uses may be higher than shown.";

pub async fn record_event(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<RecordEventRequest>,
) -> ApiResult<RecordEventResponse> {
    let key = match (&request.model, &request.labels) {
        (Some(model), _) => Some(parse_model(model, StatusCode::BAD_REQUEST)?),
        (None, Some(labels)) => detect_model(labels.iter().map(String::as_str)),
        (None, None) => {
            return Err(bad_request(
                "invalid_event",
                "either model or labels must be provided",
            ))
        }
    };

    let Some(key) = key else {
        debug!("no model detected for new message");
        return Ok(Json(RecordEventResponse {
            model: None,
            tracked: false,
            limit_exceeded: false,
            usage: None,
        }));
    };

    let outcome = state
        .ledger
        .record_event(key)
        .await
        .map_err(ledger_error)?;
    let snapshot = state.ledger.query(key).await.map_err(ledger_error)?;

    Ok(Json(RecordEventResponse {
        model: Some(key.as_str().to_string()),
        tracked: outcome.is_some(),
        limit_exceeded: outcome.and_then(|outcome| outcome.exceeded).is_some(),
        usage: Some(UsageView::from(&snapshot)),
    }))
}

pub async fn list_usage(State(state): State<Arc<ApiState>>) -> ApiResult<UsageListResponse> {
    let snapshots = state.ledger.query_all().await.map_err(ledger_error)?;
    let last_used = state.ledger.last_active().await.map_err(ledger_error)?;
    let response = UsageListResponse {
        models: snapshots.iter().map(UsageView::from).collect(),
        last_used_model: last_used.map(|key| key.as_str().to_string()),
        locked_models: state
            .gate
            .locked_models()
            .into_iter()
            .map(|key| key.as_str().to_string())
            .collect(),
        input_locked: state.gate.is_locked(),
    };

    sweep_after_render(&state).await;
    Ok(Json(response))
}

pub async fn usage_summary(
    State(state): State<Arc<ApiState>>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshots = state.ledger.query_all().await.map_err(ledger_error)?;
    let body = display::summary(&snapshots, &Local);
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}

pub async fn usage_indicator(State(state): State<Arc<ApiState>>) -> ApiResult<IndicatorResponse> {
    let snapshots = state.ledger.query_all().await.map_err(ledger_error)?;
    let last_used = state.ledger.last_active().await.map_err(ledger_error)?;
    let last_snapshot = match last_used {
        Some(key) => Some(state.ledger.query(key).await.map_err(ledger_error)?),
        None => None,
    };

    let response = IndicatorResponse {
        collapsed: display::collapsed_text(last_snapshot.as_ref()),
        lines: snapshots.iter().map(display::indicator_line).collect(),
        last_used_model: last_used.map(|key| key.as_str().to_string()),
    };

    sweep_after_render(&state).await;
    Ok(Json(response))
}

pub async fn get_usage(
    State(state): State<Arc<ApiState>>,
    Path(model): Path<String>,
) -> ApiResult<UsageView> {
    let key = parse_model(&model, StatusCode::NOT_FOUND)?;
    let snapshot = state.ledger.query(key).await.map_err(ledger_error)?;
    Ok(Json(UsageView::from(&snapshot)))
}

pub async fn override_usage(
    State(state): State<Arc<ApiState>>,
    Path(model): Path<String>,
    Json(request): Json<OverrideRequest>,
) -> ApiResult<UsageView> {
    let key = parse_model(&model, StatusCode::NOT_FOUND)?;
    let reset_at = Utc
        .timestamp_millis_opt(request.reset_at)
        .single()
        .ok_or_else(|| bad_request("invalid_reset_time", "reset_at is not a valid timestamp"))?;

    state
        .ledger
        .apply_manual_override(key, request.remaining_uses, reset_at)
        .await
        .map_err(ledger_error)?;

    let snapshot = state.ledger.query(key).await.map_err(ledger_error)?;
    Ok(Json(UsageView::from(&snapshot)))
}

pub async fn reset_usage(State(state): State<Arc<ApiState>>) -> ApiResult<SuccessResponse> {
    state.ledger.clear_all().await.map_err(ledger_error)?;
    state.gate.release_all();
    info!("usage data reset from management surface");
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn onboarding(State(state): State<Arc<ApiState>>) -> ApiResult<OnboardingResponse> {
    let show_welcome = state.ledger.take_onboarding().await.map_err(ledger_error)?;
    Ok(Json(OnboardingResponse {
        show_welcome,
        message: show_welcome.then(|| WELCOME_MESSAGE.to_string()),
    }))
}

pub async fn health_check() -> ApiResult<serde_json::Value> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "usage-tracker"
    })))
}

async fn sweep_after_render(state: &ApiState) {
    if let Err(err) = sweep_and_reconcile(&state.ledger, &state.gate).await {
        error!(error = %err, "failed to sweep after render");
    }
}

fn parse_model(model: &str, status: StatusCode) -> Result<EntityKey, ApiError> {
    model.parse::<EntityKey>().map_err(|err| {
        (
            status,
            Json(ErrorResponse {
                error: err.to_string(),
                code: "unknown_model".to_string(),
                details: None,
            }),
        )
    })
}

fn ledger_error(err: LedgerError) -> ApiError {
    match err {
        LedgerError::Validation(err) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: err.to_string(),
                code: "validation_error".to_string(),
                details: None,
            }),
        ),
        other => internal_error(other),
    }
}

fn bad_request(code: &str, message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

fn internal_error<E: std::fmt::Display>(err: E) -> ApiError {
    error!(error = %err, "usage API internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal server error".to_string(),
            code: "internal_error".to_string(),
            details: Some(serde_json::json!({ "message": err.to_string() })),
        }),
    )
}

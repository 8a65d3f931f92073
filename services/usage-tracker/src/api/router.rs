use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::ApiState;

pub fn create_router(state: Arc<ApiState>) -> Router {
    let middleware = ServiceBuilder::new().layer(TraceLayer::new_for_http());

    Router::new()
        .route("/api/usage/events", post(handlers::record_event))
        .route("/api/usage", get(handlers::list_usage))
        .route("/api/usage/summary", get(handlers::usage_summary))
        .route("/api/usage/indicator", get(handlers::usage_indicator))
        .route("/api/usage/reset", post(handlers::reset_usage))
        .route(
            "/api/usage/:model",
            get(handlers::get_usage).put(handlers::override_usage),
        )
        .route("/api/onboarding", post(handlers::onboarding))
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(middleware)
}

//! Timer service routes

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    error::{ApiError, ApiResult},
    labels::parse_timer_from_text,
    middleware::cors_layer,
    models::{
        CreateTimerRequest, DetectRequest, DetectResponse, OkResponse, TimerListResponse,
        TimerResponse,
    },
    state::AppState,
    ws::ws_handler,
};

/// Create the router for the timer service
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v2/timers", post(upsert_timer))
        .route("/api/v2/timers/ws", get(ws_handler))
        .route("/api/v2/timers/detect", post(detect_timer))
        .route("/api/v2/timers/:user_id", get(list_timers))
        .route("/api/v2/timers/:user_id/:timer_id", delete(delete_timer))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = match state.timers.store().health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            warn!("Store health check failed: {}", e);
            false
        }
    };

    Json(json!({
        "status": "ok",
        "service": "timers-service",
        "store": store,
    }))
}

/// List a user's timers with their live remaining time
pub async fn list_timers(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<TimerListResponse>> {
    let now = state.timers.now_ms();
    let timers = state
        .timers
        .get_user_timers(&user_id)
        .await?
        .iter()
        .map(|timer| timer.snapshot(now))
        .collect();

    Ok(Json(TimerListResponse { ok: true, timers }))
}

/// Create or replace a timer
pub async fn upsert_timer(
    State(state): State<AppState>,
    payload: Result<Json<CreateTimerRequest>, JsonRejection>,
) -> ApiResult<Json<TimerResponse>> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let now = state.timers.now_ms();
    let timer = payload.into_timer(now)?;
    state.timers.store_timer(&timer).await?;

    info!(
        "Stored timer {} for user {} ({}, {}s)",
        timer.id, timer.user_id, timer.status, timer.remaining
    );

    state.scheduler.schedule(&timer);
    state.hub.publish(None, &timer.user_id, timer.delta(now));

    Ok(Json(TimerResponse { ok: true, timer }))
}

/// Delete a timer; deleting a missing timer succeeds
pub async fn delete_timer(
    State(state): State<AppState>,
    Path((user_id, timer_id)): Path<(String, String)>,
) -> ApiResult<Json<OkResponse>> {
    state.timers.delete_timer(&user_id, &timer_id).await?;
    state.scheduler.cancel(&user_id, &timer_id);
    Ok(Json(OkResponse::ok()))
}

/// Detect a timer in an instruction text
pub async fn detect_timer(
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> ApiResult<Json<DetectResponse>> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    Ok(Json(DetectResponse {
        ok: true,
        timer: parse_timer_from_text(&payload.text),
    }))
}

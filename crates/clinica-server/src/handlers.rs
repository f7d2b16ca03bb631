use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use clinica_cache::{KeyPattern, MAX_TTL, ResourceCategory, SetOptions};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

use crate::{metrics, server::AppState};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "Clinica Cache",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Cache state for probes. Always 200: a degraded cache does not make the
/// service unready.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.cache.health().await))
}

pub async fn prometheus_metrics() -> Response {
    match metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder is not installed",
        ),
    }
}

pub async fn cache_metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.cache.performance_metrics())
}

// ---- entries ----

pub async fn get_entry(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.cache.get_raw(&key, None).await {
        Some(value) => (StatusCode::OK, Json(value)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, &format!("no cached entry for '{key}'")),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutEntryRequest {
    pub value: Value,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub category: Option<String>,
}

pub async fn put_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(payload): Json<PutEntryRequest>,
) -> Response {
    let category = match payload.category.as_deref().map(str::parse::<ResourceCategory>) {
        None => None,
        Some(Ok(category)) => Some(category),
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, &e),
    };

    if payload.ttl_secs.is_some_and(|secs| secs > MAX_TTL.as_secs()) {
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!("ttlSecs must not exceed {}", MAX_TTL.as_secs()),
        );
    }

    let options = SetOptions {
        ttl: payload.ttl_secs.map(Duration::from_secs),
        category,
    };
    state.cache.set(&key, &payload.value, options).await;
    StatusCode::NO_CONTENT.into_response()
}

pub async fn delete_entry(State(state): State<AppState>, Path(key): Path<String>) -> StatusCode {
    state.cache.invalidate(&key, None).await;
    StatusCode::NO_CONTENT
}

// ---- bulk ----

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    pub pattern: String,
}

pub async fn invalidate(
    State(state): State<AppState>,
    Json(payload): Json<InvalidateRequest>,
) -> Response {
    let pattern = match KeyPattern::compile(&payload.pattern) {
        Ok(pattern) => pattern,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let deleted = state.cache.invalidate_compiled(&pattern).await;
    (StatusCode::OK, Json(json!({ "deleted": deleted }))).into_response()
}

pub async fn clear(State(state): State<AppState>) -> StatusCode {
    state.cache.clear().await;
    StatusCode::NO_CONTENT
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "error": msg }))).into_response()
}

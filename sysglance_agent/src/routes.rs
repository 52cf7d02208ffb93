//! HTTP surface: JSON endpoints for history, processes, control and analysis.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::error::{ApiError, ControlError};
use crate::state::AppState;
use crate::types::PriorityDirection;
use crate::ws::ws_handler;

const INDEX_HTML: &str = include_str!("../static/index.html");

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/processes", get(processes))
        .route("/priority", post(change_priority))
        .route("/kill", post(kill_process))
        .route("/analyze_process/:pid", get(analyze_process))
        .route("/analyze_system", get(analyze_system))
        .route("/system_history", get(system_history))
        .route("/system_stats", get(system_stats))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn processes(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.processes().await?))
}

async fn system_history(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.history())
}

async fn system_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.current().await?))
}

#[derive(Debug, Deserialize)]
struct PriorityRequest {
    pid: Option<i64>,
    action: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KillRequest {
    pid: Option<i64>,
}

/// Missing, zero, negative and oversized PIDs are all "fix your input".
fn required_pid(pid: Option<i64>) -> Result<u32, ControlError> {
    pid.filter(|p| *p > 0)
        .and_then(|p| u32::try_from(p).ok())
        .ok_or_else(|| ControlError::InvalidRequest("PID is required".into()))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ControlError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ControlError::InvalidRequest(format!("invalid request body: {e}")))
}

async fn change_priority(
    State(state): State<AppState>,
    payload: Result<Json<PriorityRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let req = body(payload)?;
    let (pid, action) = match (req.pid, req.action.filter(|a| !a.is_empty())) {
        (Some(pid), Some(action)) => (required_pid(Some(pid))?, action),
        _ => {
            return Err(ControlError::InvalidRequest("PID and action are required".into()).into())
        }
    };
    let direction: PriorityDirection = action.parse().map_err(ControlError::InvalidRequest)?;
    let change = state.adjust_priority(pid, direction).await?;
    Ok(Json(json!({
        "message": format!("Process {pid} priority changed successfully"),
        "previous": change.previous,
        "current": change.current,
    })))
}

async fn kill_process(
    State(state): State<AppState>,
    payload: Result<Json<KillRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let pid = required_pid(body(payload)?.pid)?;
    state.terminate(pid).await?;
    Ok(Json(json!({
        "message": format!("Process {pid} terminated successfully"),
    })))
}

async fn analyze_process(
    State(state): State<AppState>,
    pid: Result<Path<u32>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(pid) =
        pid.map_err(|e| ControlError::InvalidRequest(format!("invalid PID: {e}")))?;
    Ok(Json(state.analyze_process(pid).await?))
}

async fn analyze_system(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.analyze_system().await?))
}

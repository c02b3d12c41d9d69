//! Synchronous REST front end.
//!
//! Reads block until the bridge answers and echo its JSON. Writes are
//! validated, queued, and acknowledged immediately with 202 - the response
//! never waits for the bridge. That asymmetry is deliberate: callers get a
//! low-latency acknowledgement and no write confirmation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use crate::hub::{HubClient, StateCommand};
use crate::queue::SubmittedCommand;
use wick::SessionRegistry;

/// State shared by the REST handlers.
#[derive(Clone)]
pub struct RestState {
    pub hub: Arc<HubClient>,
    pub sessions: Arc<SessionRegistry>,
    pub started: Instant,
}

pub fn router(state: RestState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/lights", get(list_lights))
        .route("/api/lights/{id}", get(get_light))
        .route("/api/lights/{id}/state", put(set_light))
        .route("/api/rooms", get(list_rooms))
        .route("/api/rooms/{id}/state", put(set_room))
        .route("/api/scenes", get(list_scenes))
        .route("/api/scenes/{id}/activate", post(activate_scene))
        .route("/api/house/off", post(house_off))
        .with_state(state)
}

/// Request-scoped failures, mapped onto the REST status vocabulary.
enum ApiError {
    /// Validation failure; nothing reached the queue.
    BadRequest(String),
    /// Credentials unset; nothing was attempted downstream.
    Unconfigured,
    /// The bridge failed, timed out, or answered with a domain error.
    Upstream(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unconfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                "bridge is not configured; run setup first".to_string(),
            ),
            ApiError::Upstream(err) => (StatusCode::BAD_GATEWAY, format!("{:#}", err)),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Upstream(err)
    }
}

fn ensure_configured(state: &RestState) -> Result<(), ApiError> {
    if state.hub.is_configured() {
        Ok(())
    } else {
        Err(ApiError::Unconfigured)
    }
}

fn validated(command: &StateCommand) -> Result<(), ApiError> {
    command
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Detach a queued write: respond now, log the outcome when it settles.
fn fire_and_forget(pending: SubmittedCommand<serde_json::Value>, what: String) -> Response {
    tokio::spawn(async move {
        if let Err(err) = pending.await {
            tracing::warn!(resource = %what, error = %format!("{:#}", err), "Queued write failed");
        }
    });
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response()
}

#[tracing::instrument(skip(state))]
async fn health(State(state): State<RestState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_secs": state.started.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "configured": state.hub.is_configured(),
        "sessions": state.sessions.len(),
    }))
}

async fn list_lights(State(state): State<RestState>) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_configured(&state)?;
    Ok(Json(state.hub.lights().await?))
}

async fn get_light(
    State(state): State<RestState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_configured(&state)?;
    Ok(Json(state.hub.light(&id).await?))
}

#[tracing::instrument(skip(state, command))]
async fn set_light(
    State(state): State<RestState>,
    Path(id): Path<String>,
    Json(command): Json<StateCommand>,
) -> Result<Response, ApiError> {
    ensure_configured(&state)?;
    validated(&command)?;
    let pending = state.hub.set_light(&id, &command)?;
    Ok(fire_and_forget(pending, format!("light {}", id)))
}

async fn list_rooms(State(state): State<RestState>) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_configured(&state)?;
    Ok(Json(state.hub.groups().await?))
}

#[tracing::instrument(skip(state, command))]
async fn set_room(
    State(state): State<RestState>,
    Path(id): Path<String>,
    Json(command): Json<StateCommand>,
) -> Result<Response, ApiError> {
    ensure_configured(&state)?;
    validated(&command)?;
    let pending = state.hub.set_group(&id, &command)?;
    Ok(fire_and_forget(pending, format!("room {}", id)))
}

async fn list_scenes(State(state): State<RestState>) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_configured(&state)?;
    Ok(Json(state.hub.scenes().await?))
}

#[derive(Debug, Default, serde::Deserialize)]
struct ActivateSceneBody {
    room: Option<String>,
}

#[tracing::instrument(skip(state, body))]
async fn activate_scene(
    State(state): State<RestState>,
    Path(id): Path<String>,
    body: Result<Json<ActivateSceneBody>, axum::extract::rejection::JsonRejection>,
) -> Result<Response, ApiError> {
    ensure_configured(&state)?;
    // The body is optional; absence means "resolve the room from the scene".
    let room = body.ok().and_then(|Json(b)| b.room);
    let pending = state.hub.activate_scene(&id, room)?;
    Ok(fire_and_forget(pending, format!("scene {}", id)))
}

#[tracing::instrument(skip(state))]
async fn house_off(State(state): State<RestState>) -> Result<Response, ApiError> {
    ensure_configured(&state)?;
    let pending = state.hub.all_off()?;
    Ok(fire_and_forget(pending, "house off".to_string()))
}

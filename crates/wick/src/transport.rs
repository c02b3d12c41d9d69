//! Streamable HTTP transport.
//!
//! - `POST /` - JSON-RPC request or notification; session id via the
//!   `Mcp-Session-Id` header.
//! - `DELETE /` - terminate the session named by the header.
//!
//! Session rules, enforced here before any dispatch:
//! - no header + `initialize` request: a new session is created and its id
//!   is echoed on the response;
//! - header naming a live session: the request is routed to it;
//! - anything else (unknown id, or no header on a non-initialize message) is
//!   rejected with a JSON-RPC invalid-request error and HTTP 400, creating
//!   nothing.

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::sync::Arc;

use crate::handler::{dispatch, Handler};
use crate::rpc::{ErrorData, JsonRpcMessage};
use crate::session::SessionRegistry;

/// Header carrying the session identifier, both directions.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Shared state for the MCP handlers.
pub struct McpState<H> {
    pub handler: Arc<H>,
    pub sessions: Arc<SessionRegistry>,
    pub server_name: String,
    pub server_version: String,
}

impl<H> McpState<H> {
    pub fn new(handler: H, server_name: impl Into<String>, server_version: impl Into<String>) -> Self {
        Self {
            handler: Arc::new(handler),
            sessions: SessionRegistry::new_shared(),
            server_name: server_name.into(),
            server_version: server_version.into(),
        }
    }

    /// Share an externally owned registry (injected at process startup).
    pub fn with_registry(
        handler: H,
        sessions: Arc<SessionRegistry>,
        server_name: impl Into<String>,
        server_version: impl Into<String>,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            sessions,
            server_name: server_name.into(),
            server_version: server_version.into(),
        }
    }
}

/// Build the transport router. Nest it wherever the endpoint should live.
pub fn router<H>(state: Arc<McpState<H>>) -> axum::Router
where
    H: Handler,
{
    axum::Router::new()
        .route("/", axum::routing::post(post_handler::<H>))
        .route("/", axum::routing::delete(delete_handler::<H>))
        .with_state(state)
}

#[tracing::instrument(skip(state, body), fields(session_id = tracing::field::Empty))]
async fn post_handler<H: Handler>(
    State(state): State<Arc<McpState<H>>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let presented = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    // Id for error envelopes; null when the body never parsed far enough.
    let raw_id = body.get("id").cloned().unwrap_or(Value::Null);

    let message: JsonRpcMessage = match serde_json::from_value(body) {
        Ok(m) => m,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                presented.as_deref(),
                raw_id,
                ErrorData::parse_error(format!("Invalid JSON-RPC: {}", e)),
            );
        }
    };

    // Resolve the session before touching the handler.
    let session_id = match presented {
        Some(id) if state.sessions.touch(&id) => id,
        Some(id) => {
            tracing::warn!(session_id = %id, "Rejected unknown or closed session");
            return error_response(
                StatusCode::BAD_REQUEST,
                None,
                Value::Null,
                ErrorData::invalid_request("Unknown or terminated session"),
            );
        }
        None if message.method == "initialize" && !message.is_notification() => {
            state.sessions.create()
        }
        None => {
            return error_response(
                StatusCode::BAD_REQUEST,
                None,
                Value::Null,
                ErrorData::invalid_request("Missing Mcp-Session-Id header"),
            );
        }
    };
    tracing::Span::current().record("session_id", &session_id);

    if message.is_notification() {
        tracing::debug!(method = %message.method, "Notification");
        return with_session_header(StatusCode::ACCEPTED.into_response(), &session_id);
    }

    let request_id = serde_json::to_value(message.id.as_ref()).unwrap_or(Value::Null);

    let response_json = match dispatch(&state, &session_id, &message).await {
        Ok(result) => serde_json::json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "result": result,
        }),
        Err(error) => {
            let status = if error.code == ErrorData::INTERNAL_ERROR {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::OK
            };
            let body = serde_json::json!({
                "jsonrpc": "2.0",
                "id": request_id,
                "error": error,
            });
            let mut response = Json(body).into_response();
            *response.status_mut() = status;
            return with_session_header(response, &session_id);
        }
    };

    with_session_header(Json(response_json).into_response(), &session_id)
}

#[tracing::instrument(skip(state), fields(session_id = tracing::field::Empty))]
async fn delete_handler<H: Handler>(
    State(state): State<Arc<McpState<H>>>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
    else {
        return (StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header").into_response();
    };
    tracing::Span::current().record("session_id", &session_id);

    if state.sessions.remove(&session_id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::NOT_FOUND, "Unknown session").into_response()
    }
}

fn error_response(
    status: StatusCode,
    session_id: Option<&str>,
    id: Value,
    error: ErrorData,
) -> Response {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": error,
    });
    let mut response = Json(body).into_response();
    *response.status_mut() = status;
    match session_id {
        Some(sid) => with_session_header(response, sid),
        None => response,
    }
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

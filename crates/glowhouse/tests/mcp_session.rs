//! MCP transport integration tests: handshake, session routing, teardown.
//!
//! These spin up a real server and speak JSON-RPC over HTTP with a plain
//! reqwest client, the same way an MCP peer would.

use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use glowhouse::handler::GlowHandler;
use glowhouse::hub::HubClient;

const SESSION_HEADER: &str = "mcp-session-id";

/// Spawn a gateway MCP endpoint with an unconfigured hub (the session
/// machinery under test never needs a bridge).
async fn spawn_mcp_server() -> Result<String> {
    let hub = Arc::new(HubClient::with_base_url(None)?);
    let state = Arc::new(wick::McpState::new(
        GlowHandler::new(hub),
        "glowhouse-test",
        env!("CARGO_PKG_VERSION"),
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let app = axum::Router::new().nest("/mcp", wick::router(state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Ok(format!("http://127.0.0.1:{}/mcp", port))
}

fn initialize_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "1.0" }
        }
    })
}

/// Run the handshake, returning the issued session id.
async fn initialize(client: &reqwest::Client, base: &str) -> Result<String> {
    let response = client.post(base).json(&initialize_body()).send().await?;
    assert_eq!(response.status(), 200);

    let session_id = response
        .headers()
        .get(SESSION_HEADER)
        .expect("initialize response carries a session id")
        .to_str()?
        .to_string();

    let body: Value = response.json().await?;
    assert_eq!(body["result"]["serverInfo"]["name"], "glowhouse-test");
    Ok(session_id)
}

#[tokio::test]
async fn handshake_issues_a_session_and_routes_by_it() -> Result<()> {
    let base = spawn_mcp_server().await?;
    let client = reqwest::Client::new();

    let session_id = timeout(Duration::from_secs(5), initialize(&client, &base))
        .await
        .expect("timeout")?;
    assert!(!session_id.is_empty());

    let response = client
        .post(&base)
        .header(SESSION_HEADER, &session_id)
        .json(&json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }))
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await?;
    let tools = body["result"]["tools"].as_array().expect("tools array");
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert!(names.contains(&"list_lights"));
    assert!(names.contains(&"set_light"));
    Ok(())
}

#[tokio::test]
async fn missing_session_on_non_handshake_is_a_protocol_error() -> Result<()> {
    let base = spawn_mcp_server().await?;
    let client = reqwest::Client::new();

    let response = client
        .post(&base)
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], -32600);
    assert!(body["id"].is_null());
    Ok(())
}

#[tokio::test]
async fn never_issued_session_id_is_rejected_without_side_effects() -> Result<()> {
    let base = spawn_mcp_server().await?;
    let client = reqwest::Client::new();

    // A stale or fabricated id is a hard error even for a handshake.
    let response = client
        .post(&base)
        .header(SESSION_HEADER, "no-such-session")
        .json(&initialize_body())
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], -32600);

    // The rejection created nothing: the same id keeps failing.
    let response = client
        .post(&base)
        .header(SESSION_HEADER, "no-such-session")
        .json(&json!({ "jsonrpc": "2.0", "id": 3, "method": "ping" }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    Ok(())
}

#[tokio::test]
async fn terminated_sessions_stay_dead() -> Result<()> {
    let base = spawn_mcp_server().await?;
    let client = reqwest::Client::new();
    let session_id = initialize(&client, &base).await?;

    let response = client
        .delete(&base)
        .header(SESSION_HEADER, &session_id)
        .send()
        .await?;
    assert_eq!(response.status(), 204);

    // The retired identifier is now unknown, not resurrectable.
    let response = client
        .post(&base)
        .header(SESSION_HEADER, &session_id)
        .json(&json!({ "jsonrpc": "2.0", "id": 4, "method": "tools/list" }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    // Deleting twice reports the gap.
    let response = client
        .delete(&base)
        .header(SESSION_HEADER, &session_id)
        .send()
        .await?;
    assert_eq!(response.status(), 404);
    Ok(())
}

#[tokio::test]
async fn concurrent_handshakes_get_distinct_sessions() -> Result<()> {
    let base = spawn_mcp_server().await?;
    let client = reqwest::Client::new();

    let (a, b, c) = tokio::join!(
        initialize(&client, &base),
        initialize(&client, &base),
        initialize(&client, &base),
    );
    let (a, b, c) = (a?, b?, c?);
    assert_ne!(a, b);
    assert_ne!(b, c);
    assert_ne!(a, c);
    Ok(())
}

#[tokio::test]
async fn notifications_are_accepted_without_a_body() -> Result<()> {
    let base = spawn_mcp_server().await?;
    let client = reqwest::Client::new();
    let session_id = initialize(&client, &base).await?;

    let response = client
        .post(&base)
        .header(SESSION_HEADER, &session_id)
        .json(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .send()
        .await?;
    assert_eq!(response.status(), 202);
    Ok(())
}

#[tokio::test]
async fn unconfigured_hub_surfaces_as_a_tool_error_not_a_fault() -> Result<()> {
    let base = spawn_mcp_server().await?;
    let client = reqwest::Client::new();
    let session_id = initialize(&client, &base).await?;

    let response = client
        .post(&base)
        .header(SESSION_HEADER, &session_id)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "tools/call",
            "params": { "name": "list_lights", "arguments": {} }
        }))
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await?;
    assert_eq!(body["result"]["isError"], true);
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("not configured"));
    Ok(())
}

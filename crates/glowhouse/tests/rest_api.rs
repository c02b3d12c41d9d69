//! REST front-end integration tests against a fake recording bridge.
//!
//! The fake bridge notes every call it receives and tracks how many are in
//! flight at once, which is what lets these tests prove the single-flight
//! guarantee end to end.

use anyhow::Result;
use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::timeout;

use glowhouse::hub::HubClient;
use glowhouse::web::{self, RestState};

/// How long the fake bridge stalls on writes. Large enough that overlapping
/// requests would be caught and that an "immediate" 202 is clearly faster.
const FAKE_WRITE_DELAY: Duration = Duration::from_millis(300);

#[derive(Clone, Default)]
struct FakeBridge {
    calls: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeBridge {
    async fn record(&self, call: String, delay: Duration) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(call);
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn fake_bridge_router(bridge: FakeBridge) -> Router {
    async fn lights(State(bridge): State<FakeBridge>) -> Json<Value> {
        bridge.record("GET lights".into(), Duration::ZERO).await;
        Json(json!({
            "1": { "name": "Desk", "state": { "on": true, "bri": 120 } },
            "2": { "name": "Hallway", "state": { "on": false, "bri": 254 } },
        }))
    }

    async fn scenes(State(bridge): State<FakeBridge>) -> Json<Value> {
        bridge.record("GET scenes".into(), Duration::ZERO).await;
        Json(json!({
            "scene-1": { "name": "Relax", "group": "2" },
        }))
    }

    async fn set_light(
        State(bridge): State<FakeBridge>,
        Path(id): Path<String>,
        Json(_body): Json<Value>,
    ) -> Json<Value> {
        bridge
            .record(format!("PUT lights/{}", id), FAKE_WRITE_DELAY)
            .await;
        Json(json!([{ "success": {} }]))
    }

    async fn group_action(
        State(bridge): State<FakeBridge>,
        Path(id): Path<String>,
        Json(_body): Json<Value>,
    ) -> Json<Value> {
        bridge
            .record(format!("PUT groups/{}", id), Duration::ZERO)
            .await;
        Json(json!([{ "success": {} }]))
    }

    Router::new()
        .route("/api/u/lights", get(lights))
        .route("/api/u/scenes", get(scenes))
        .route("/api/u/lights/{id}/state", put(set_light))
        .route("/api/u/groups/{id}/action", put(group_action))
        .with_state(bridge)
}

/// Bring up a fake bridge and a gateway pointed at it. Returns the gateway's
/// base URL and the fake's recorder.
async fn spawn_gateway() -> Result<(String, FakeBridge)> {
    let bridge = FakeBridge::default();

    let bridge_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let bridge_port = bridge_listener.local_addr()?.port();
    let bridge_app = fake_bridge_router(bridge.clone());
    tokio::spawn(async move {
        axum::serve(bridge_listener, bridge_app).await.unwrap();
    });

    let hub = Arc::new(HubClient::with_base_url(Some(format!(
        "http://127.0.0.1:{}/api/u",
        bridge_port
    )))?);

    spawn_rest(hub).await.map(|url| (url, bridge))
}

async fn spawn_rest(hub: Arc<HubClient>) -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let state = RestState {
        hub,
        sessions: wick::SessionRegistry::new_shared(),
        started: Instant::now(),
    };
    let app = web::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Ok(format!("http://127.0.0.1:{}", port))
}

async fn wait_for_calls(bridge: &FakeBridge, count: usize) {
    timeout(Duration::from_secs(3), async {
        loop {
            if bridge.calls().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("fake bridge never saw the expected calls");
}

#[tokio::test]
async fn simultaneous_writes_ack_immediately_and_run_one_after_the_other() -> Result<()> {
    let (base, bridge) = spawn_gateway().await?;
    let client = reqwest::Client::new();

    let started = Instant::now();
    let (a, b) = tokio::join!(
        client
            .put(format!("{}/api/lights/1/state", base))
            .json(&json!({ "on": true, "brightness": 0.5 }))
            .send(),
        client
            .put(format!("{}/api/lights/2/state", base))
            .json(&json!({ "on": false }))
            .send(),
    );
    let elapsed = started.elapsed();

    let a = a?;
    let b = b?;
    assert_eq!(a.status(), 202);
    assert_eq!(b.status(), 202);
    assert_eq!(a.json::<Value>().await?["status"], "accepted");

    // Fire-and-forget: both acknowledgements landed while the fake bridge
    // was still stalling on the first write.
    assert!(
        elapsed < FAKE_WRITE_DELAY,
        "writes should not wait for the bridge, took {:?}",
        elapsed
    );

    wait_for_calls(&bridge, 2).await;
    // Give the second write time to finish its stall, then check overlap.
    tokio::time::sleep(FAKE_WRITE_DELAY + Duration::from_millis(50)).await;

    let calls = bridge.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.starts_with("PUT lights/")));
    assert_eq!(
        bridge.max_in_flight.load(Ordering::SeqCst),
        1,
        "downstream writes overlapped"
    );
    Ok(())
}

#[tokio::test]
async fn reads_block_and_echo_bridge_json() -> Result<()> {
    let (base, bridge) = spawn_gateway().await?;

    let body: Value = reqwest::get(format!("{}/api/lights", base))
        .await?
        .json()
        .await?;

    assert_eq!(body["1"]["name"], "Desk");
    assert_eq!(body["2"]["state"]["bri"], 254);
    assert_eq!(bridge.calls(), vec!["GET lights".to_string()]);
    Ok(())
}

#[tokio::test]
async fn validation_failures_never_reach_the_bridge() -> Result<()> {
    let (base, bridge) = spawn_gateway().await?;
    let client = reqwest::Client::new();

    // Colour temperature is clamped by the hub layer but rejected here.
    let response = client
        .put(format!("{}/api/lights/1/state", base))
        .json(&json!({ "colorTemp": 9999 }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert!(body["error"].as_str().unwrap().contains("colorTemp"));

    let response = client
        .put(format!("{}/api/lights/1/state", base))
        .json(&json!({ "color": "not-a-color" }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    let response = client
        .put(format!("{}/api/lights/1/state", base))
        .json(&json!({ "brightness": 1.5 }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bridge.calls().is_empty(), "rejected writes were enqueued");
    Ok(())
}

#[tokio::test]
async fn scene_activation_resolves_the_owning_room_in_one_slot() -> Result<()> {
    let (base, bridge) = spawn_gateway().await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/scenes/scene-1/activate", base))
        .send()
        .await?;
    assert_eq!(response.status(), 202);

    wait_for_calls(&bridge, 2).await;
    assert_eq!(
        bridge.calls(),
        vec!["GET scenes".to_string(), "PUT groups/2".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn unconfigured_gateway_returns_service_unavailable() -> Result<()> {
    let hub = Arc::new(HubClient::with_base_url(None)?);
    let base = spawn_rest(hub).await?;
    let client = reqwest::Client::new();

    let read = reqwest::get(format!("{}/api/lights", base)).await?;
    assert_eq!(read.status(), 503);

    let write = client
        .put(format!("{}/api/lights/1/state", base))
        .json(&json!({ "on": true }))
        .send()
        .await?;
    assert_eq!(write.status(), 503);

    // Health still answers; it reports the gap instead of failing.
    let health: Value = reqwest::get(format!("{}/health", base)).await?.json().await?;
    assert_eq!(health["configured"], false);
    Ok(())
}

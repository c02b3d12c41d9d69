//! Bridge discovery and token issuance.
//!
//! Both steps are collaborators of the gateway proper: discovery queries the
//! vendor's public endpoint for bridges on this network, and registration
//! performs the button-press-gated handshake that issues the application
//! username the serving paths require. Neither is ever called while serving.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const DISCOVERY_URL: &str = "https://discovery.meethue.com";

/// Bridge domain error raised until the physical link button is pressed.
const LINK_BUTTON_NOT_PRESSED: u64 = 101;

const REGISTER_RETRY_DELAY: Duration = Duration::from_secs(2);

/// A bridge advertised for this network.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveredBridge {
    pub id: String,
    #[serde(rename = "internalipaddress")]
    pub ip: String,
}

/// Ask the discovery endpoint which bridges live on this network.
pub async fn discover() -> Result<Vec<DiscoveredBridge>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build discovery HTTP client")?;

    let bridges: Vec<DiscoveredBridge> = http
        .get(DISCOVERY_URL)
        .send()
        .await
        .context("Bridge discovery request failed")?
        .json()
        .await
        .context("Bridge discovery returned invalid JSON")?;

    Ok(bridges)
}

/// Request an application username from the bridge at `ip`.
///
/// The bridge refuses with error 101 until someone presses its link button;
/// we poll for up to `attempts` rounds, a couple of seconds apart, so the
/// user has time to walk over and press it.
pub async fn register(ip: &str, device_name: &str, attempts: u32) -> Result<String> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .danger_accept_invalid_certs(true)
        .build()
        .context("Failed to build registration HTTP client")?;

    let url = format!("https://{}/api", ip);
    let body = json!({ "devicetype": format!("glowhouse#{}", device_name) });

    for attempt in 1..=attempts {
        let response: Value = http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Registration request failed")?
            .json()
            .await
            .context("Registration returned invalid JSON")?;

        if let Some(username) = response
            .get(0)
            .and_then(|item| item.get("success"))
            .and_then(|s| s.get("username"))
            .and_then(Value::as_str)
        {
            tracing::info!(bridge = %ip, "Bridge issued a username");
            return Ok(username.to_string());
        }

        let error_type = response
            .get(0)
            .and_then(|item| item.get("error"))
            .and_then(|e| e.get("type"))
            .and_then(Value::as_u64);

        if error_type == Some(LINK_BUTTON_NOT_PRESSED) {
            tracing::info!(
                attempt,
                attempts,
                "Waiting for the bridge link button to be pressed"
            );
            tokio::time::sleep(REGISTER_RETRY_DELAY).await;
            continue;
        }

        bail!("bridge refused registration: {}", response);
    }

    bail!("link button was not pressed in time")
}

//! Bridge HTTP client.
//!
//! Wraps every downstream call, read or write, in the shared
//! [`CommandQueue`] so the bridge only ever sees one request at a time.
//! Translates between semantic units (fractions, CSS colour text, seconds)
//! and the bridge's native integer ranges, clamping rather than rejecting -
//! range policing for callers happens at the front-end boundaries, not here.
//!
//! Resource identifiers (lights, groups, scenes) are opaque strings assigned
//! by the bridge. Nothing is cached; every read re-fetches.

pub mod setup;

use anyhow::{bail, Context, Result};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::color;
use crate::queue::{CommandQueue, SubmittedCommand};

/// Native brightness range. Zero is not a legal wire value.
const BRIGHTNESS_MIN: u8 = 1;
const BRIGHTNESS_MAX: u8 = 254;

/// Native colour temperature range in mireds.
pub const COLOR_TEMP_MIN: u32 = 153;
pub const COLOR_TEMP_MAX: u32 = 500;

/// The bridge's built-in group addressing every light.
const ALL_LIGHTS_GROUP: &str = "0";

/// How long any single bridge call may take before it fails on its own.
const BRIDGE_TIMEOUT: Duration = Duration::from_secs(5);

/// A desired state change in semantic units, as accepted by both front ends.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StateCommand {
    /// Power the light(s) on or off.
    pub on: Option<bool>,
    /// Brightness as a 0..=1 fraction.
    pub brightness: Option<f64>,
    /// CSS colour text: a name, hex, or rgb()/hsl() form.
    pub color: Option<String>,
    /// Colour temperature in mireds (153 warm limit .. 500 cool limit).
    pub color_temp: Option<u32>,
    /// Hue as a 0..=1 fraction of the colour wheel.
    pub hue: Option<f64>,
    /// Saturation as a 0..=1 fraction.
    pub saturation: Option<f64>,
    /// Transition duration in seconds.
    pub transition_time: Option<f64>,
}

/// Why a command was refused at a boundary. The hub layer itself clamps
/// instead; this is for the front ends, which reject.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("color {0:?} does not parse as a CSS color")]
    BadColor(String),
    #[error("brightness {0} is outside 0..=1")]
    BadBrightness(f64),
    #[error("colorTemp {0} is outside {COLOR_TEMP_MIN}..={COLOR_TEMP_MAX} mireds")]
    BadColorTemp(u32),
    #[error("hue {0} is outside 0..=1")]
    BadHue(f64),
    #[error("saturation {0} is outside 0..=1")]
    BadSaturation(f64),
    #[error("transitionTime {0} is negative")]
    BadTransition(f64),
    #[error("no fields to apply")]
    Empty,
}

impl StateCommand {
    /// Boundary validation: reject out-of-range input instead of clamping.
    pub fn validate(&self) -> Result<(), CommandError> {
        if let Some(color) = &self.color {
            if color::parse_css(color).is_none() {
                return Err(CommandError::BadColor(color.clone()));
            }
        }
        if let Some(b) = self.brightness {
            if !(0.0..=1.0).contains(&b) {
                return Err(CommandError::BadBrightness(b));
            }
        }
        if let Some(ct) = self.color_temp {
            if !(COLOR_TEMP_MIN..=COLOR_TEMP_MAX).contains(&ct) {
                return Err(CommandError::BadColorTemp(ct));
            }
        }
        if let Some(h) = self.hue {
            if !(0.0..=1.0).contains(&h) {
                return Err(CommandError::BadHue(h));
            }
        }
        if let Some(s) = self.saturation {
            if !(0.0..=1.0).contains(&s) {
                return Err(CommandError::BadSaturation(s));
            }
        }
        if let Some(t) = self.transition_time {
            if t < 0.0 {
                return Err(CommandError::BadTransition(t));
            }
        }
        if self.is_empty() {
            return Err(CommandError::Empty);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.on.is_none()
            && self.brightness.is_none()
            && self.color.is_none()
            && self.color_temp.is_none()
            && self.hue.is_none()
            && self.saturation.is_none()
            && self.transition_time.is_none()
    }
}

/// Scale a 0..=1 brightness fraction to the native range. 0 maps to the
/// floor of 1, 1.0 to exactly 254.
pub fn brightness_to_native(fraction: f64) -> u8 {
    let scaled = (fraction.clamp(0.0, 1.0) * BRIGHTNESS_MAX as f64).round() as u8;
    scaled.max(BRIGHTNESS_MIN)
}

/// Clamp mireds into the bridge's supported band.
pub fn clamp_color_temp(mireds: u32) -> u32 {
    mireds.clamp(COLOR_TEMP_MIN, COLOR_TEMP_MAX)
}

/// Scale a 0..=1 hue fraction to the native 16-bit wheel.
pub fn hue_to_native(fraction: f64) -> u16 {
    (fraction.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// Scale a 0..=1 saturation fraction to the native range.
pub fn saturation_to_native(fraction: f64) -> u8 {
    (fraction.clamp(0.0, 1.0) * 254.0).round() as u8
}

/// Seconds to the bridge's deciseconds.
fn transition_to_native(seconds: f64) -> u64 {
    (seconds.max(0.0) * 10.0).round() as u64
}

/// Client for one bridge. Cheap to share behind an `Arc`; both front ends
/// hold the same instance and therefore the same queue.
pub struct HubClient {
    http: reqwest::Client,
    queue: CommandQueue,
    /// `{scheme}://{ip}/api/{username}` once credentials exist.
    base_url: Option<String>,
}

impl HubClient {
    /// Build a client for the bridge at `ip` with an issued `username`.
    /// The bridge serves HTTPS with a self-signed certificate, so
    /// verification is relaxed; the fixed timeout bounds every call.
    pub fn new(ip: Option<&str>, username: Option<&str>) -> Result<Self> {
        let base_url = match (ip, username) {
            (Some(ip), Some(username)) => Some(format!("https://{}/api/{}", ip, username)),
            _ => None,
        };
        Self::with_base_url(base_url)
    }

    /// Point the client at an explicit base URL (tests use plain HTTP here).
    pub fn with_base_url(base_url: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(BRIDGE_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to build bridge HTTP client")?;

        Ok(Self {
            http,
            queue: CommandQueue::new(),
            base_url,
        })
    }

    /// Whether credentials were present at startup.
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    fn target(&self) -> Result<String> {
        self.base_url
            .clone()
            .context("bridge is not configured; run setup first")
    }

    // --- reads (synchronous through the queue) ---

    pub async fn lights(&self) -> Result<Value> {
        self.fetch("lights").await
    }

    pub async fn light(&self, id: &str) -> Result<Value> {
        self.fetch(&format!("lights/{}", id)).await
    }

    pub async fn groups(&self) -> Result<Value> {
        self.fetch("groups").await
    }

    pub async fn scenes(&self) -> Result<Value> {
        self.fetch("scenes").await
    }

    async fn fetch(&self, path: &str) -> Result<Value> {
        let base = self.target()?;
        let http = self.http.clone();
        let path = path.to_string();
        self.queue
            .run(async move { get_json(&http, &base, &path).await })
            .await
    }

    // --- writes (queued synchronously, settle later) ---

    /// Queue a state write to one light. The returned handle settles when
    /// the bridge answers; dropping it leaves the write in its queue slot.
    pub fn set_light(&self, id: &str, command: &StateCommand) -> Result<SubmittedCommand<Value>> {
        let body = native_state(command)?;
        self.put(format!("lights/{}/state", id), body)
    }

    /// Queue a state write to a group (a room, or "0" for the whole house).
    pub fn set_group(&self, id: &str, command: &StateCommand) -> Result<SubmittedCommand<Value>> {
        let body = native_state(command)?;
        self.put(format!("groups/{}/action", id), body)
    }

    /// Queue an everything-off command via the built-in all-lights group.
    pub fn all_off(&self) -> Result<SubmittedCommand<Value>> {
        self.put(
            format!("groups/{}/action", ALL_LIGHTS_GROUP),
            json!({ "on": false }),
        )
    }

    /// Queue a scene activation. Without an explicit group the owning group
    /// is resolved from the scene list inside the same queue slot as the
    /// activation, so no other command can interleave between the lookup and
    /// the write. Resolution falling through lands on the all-lights group.
    pub fn activate_scene(
        &self,
        scene: &str,
        group: Option<String>,
    ) -> Result<SubmittedCommand<Value>> {
        let base = self.target()?;
        let http = self.http.clone();
        let scene = scene.to_string();

        Ok(self.queue.submit(async move {
            let group_id = match group {
                Some(g) => g,
                None => {
                    let scenes = get_json(&http, &base, "scenes").await?;
                    match scenes.get(&scene).and_then(|s| s.get("group")).and_then(Value::as_str) {
                        Some(g) => g.to_string(),
                        None => {
                            tracing::warn!(scene = %scene, "Scene group not resolved, using all-lights group");
                            ALL_LIGHTS_GROUP.to_string()
                        }
                    }
                }
            };
            put_json(
                &http,
                &base,
                &format!("groups/{}/action", group_id),
                json!({ "scene": scene }),
            )
            .await
        }))
    }

    fn put(&self, path: String, body: Value) -> Result<SubmittedCommand<Value>> {
        let base = self.target()?;
        let http = self.http.clone();
        Ok(self
            .queue
            .submit(async move { put_json(&http, &base, &path, body).await }))
    }
}

/// Lower a semantic command to the bridge's wire body. Numeric ranges clamp;
/// colour text that does not parse is the one thing refused here, since
/// there is nothing sensible to clamp it to.
fn native_state(command: &StateCommand) -> Result<Value> {
    let mut body = Map::new();

    if let Some(on) = command.on {
        body.insert("on".into(), json!(on));
    }
    if let Some(fraction) = command.brightness {
        body.insert("bri".into(), json!(brightness_to_native(fraction)));
    }
    if let Some(text) = &command.color {
        let xy = color::translate(text)
            .with_context(|| format!("color {:?} does not parse as a CSS color", text))?;
        body.insert("xy".into(), json!([xy.x, xy.y]));
        body.insert("bri".into(), json!(xy.brightness));
    }
    if let Some(mireds) = command.color_temp {
        body.insert("ct".into(), json!(clamp_color_temp(mireds)));
    }
    if let Some(hue) = command.hue {
        body.insert("hue".into(), json!(hue_to_native(hue)));
    }
    if let Some(sat) = command.saturation {
        body.insert("sat".into(), json!(saturation_to_native(sat)));
    }
    if let Some(seconds) = command.transition_time {
        body.insert("transitiontime".into(), json!(transition_to_native(seconds)));
    }

    Ok(Value::Object(body))
}

async fn get_json(http: &reqwest::Client, base: &str, path: &str) -> Result<Value> {
    let url = format!("{}/{}", base, path);
    let response = http
        .get(&url)
        .send()
        .await
        .with_context(|| format!("GET {} failed", path))?;

    if !response.status().is_success() {
        bail!("bridge returned {} for GET {}", response.status(), path);
    }

    let value: Value = response
        .json()
        .await
        .with_context(|| format!("GET {} returned invalid JSON", path))?;
    check_bridge_error(&value)?;
    Ok(value)
}

async fn put_json(http: &reqwest::Client, base: &str, path: &str, body: Value) -> Result<Value> {
    let url = format!("{}/{}", base, path);
    let response = http
        .put(&url)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("PUT {} failed", path))?;

    if !response.status().is_success() {
        bail!("bridge returned {} for PUT {}", response.status(), path);
    }

    let value: Value = response
        .json()
        .await
        .with_context(|| format!("PUT {} returned invalid JSON", path))?;
    check_bridge_error(&value)?;
    Ok(value)
}

/// The bridge reports domain errors inside a 200 response:
/// `[{"error": {"type": N, "description": "..."}}]`.
fn check_bridge_error(value: &Value) -> Result<()> {
    if let Some(items) = value.as_array() {
        for item in items {
            if let Some(error) = item.get("error") {
                let description = error
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown bridge error");
                let kind = error.get("type").and_then(Value::as_u64).unwrap_or(0);
                bail!("bridge error {}: {}", kind, description);
            }
        }
    }
    Ok(())
}

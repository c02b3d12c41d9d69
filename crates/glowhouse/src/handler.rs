//! MCP tool surface over the hub client.
//!
//! Tool calls are synchronous per call: the downstream command runs to
//! settlement before the result goes back to the peer. Domain and validation
//! failures are reported in-band as error results, never as protocol faults.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use wick::{CallToolResult, ErrorData, Tool};

use crate::hub::{HubClient, StateCommand};

#[derive(Debug, Deserialize, JsonSchema)]
struct LightTarget {
    /// Bridge-assigned light id.
    light: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SetLightRequest {
    /// Bridge-assigned light id.
    light: String,
    #[serde(flatten)]
    state: StateCommand,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SetRoomRequest {
    /// Bridge-assigned room (group) id.
    room: String,
    #[serde(flatten)]
    state: StateCommand,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ActivateSceneRequest {
    /// Bridge-assigned scene id.
    scene: String,
    /// Room to apply the scene to; resolved from the scene itself if omitted.
    room: Option<String>,
}

/// The gateway's tool handler. Shares the hub client (and so the command
/// queue) with the REST front end.
pub struct GlowHandler {
    hub: Arc<HubClient>,
}

impl GlowHandler {
    pub fn new(hub: Arc<HubClient>) -> Self {
        Self { hub }
    }

    fn configured(&self) -> Result<(), CallToolResult> {
        if self.hub.is_configured() {
            Ok(())
        } else {
            Err(CallToolResult::error(
                "bridge is not configured; run `glowhouse setup` first",
            ))
        }
    }
}

#[async_trait]
impl wick::Handler for GlowHandler {
    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool::new("list_lights", "List every light the bridge knows about").read_only(),
            Tool::new("get_light", "Fetch one light's current state")
                .read_only()
                .with_input_schema::<LightTarget>(),
            Tool::new(
                "set_light",
                "Change a light: on/off, brightness (0..1), CSS color, \
                 color temperature in mireds, transition in seconds",
            )
            .with_input_schema::<SetLightRequest>(),
            Tool::new("list_rooms", "List rooms (light groups)").read_only(),
            Tool::new("set_room", "Change every light in a room at once")
                .with_input_schema::<SetRoomRequest>(),
            Tool::new("list_scenes", "List preset scenes").read_only(),
            Tool::new("activate_scene", "Apply a preset scene to its room")
                .with_input_schema::<ActivateSceneRequest>(),
            Tool::new("lights_off", "Turn every light in the house off").idempotent(),
        ]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, ErrorData> {
        if let Err(unconfigured) = self.configured() {
            return Ok(unconfigured);
        }

        let result = match name {
            "list_lights" => self.hub.lights().await.map(|v| CallToolResult::json(&v)),
            "get_light" => {
                let request: LightTarget = parse_args(arguments)?;
                self.hub
                    .light(&request.light)
                    .await
                    .map(|v| CallToolResult::json(&v))
            }
            "set_light" => {
                let request: SetLightRequest = parse_args(arguments)?;
                if let Err(err) = request.state.validate() {
                    return Ok(CallToolResult::error(err.to_string()));
                }
                match self.hub.set_light(&request.light, &request.state) {
                    Ok(pending) => pending
                        .await
                        .map(|_| CallToolResult::text(format!("Updated light {}", request.light))),
                    Err(err) => Err(err),
                }
            }
            "list_rooms" => self.hub.groups().await.map(|v| CallToolResult::json(&v)),
            "set_room" => {
                let request: SetRoomRequest = parse_args(arguments)?;
                if let Err(err) = request.state.validate() {
                    return Ok(CallToolResult::error(err.to_string()));
                }
                match self.hub.set_group(&request.room, &request.state) {
                    Ok(pending) => pending
                        .await
                        .map(|_| CallToolResult::text(format!("Updated room {}", request.room))),
                    Err(err) => Err(err),
                }
            }
            "list_scenes" => self.hub.scenes().await.map(|v| CallToolResult::json(&v)),
            "activate_scene" => {
                let request: ActivateSceneRequest = parse_args(arguments)?;
                match self.hub.activate_scene(&request.scene, request.room) {
                    Ok(pending) => pending
                        .await
                        .map(|_| CallToolResult::text(format!("Activated scene {}", request.scene))),
                    Err(err) => Err(err),
                }
            }
            "lights_off" => match self.hub.all_off() {
                Ok(pending) => pending
                    .await
                    .map(|_| CallToolResult::text("All lights off")),
                Err(err) => Err(err),
            },
            other => return Err(ErrorData::tool_not_found(other)),
        };

        // Downstream failures are tool-level errors, not protocol errors.
        Ok(result.unwrap_or_else(|err| CallToolResult::error(format!("{:#}", err))))
    }

    fn instructions(&self) -> Option<String> {
        Some(
            "Glowhouse controls the lights in this house through the local \
             bridge. List lights or rooms first to learn their ids; colors \
             accept any CSS form (names, hex, rgb(), hsl())."
                .to_string(),
        )
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, ErrorData> {
    serde_json::from_value(arguments).map_err(|e| ErrorData::invalid_params(e.to_string()))
}

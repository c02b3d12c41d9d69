//! MCP protocol types: handshake, capabilities, tools, and result content.
//!
//! A trimmed projection of the MCP 2025-06-18 schema - this library serves
//! tools only, so the resource/prompt/sampling surfaces are absent.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The protocol revision this library speaks.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Server or client implementation info.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Implementation {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Implementation {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Initialize request params from the client.
///
/// Client capabilities are accepted but not negotiated over - this server
/// never initiates requests toward the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    pub client_info: Implementation,
}

/// Initialize result returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: Implementation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl InitializeResult {
    pub fn new(server_info: Implementation, capabilities: ServerCapabilities) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities,
            server_info,
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// What the server offers. Tools, here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

impl ServerCapabilities {
    pub fn with_tools() -> Self {
        Self {
            tools: Some(ToolsCapability::default()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// A tool definition advertised via `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: ToolSchema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: Some(description.into()),
            input_schema: ToolSchema::empty(),
            annotations: None,
        }
    }

    /// Derive the input schema from a request struct.
    pub fn with_input_schema<T: JsonSchema>(mut self) -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        self.input_schema = ToolSchema::from_value(schema);
        self
    }

    /// Mark this tool as not modifying state.
    pub fn read_only(mut self) -> Self {
        self.annotations = Some(self.annotations.unwrap_or_default().with_read_only(true));
        self
    }

    /// Mark repeated calls as having no additional effect.
    pub fn idempotent(mut self) -> Self {
        self.annotations = Some(self.annotations.unwrap_or_default().with_idempotent(true));
        self
    }
}

/// JSON Schema wrapper for tool inputs. Always an object schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl ToolSchema {
    /// A schema with no parameters.
    pub fn empty() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: None,
            required: None,
        }
    }

    /// Extract the object shape from an arbitrary schema value.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(map) = value else {
            return Self::empty();
        };
        Self {
            schema_type: map
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("object")
                .to_string(),
            properties: map.get("properties").and_then(|v| match v {
                Value::Object(props) => Some(props.clone()),
                _ => None,
            }),
            required: map.get("required").and_then(|v| match v {
                Value::Array(arr) => Some(
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect(),
                ),
                _ => None,
            }),
        }
    }
}

impl Default for ToolSchema {
    fn default() -> Self {
        Self::empty()
    }
}

/// Tool behavior hints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
}

impl ToolAnnotations {
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only_hint = Some(read_only);
        self
    }

    pub fn with_idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent_hint = Some(idempotent);
        self
    }
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,
}

/// Content block in a tool result. Text is the only kind this server emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text { text: String },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
        }
    }
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
            structured_content: None,
        }
    }

    /// A result carrying machine-readable JSON alongside its text rendering.
    pub fn json(value: &Value) -> Self {
        Self {
            content: vec![Content::text(
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
            )],
            is_error: false,
            structured_content: Some(value.clone()),
        }
    }

    /// A tool-level failure. Reported in-band, not as a protocol error.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
            structured_content: None,
        }
    }
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl ListToolsResult {
    /// All tools in one page.
    pub fn all(tools: Vec<Tool>) -> Self {
        Self {
            tools,
            next_cursor: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct DemoRequest {
        light: String,
        brightness: Option<f64>,
    }

    #[test]
    fn tool_serializes_camel_case() {
        let tool = Tool::new("list_lights", "List all lights").read_only();
        let json = serde_json::to_value(&tool).unwrap();
        assert_eq!(json["name"], "list_lights");
        assert_eq!(json["inputSchema"]["type"], "object");
        assert_eq!(json["annotations"]["readOnlyHint"], true);
    }

    #[test]
    fn input_schema_from_struct() {
        let tool = Tool::new("demo", "Demo").with_input_schema::<DemoRequest>();
        let props = tool.input_schema.properties.expect("has properties");
        assert!(props.contains_key("light"));
        assert!(props.contains_key("brightness"));
        assert_eq!(
            tool.input_schema.required,
            Some(vec!["light".to_string()])
        );
    }

    #[test]
    fn call_result_error_flag() {
        let ok = CallToolResult::text("done");
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("isError").is_none());

        let err = CallToolResult::error("no such light");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["isError"], true);
    }

    #[test]
    fn initialize_result_shape() {
        let result = InitializeResult::new(
            Implementation::new("glowhouse", "0.1.0"),
            ServerCapabilities::with_tools(),
        )
        .with_instructions("Controls the lights.");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(json["serverInfo"]["name"], "glowhouse");
        assert!(json["capabilities"]["tools"].is_object());
    }

    #[test]
    fn initialize_params_tolerate_missing_capabilities() {
        let params: InitializeParams = serde_json::from_value(json!({
            "protocolVersion": "2025-06-18",
            "clientInfo": { "name": "test-client", "version": "1.0" }
        }))
        .unwrap();
        assert_eq!(params.client_info.name, "test-client");
    }
}

//! The `Handler` trait and JSON-RPC method dispatch.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::rpc::{ErrorData, JsonRpcMessage};
use crate::transport::McpState;
use crate::types::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    ListToolsResult, ServerCapabilities, Tool,
};

/// Implemented by the application to expose its tools.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// The tools this server advertises.
    fn tools(&self) -> Vec<Tool>;

    /// Execute one tool call. Domain failures belong in
    /// [`CallToolResult::error`]; an `Err` here becomes a protocol error.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, ErrorData>;

    /// Instructions surfaced to the peer's model, if any.
    fn instructions(&self) -> Option<String> {
        None
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities::with_tools()
    }
}

/// Route a request to its method handler. The transport has already resolved
/// `session_id` to a live session.
pub async fn dispatch<H: Handler>(
    state: &Arc<McpState<H>>,
    session_id: &str,
    message: &JsonRpcMessage,
) -> Result<Value, ErrorData> {
    match message.method.as_str() {
        "initialize" => handle_initialize(state, session_id, message).await,
        "ping" => Ok(serde_json::json!({})),
        "tools/list" => {
            let result = ListToolsResult::all(state.handler.tools());
            to_result_value(&result)
        }
        "tools/call" => handle_call_tool(state, session_id, message).await,
        other => Err(ErrorData::method_not_found(other)),
    }
}

async fn handle_initialize<H: Handler>(
    state: &Arc<McpState<H>>,
    session_id: &str,
    message: &JsonRpcMessage,
) -> Result<Value, ErrorData> {
    let params: InitializeParams = parse_params(message, "initialize")?;

    state.sessions.set_initialized(session_id, params.client_info);

    let mut result = InitializeResult::new(
        Implementation::new(&state.server_name, &state.server_version),
        state.handler.capabilities(),
    );
    if let Some(instructions) = state.handler.instructions() {
        result = result.with_instructions(instructions);
    }

    to_result_value(&result)
}

async fn handle_call_tool<H: Handler>(
    state: &Arc<McpState<H>>,
    session_id: &str,
    message: &JsonRpcMessage,
) -> Result<Value, ErrorData> {
    let params: CallToolParams = parse_params(message, "tools/call")?;

    let arguments = params
        .arguments
        .map(Value::Object)
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    tracing::info!(
        session_id = %session_id,
        tool = %params.name,
        "Tool call"
    );

    let result = state.handler.call_tool(&params.name, arguments).await?;
    to_result_value(&result)
}

fn parse_params<T: serde::de::DeserializeOwned>(
    message: &JsonRpcMessage,
    method: &str,
) -> Result<T, ErrorData> {
    message
        .params
        .as_ref()
        .map(|p| serde_json::from_value(p.clone()))
        .transpose()
        .map_err(|e| ErrorData::invalid_params(format!("Invalid {} params: {}", method, e)))?
        .ok_or_else(|| ErrorData::invalid_params(format!("Missing {} params", method)))
}

fn to_result_value<T: serde::Serialize>(value: &T) -> Result<Value, ErrorData> {
    serde_json::to_value(value)
        .map_err(|e| ErrorData::internal_error(format!("Failed to serialize result: {}", e)))
}

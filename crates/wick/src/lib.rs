//! wick - a small MCP (Model Context Protocol) server library
//!
//! Implements the subset of MCP 2025-06-18 needed to expose tools over the
//! Streamable HTTP transport with axum: JSON-RPC 2.0 envelopes, the
//! initialize handshake, tool listing and invocation, and strict session
//! lifecycle tracking via the `Mcp-Session-Id` header.
//!
//! Sessions are created exactly once, by an `initialize` request that carries
//! no session header. A request presenting an identifier this server never
//! issued - or one that has been terminated - is a protocol error; identifiers
//! are never resurrected.
//!
//! # Example
//!
//! ```rust,ignore
//! use wick::{Handler, Tool, CallToolResult};
//! use async_trait::async_trait;
//!
//! struct MyHandler;
//!
//! #[async_trait]
//! impl Handler for MyHandler {
//!     fn tools(&self) -> Vec<Tool> {
//!         vec![Tool::new("hello", "Say hello")]
//!     }
//!
//!     async fn call_tool(&self, _name: &str, _args: serde_json::Value)
//!         -> Result<CallToolResult, wick::ErrorData>
//!     {
//!         Ok(CallToolResult::text("Hello!"))
//!     }
//! }
//!
//! let state = std::sync::Arc::new(wick::McpState::new(MyHandler, "my-server", "0.1.0"));
//! let router = wick::router(state);
//! ```

pub mod handler;
pub mod rpc;
pub mod session;
pub mod transport;
pub mod types;

pub use handler::Handler;
pub use rpc::{ErrorData, JsonRpcMessage, RequestId};
pub use session::{spawn_cleanup_task, Session, SessionRegistry};
pub use transport::{router, McpState, SESSION_HEADER};
pub use types::{
    CallToolParams, CallToolResult, Content, Implementation, InitializeParams, InitializeResult,
    ListToolsResult, ServerCapabilities, Tool, ToolAnnotations, ToolSchema, PROTOCOL_VERSION,
};

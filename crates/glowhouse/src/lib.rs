//! Glowhouse: a dual-front-end gateway for a local lighting bridge.
//!
//! One process, two faces: an MCP tool server (Streamable HTTP, sessions via
//! `Mcp-Session-Id`) and a plain REST surface. Both drive the same
//! [`hub::HubClient`], whose single command queue keeps the bridge to one
//! in-flight request at a time.

pub mod color;
pub mod config;
pub mod handler;
pub mod hub;
pub mod queue;
pub mod web;

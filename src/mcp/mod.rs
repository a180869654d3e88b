//! MCP (Model Context Protocol) server implementation
//!
//! JSON-RPC 2.0 over the Streamable-HTTP transport, with stdio kept as an
//! alternate transport for local tool integrations.

pub mod protocol;
pub mod resources;
pub mod session;
pub mod task;
pub mod tools;
pub mod transport;

pub use protocol::{
    methods, InitializeResult, McpError, McpHandler, McpRequest, McpResponse, McpServer,
    ToolCallResult, ToolContent,
};

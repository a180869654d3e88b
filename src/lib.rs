//! Athenaeum - multi-protocol AI-assisted book-analysis server
//!
//! Hybrid lexical+vector retrieval over chunked book text, a streaming
//! response broker (SSE/WebSocket/MCP), a conversation store with
//! compaction, a two-tier response cache, and an MCP JSON-RPC endpoint.

pub mod cache;
pub mod chunker;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod http;
pub mod library;
pub mod mcp;
pub mod prompt;
pub mod retrieval;
pub mod state;
pub mod streaming;
pub mod types;
pub mod upstream;

pub use error::{AthenaeumError, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! MCP tool registry (spec §4.6 "Tools supplied by the core").

use serde_json::Value;

use crate::error::{AthenaeumError, Result};
use crate::mcp::protocol::{ToolCallResult, ToolDefinition};
use crate::retrieval;
use crate::state::AppState;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "list_books".to_string(),
            description: "List books available in the configured books directory".to_string(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        },
        ToolDefinition {
            name: "select_book".to_string(),
            description: "Select a book (by file stem) for this session".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "book": { "type": "string" } },
                "required": ["book"]
            }),
        },
        ToolDefinition {
            name: "get_book_info".to_string(),
            description: "Return metadata for the currently selected book".to_string(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        },
        ToolDefinition {
            name: "search_book".to_string(),
            description: "Hybrid lexical+vector search over the selected book".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "top_k": { "type": "integer" }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: "server_status".to_string(),
            description: "Health snapshot of the server".to_string(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        },
    ]
}

/// `tools/call` dispatch. `session_id` is `None` for sessionless invocation
/// (tests, or a call preceding `initialize`).
pub async fn call(state: &AppState, session_id: Option<&str>, name: &str, arguments: Value) -> Result<ToolCallResult> {
    match name {
        "list_books" => Ok(ToolCallResult::json(&state.library.list())),

        "select_book" => {
            let book = arguments["book"]
                .as_str()
                .ok_or_else(|| AthenaeumError::InvalidInput("missing field: book".to_string()))?;
            state.library.get_or_build(book)?;
            if let Some(id) = session_id {
                state.sessions.with_mut(id, |session| {
                    session.selected_book = Some(book.to_string());
                });
            }
            Ok(ToolCallResult::json(&serde_json::json!({ "success": true, "selected": book })))
        }

        "get_book_info" => {
            let book = resolve_selected_book(state, session_id)?;
            let metadata = state.library.metadata(&book).unwrap_or_default();
            Ok(ToolCallResult::json(&serde_json::json!({
                "book": book,
                "metadata": metadata,
            })))
        }

        "search_book" => {
            let book = resolve_selected_book(state, session_id)?;
            let query = arguments["query"]
                .as_str()
                .ok_or_else(|| AthenaeumError::InvalidInput("missing field: query".to_string()))?;
            let top_k = arguments["top_k"].as_u64().unwrap_or(5) as usize;

            let index = state.library.get_or_build(&book)?;
            let embedding = state.embedder.embed(query).ok();
            let hits = retrieval::search(&index, query, embedding.as_deref(), top_k, 0.5);
            Ok(ToolCallResult::json(&hits))
        }

        "server_status" => Ok(ToolCallResult::json(&serde_json::json!({
            "status": "ok",
            "ai_provider": state.config.ai_provider,
            "books": state.library.list().len(),
        }))),

        other => Err(AthenaeumError::UnknownTool(other.to_string())),
    }
}

fn resolve_selected_book(state: &AppState, session_id: Option<&str>) -> Result<String> {
    if let Some(id) = session_id {
        if let Some(session) = state.sessions.get(id) {
            if let Some(book) = session.selected_book {
                return Ok(book);
            }
        }
    }
    state
        .library
        .first_indexed()
        .ok_or_else(|| AthenaeumError::BookNotFound("no indexed book available".to_string()))
        .inspect(|book| {
            if let Some(id) = session_id {
                auto_select(state, id, book);
            }
        })
}

fn auto_select(state: &AppState, session_id: &str, book: &str) {
    state.sessions.with_mut(session_id, |session| {
        if session.selected_book.is_none() {
            session.selected_book = Some(book.to_string());
        }
    });
}

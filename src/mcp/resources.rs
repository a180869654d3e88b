//! MCP resource registry (spec §4.6 "Resource URIs").

use serde_json::Value;

use crate::error::{AthenaeumError, Result};
use crate::state::AppState;

pub const LIBRARY_LIST: &str = "book://library/list";
pub const CURRENT_METADATA: &str = "book://current/metadata";
pub const CURRENT_TOC: &str = "book://current/toc";

/// `resources/list`, context-sensitive on the session's selected book.
pub fn list(state: &AppState, session_id: Option<&str>) -> Vec<Value> {
    let mut resources = vec![serde_json::json!({
        "uri": LIBRARY_LIST,
        "name": "Book library",
        "mimeType": "application/json",
    })];

    if selected_book(state, session_id).is_some() {
        resources.push(serde_json::json!({
            "uri": CURRENT_METADATA,
            "name": "Selected book metadata",
            "mimeType": "application/json",
        }));
        resources.push(serde_json::json!({
            "uri": CURRENT_TOC,
            "name": "Selected book table of contents",
            "mimeType": "application/json",
        }));
    }
    resources
}

/// `resources/read` -> `{contents: [{uri, mimeType, text}]}`.
pub fn read(state: &AppState, session_id: Option<&str>, uri: &str) -> Result<Value> {
    let text = match uri {
        LIBRARY_LIST => serde_json::to_string(&state.library.list())?,
        CURRENT_METADATA => {
            let book = selected_book(state, session_id)
                .ok_or_else(|| AthenaeumError::UnknownResource(uri.to_string()))?;
            serde_json::to_string(&state.library.metadata(&book).unwrap_or_default())?
        }
        CURRENT_TOC => {
            let book = selected_book(state, session_id)
                .ok_or_else(|| AthenaeumError::UnknownResource(uri.to_string()))?;
            let index = state.library.get_or_build(&book)?;
            let toc: Vec<Value> = index
                .chunks
                .iter()
                .map(|c| serde_json::json!({ "id": c.id, "length": c.length }))
                .collect();
            serde_json::to_string(&toc)?
        }
        other => return Err(AthenaeumError::UnknownResource(other.to_string())),
    };

    Ok(serde_json::json!({
        "contents": [{ "uri": uri, "mimeType": "application/json", "text": text }]
    }))
}

fn selected_book(state: &AppState, session_id: Option<&str>) -> Option<String> {
    session_id
        .and_then(|id| state.sessions.get(id))
        .and_then(|s| s.selected_book)
        .or_else(|| state.library.first_indexed())
}

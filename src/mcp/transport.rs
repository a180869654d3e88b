//! MCP Streamable-HTTP transport (spec §4.6): one endpoint accepting POST,
//! GET (SSE back-channel), and DELETE (session termination).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::AthenaeumError;
use crate::mcp::protocol::{methods, InitializeResult, McpHandler, McpRequest, McpResponse};
use crate::mcp::session::SessionStore;
use crate::mcp::{resources, tools};
use crate::state::AppState;
use crate::streaming::{sse, StreamEvent};
use crate::types::TaskStatus;

const SESSION_HEADER: &str = "Mcp-Session-Id";

fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// `POST /mcp`: single or batch JSON-RPC request.
pub async fn post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return json_response(
                StatusCode::OK,
                None,
                &McpResponse::error(None, -32700, format!("parse error: {e}")),
            );
        }
    };

    let is_batch = matches!(value, Value::Array(_));
    let requests: Vec<McpRequest> = match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        single => match serde_json::from_value(single) {
            Ok(req) => vec![req],
            Err(e) => {
                return json_response(
                    StatusCode::OK,
                    None,
                    &McpResponse::error(None, -32600, format!("invalid request: {e}")),
                );
            }
        },
    };

    let mut session_id = session_id_from_headers(&headers);

    let mut responses = Vec::new();
    for request in requests {
        if request.method == methods::INITIALIZE && session_id.is_none() {
            session_id = Some(SessionStore::generate_id());
        }
        if let Some(response) = dispatch(&state, session_id.as_deref(), request).await {
            responses.push(response);
        }
    }

    let session_id = session_id.unwrap_or_else(SessionStore::generate_id);
    state.sessions.get_or_create(&session_id);

    if responses.is_empty() {
        return json_response_empty(StatusCode::ACCEPTED, &session_id);
    }

    json_value_response(StatusCode::OK, &session_id, batch_response_body(is_batch, responses))
}

/// A batch request (`is_batch`) always gets an array back, even with a
/// single response, per the "ordered array of responses" batch contract.
fn batch_response_body(is_batch: bool, responses: Vec<McpResponse>) -> Value {
    if is_batch || responses.len() > 1 {
        serde_json::to_value(&responses).unwrap_or(Value::Null)
    } else {
        serde_json::to_value(&responses[0]).unwrap_or(Value::Null)
    }
}

/// `DELETE /mcp`: terminate the session named by `Mcp-Session-Id`.
pub async fn delete(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    match session_id_from_headers(&headers) {
        Some(id) => {
            state.sessions.remove(&id);
            StatusCode::NO_CONTENT.into_response()
        }
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// `GET /mcp` with `Accept: text/event-stream`: open the SSE back-channel.
/// No JSON-RPC responses are queued onto it yet in this implementation beyond
/// the heartbeat; it exists so `notifications/progress` and friends have a
/// channel to arrive on once a deferred call schedules one.
pub async fn get(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session_id = session_id_from_headers(&headers).unwrap_or_else(SessionStore::generate_id);
    state.sessions.get_or_create(&session_id);

    let (_tx, rx) = mpsc::channel::<StreamEvent>(8);
    let mut response = sse::into_response_with_heartbeat(rx).into_response();
    response.headers_mut().insert(
        SESSION_HEADER,
        HeaderValue::from_str(&session_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}

async fn dispatch(state: &Arc<AppState>, session_id: Option<&str>, request: McpRequest) -> Option<McpResponse> {
    let id = request.id.clone();
    let is_notification = id.is_none();

    let result = handle_method(state, session_id, &request).await;

    if is_notification {
        return None;
    }

    Some(match result {
        Ok(value) => McpResponse::success(id, value),
        Err(e) => McpResponse::from_error(id, e),
    })
}

async fn handle_method(
    state: &Arc<AppState>,
    session_id: Option<&str>,
    request: &McpRequest,
) -> crate::error::Result<Value> {
    match request.method.as_str() {
        methods::INITIALIZE => {
            if let Some(id) = session_id {
                let client_info: Option<crate::types::ClientInfo> =
                    serde_json::from_value(request.params["clientInfo"].clone()).ok();
                let protocol_version = request.params["protocolVersion"].as_str().map(|s| s.to_string());
                state.sessions.with_mut(id, |session| {
                    session.client_info = client_info;
                    session.protocol_version = protocol_version;
                });
            }
            serde_json::to_value(InitializeResult::default()).map_err(AthenaeumError::Serialization)
        }
        methods::INITIALIZED | methods::CANCELLED => Ok(Value::Null),
        methods::PING => Ok(serde_json::json!({})),

        methods::LIST_TOOLS => Ok(serde_json::json!({ "tools": tools::definitions() })),
        methods::CALL_TOOL => {
            let name = request.params["name"]
                .as_str()
                .ok_or_else(|| AthenaeumError::InvalidInput("missing field: name".to_string()))?;
            let arguments = request.params["arguments"].clone();
            let result = tools::call(state, session_id, name, arguments).await?;
            serde_json::to_value(result).map_err(AthenaeumError::Serialization)
        }

        methods::LIST_RESOURCES => Ok(serde_json::json!({ "resources": resources::list(state, session_id) })),
        methods::READ_RESOURCE => {
            let uri = request.params["uri"]
                .as_str()
                .ok_or_else(|| AthenaeumError::InvalidInput("missing field: uri".to_string()))?;
            resources::read(state, session_id, uri)
        }
        methods::LIST_RESOURCE_TEMPLATES => Ok(serde_json::json!({ "resourceTemplates": [] })),

        methods::LIST_PROMPTS => Ok(serde_json::json!({ "prompts": [] })),
        methods::GET_PROMPT => {
            let name = request.params["name"]
                .as_str()
                .ok_or_else(|| AthenaeumError::InvalidInput("missing field: name".to_string()))?;
            Err(AthenaeumError::InvalidInput(format!("unknown prompt: {name}")))
        }
        methods::COMPLETE => Ok(serde_json::json!({
            "completion": { "values": [], "total": 0, "hasMore": false }
        })),

        methods::TASKS_LIST => Ok(serde_json::json!({ "tasks": state.tasks.list() })),
        methods::TASKS_GET => {
            let id = request.params["id"]
                .as_str()
                .ok_or_else(|| AthenaeumError::InvalidInput("missing field: id".to_string()))?;
            let task = state
                .tasks
                .get(id)
                .ok_or_else(|| AthenaeumError::Task(format!("unknown task: {id}")))?;
            serde_json::to_value(task).map_err(AthenaeumError::Serialization)
        }
        methods::TASKS_CANCEL => {
            let id = request.params["id"]
                .as_str()
                .ok_or_else(|| AthenaeumError::InvalidInput("missing field: id".to_string()))?;
            state.tasks.cancel(id)?;
            Ok(serde_json::json!({}))
        }
        methods::TASKS_RESULT => {
            let id = request.params["id"]
                .as_str()
                .ok_or_else(|| AthenaeumError::InvalidInput("missing field: id".to_string()))?;
            let task = state
                .tasks
                .get(id)
                .ok_or_else(|| AthenaeumError::Task(format!("unknown task: {id}")))?;
            if task.status != TaskStatus::Completed {
                return Err(AthenaeumError::InvalidInput(format!("task {id} has no result yet")));
            }
            Ok(task.result.unwrap_or(Value::Null))
        }

        methods::SET_LOG_LEVEL => {
            let level = request.params["level"].as_str().map(|s| s.to_string());
            if let Some(id) = session_id {
                state.sessions.with_mut(id, |session| {
                    session.log_level = level;
                });
            }
            Ok(serde_json::json!({}))
        }

        other => Err(AthenaeumError::UnknownMethod(other.to_string())),
    }
}

fn json_response(status: StatusCode, session_id: Option<&str>, body: &McpResponse) -> Response {
    let value = serde_json::to_value(body).unwrap_or(Value::Null);
    match session_id {
        Some(id) => json_value_response(status, id, value),
        None => (status, axum::Json(value)).into_response(),
    }
}

fn json_value_response(status: StatusCode, session_id: &str, value: Value) -> Response {
    let mut response = (status, axum::Json(value)).into_response();
    response.headers_mut().insert(
        SESSION_HEADER,
        HeaderValue::from_str(session_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}

/// Bridges `McpServer`'s synchronous stdio loop onto the same `dispatch` path
/// the HTTP transport uses, for local tool integrations that speak
/// line-delimited JSON-RPC over stdin/stdout instead of HTTP.
pub struct StdioHandler {
    state: Arc<AppState>,
}

impl StdioHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl McpHandler for StdioHandler {
    fn handle_request(&self, request: McpRequest) -> McpResponse {
        let state = self.state.clone();
        let id = request.id.clone();
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                dispatch(&state, None, request)
                    .await
                    .unwrap_or_else(|| McpResponse::success(id, Value::Null))
            })
        })
    }
}

fn json_response_empty(status: StatusCode, session_id: &str) -> Response {
    let mut response = status.into_response();
    response.headers_mut().insert(
        SESSION_HEADER,
        HeaderValue::from_str(session_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_response() -> McpResponse {
        McpResponse::success(Some(serde_json::json!(1)), serde_json::json!({}))
    }

    #[test]
    fn single_element_batch_stays_an_array() {
        let body = batch_response_body(true, vec![ok_response()]);
        assert!(body.is_array(), "batch input must produce an array response even with one result");
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[test]
    fn non_batch_single_request_stays_an_object() {
        let body = batch_response_body(false, vec![ok_response()]);
        assert!(body.is_object());
    }

    #[test]
    fn multi_element_batch_is_an_array() {
        let body = batch_response_body(true, vec![ok_response(), ok_response()]);
        assert_eq!(body.as_array().unwrap().len(), 2);
    }
}

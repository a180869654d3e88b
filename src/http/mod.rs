//! REST + WebSocket surface (spec §6 "External interfaces").

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::streaming::{self, sse, StreamEvent};
use crate::types::{ChatMessage, SourcePassage};

/// Build the REST + WS router (spec §6 core HTTP endpoints plus `/ws`).
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/ask", post(ask))
        .route("/api/chat", post(chat))
        .route("/api/continue", post(continue_story))
        .route("/api/stream/ask", post(stream_ask))
        .route("/api/stream/chat", post(stream_chat))
        .route("/api/stream/continue", post(stream_continue))
        .route("/api/cache/stats", get(cache_stats))
        .route("/api/vectors/stats", get(vectors_stats))
        .route("/api/health", get(health))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
    top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    chat_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ContinueRequest {
    prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    success: bool,
    question: String,
    answer: String,
    sources: Vec<SourcePassage>,
    cached: bool,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    success: bool,
    answer: String,
}

#[derive(Debug, Serialize)]
struct ContinueResponse {
    success: bool,
    story: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

/// Resolve the book a book-less request operates over: `BOOK_PATH`'s stem if
/// configured, else the first indexed library entry.
fn default_book(state: &AppState) -> crate::error::Result<String> {
    if let Some(path) = &state.config.book_path {
        let stem = std::path::Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(path)
            .to_string();
        return Ok(stem);
    }
    state
        .library
        .first_indexed()
        .ok_or_else(|| crate::error::AthenaeumError::BookNotFound("no indexed book available".to_string()))
}

/// Accumulated result of draining a broker channel to completion, for the
/// non-streaming endpoints.
struct Collected {
    sources: Vec<SourcePassage>,
    answer: String,
    cached: bool,
    error: Option<String>,
}

async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Collected {
    let mut out = Collected {
        sources: Vec::new(),
        answer: String::new(),
        cached: false,
        error: None,
    };
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Sources { sources } => out.sources = sources,
            StreamEvent::Cached { .. } => out.cached = true,
            StreamEvent::Content { content } => out.answer.push_str(&content),
            StreamEvent::Error { error } => {
                out.error = Some(error);
                break;
            }
            StreamEvent::Done => break,
        }
    }
    out
}

async fn ask(State(state): State<Arc<AppState>>, Json(req): Json<AskRequest>) -> Response {
    let book = match default_book(&state) {
        Ok(b) => b,
        Err(e) => return error_response(e.to_string()),
    };
    let question = req.question.clone();
    let (tx, rx) = mpsc::channel(32);
    let deps = state.broker_deps();
    tokio::spawn(async move {
        streaming::rag_stream(&deps, &book, question, req.top_k.unwrap_or(5), None, tx).await;
    });
    let result = collect(rx).await;
    if let Some(error) = result.error {
        return error_response(error);
    }
    Json(AskResponse {
        success: true,
        question: req.question,
        answer: result.answer,
        sources: result.sources,
        cached: result.cached,
    })
    .into_response()
}

async fn chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    let (tx, rx) = mpsc::channel(32);
    let deps = state.broker_deps();
    let chat_id = req.chat_id.clone();
    tokio::spawn(async move {
        streaming::chat_stream(&deps, req.messages, chat_id, tx).await;
    });
    let result = collect(rx).await;
    if let Some(error) = result.error {
        return error_response(error);
    }
    Json(ChatResponse {
        success: true,
        answer: result.answer,
    })
    .into_response()
}

async fn continue_story(State(state): State<Arc<AppState>>, Json(req): Json<ContinueRequest>) -> Response {
    let (tx, rx) = mpsc::channel(32);
    let deps = state.broker_deps();
    tokio::spawn(async move {
        streaming::continue_stream(&deps, req.prompt.unwrap_or_default(), tx).await;
    });
    let result = collect(rx).await;
    if let Some(error) = result.error {
        return error_response(error);
    }
    Json(ContinueResponse {
        success: true,
        story: result.answer,
    })
    .into_response()
}

async fn stream_ask(State(state): State<Arc<AppState>>, Json(req): Json<AskRequest>) -> Response {
    let book = match default_book(&state) {
        Ok(b) => b,
        Err(e) => return error_response(e.to_string()),
    };
    let (tx, rx) = mpsc::channel(32);
    let deps = state.broker_deps();
    tokio::spawn(async move {
        streaming::rag_stream(&deps, &book, req.question, req.top_k.unwrap_or(5), None, tx).await;
    });
    sse::into_response(rx).into_response()
}

async fn stream_chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    let (tx, rx) = mpsc::channel(32);
    let deps = state.broker_deps();
    tokio::spawn(async move {
        streaming::chat_stream(&deps, req.messages, req.chat_id, tx).await;
    });
    sse::into_response(rx).into_response()
}

async fn stream_continue(State(state): State<Arc<AppState>>, Json(req): Json<ContinueRequest>) -> Response {
    let (tx, rx) = mpsc::channel(32);
    let deps = state.broker_deps();
    tokio::spawn(async move {
        streaming::continue_stream(&deps, req.prompt.unwrap_or_default(), tx).await;
    });
    sse::into_response(rx).into_response()
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = state.cache.stats();
    Json(json!({ "connected": true, "cached_items": stats.cached_items }))
}

async fn vectors_stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let books = state.library.list();
    let vector_count: usize = books.iter().filter(|b| b.has_index).count();
    Json(json!({ "initialized": vector_count > 0, "vector_count": vector_count }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "timestamp": chrono::Utc::now().to_rfc3339() }))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum WsRequest {
    Ask { question: String, top_k: Option<usize>, chat_id: Option<String> },
    Chat { messages: Vec<ChatMessage>, chat_id: Option<String> },
    Continue { prompt: Option<String> },
}

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: axum::extract::ws::WebSocket, state: Arc<AppState>) {
    use axum::extract::ws::Message;
    use futures::StreamExt;

    while let Some(Ok(message)) = socket.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(request) = serde_json::from_str::<WsRequest>(&text) else {
            continue;
        };

        let (tx, rx) = mpsc::channel(32);
        let deps = state.broker_deps();
        let mut book_error = None;
        match request {
            WsRequest::Ask { question, top_k, chat_id } => match default_book(&state) {
                Ok(book) => {
                    tokio::spawn(async move {
                        streaming::rag_stream(&deps, &book, question, top_k.unwrap_or(5), chat_id, tx).await;
                    });
                }
                Err(e) => book_error = Some((tx, e.to_string())),
            },
            WsRequest::Chat { messages, chat_id } => {
                tokio::spawn(async move {
                    streaming::chat_stream(&deps, messages, chat_id, tx).await;
                });
            }
            WsRequest::Continue { prompt } => {
                tokio::spawn(async move {
                    streaming::continue_stream(&deps, prompt.unwrap_or_default(), tx).await;
                });
            }
        }

        if let Some((tx, error)) = book_error {
            let _ = tx.send(StreamEvent::Error { error }).await;
        }
        streaming::ws::forward(&mut socket, rx).await;
    }
}

fn error_response(error: String) -> Response {
    (
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { success: false, error }),
    )
        .into_response()
}

//! The streaming broker (spec §4.5): binds one ingress kind to one egress
//! kind, forwarding upstream tokens without buffering the full response.

pub mod sse;
pub mod ws;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cache::{self, ResponseCache};
use crate::conversation::ChatStore;
use crate::embedding::Embedder;
use crate::library::BookLibrary;
use crate::prompt;
use crate::retrieval;
use crate::types::{CachedReply, ChatMessage, Role, SemanticHitInfo, SourcePassage};
use crate::upstream::{UpstreamEvent, UpstreamProvider};

/// One item forwarded to an egress adapter (SSE/WS/MCP SSE).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Sources { sources: Vec<SourcePassage> },
    Cached { matched_question: Option<String>, similarity: Option<f32> },
    Content { content: String },
    Error { error: String },
    Done,
}

/// Shared dependencies the broker needs, independent of any one HTTP/WS route.
pub struct BrokerDeps {
    pub library: Arc<BookLibrary>,
    pub embedder: Arc<dyn Embedder>,
    pub upstream: Arc<dyn UpstreamProvider>,
    pub cache: Arc<ResponseCache>,
    pub chat_store: Arc<ChatStore>,
}

struct RetrievedTurn {
    kind: &'static str,
    question: String,
    top_k: usize,
    sources: Vec<SourcePassage>,
    prompt: String,
    query_embedding: Option<Vec<f32>>,
}

async fn best_effort_embed(embedder: &dyn Embedder, text: &str) -> Option<Vec<f32>> {
    if text.is_empty() {
        return None;
    }
    embedder.embed(text).ok()
}

/// `rag_stream(question, top_k, chat_id?)`: retrieve, assemble prompt, open
/// upstream stream.
pub async fn rag_stream(
    deps: &BrokerDeps,
    book: &str,
    question: String,
    top_k: usize,
    chat_id: Option<String>,
    tx: mpsc::Sender<StreamEvent>,
) {
    let index = match deps.library.get_or_build(book) {
        Ok(index) => index,
        Err(e) => {
            let _ = tx.send(StreamEvent::Error { error: e.to_string() }).await;
            return;
        }
    };

    let query_embedding = best_effort_embed(deps.embedder.as_ref(), &question).await;
    let hits = retrieval::search(&index, &question, query_embedding.as_deref(), top_k, 0.5);
    let sources: Vec<SourcePassage> = hits.iter().map(SourcePassage::from).collect();
    let prompt = prompt::rag_prompt(&question, &hits);

    let turn = RetrievedTurn {
        kind: "ask",
        question,
        top_k,
        sources,
        prompt,
        query_embedding,
    };
    run_stream(deps, turn, chat_id, tx).await;
}

/// `chat_stream(messages, chat_id?)`: merge persisted context, open upstream stream.
pub async fn chat_stream(
    deps: &BrokerDeps,
    messages: Vec<ChatMessage>,
    chat_id: Option<String>,
    tx: mpsc::Sender<StreamEvent>,
) {
    let question = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_default();

    let context = match &chat_id {
        Some(id) => deps.chat_store.get_context(id).await,
        None => crate::types::ChatContext {
            summary: None,
            messages: Vec::new(),
            total_rounds: 0,
        },
    };
    let prompt = prompt::chat_prompt(&context, &messages);
    let query_embedding = best_effort_embed(deps.embedder.as_ref(), &question).await;

    let turn = RetrievedTurn {
        kind: "chat",
        question,
        top_k: 0,
        sources: Vec::new(),
        prompt,
        query_embedding,
    };
    run_stream(deps, turn, chat_id, tx).await;
}

/// `continue_stream(prompt)`: load the style-preservation system prompt, open
/// upstream stream.
pub async fn continue_stream(deps: &BrokerDeps, seed: String, tx: mpsc::Sender<StreamEvent>) {
    let prompt = prompt::continue_prompt(&seed);
    let query_embedding = best_effort_embed(deps.embedder.as_ref(), &seed).await;

    let turn = RetrievedTurn {
        kind: "continue",
        question: seed,
        top_k: 0,
        sources: Vec::new(),
        prompt,
        query_embedding,
    };
    run_stream(deps, turn, None, tx).await;
}

/// The per-request state machine shared by all three ingress kinds: a cache
/// check, then (on miss) retrieval results already computed by the caller,
/// upstream streaming with thought-filtering, and a write-on-success-only
/// cache update.
async fn run_stream(
    deps: &BrokerDeps,
    turn: RetrievedTurn,
    chat_id: Option<String>,
    tx: mpsc::Sender<StreamEvent>,
) {
    let key = cache::cache_key(turn.kind, &turn.question, turn.top_k);

    if let Some(reply) = deps.cache.get_exact(&key) {
        emit_cached(&tx, reply, None).await;
        return;
    }

    if let Some(embedding) = &turn.query_embedding {
        if let Some((reply, hit)) = deps.cache.get_semantic(embedding) {
            emit_cached(&tx, reply, Some(hit)).await;
            return;
        }
    }

    if tx.send(StreamEvent::Sources { sources: turn.sources.clone() }).await.is_err() {
        return;
    }

    let mut upstream_rx = match deps.upstream.generate_stream(&turn.prompt).await {
        Ok(rx) => rx,
        Err(e) => {
            let _ = tx.send(StreamEvent::Error { error: e.to_string() }).await;
            return;
        }
    };

    let mut accumulator = String::new();
    loop {
        let Some(event) = upstream_rx.recv().await else {
            break;
        };
        match event {
            UpstreamEvent::Token(text) => {
                accumulator.push_str(&text);
                if tx.send(StreamEvent::Content { content: text }).await.is_err() {
                    return;
                }
            }
            UpstreamEvent::Thought(_) => {}
            UpstreamEvent::Error(message) => {
                let _ = tx.send(StreamEvent::Error { error: message }).await;
                return;
            }
            UpstreamEvent::Done => break,
        }
    }

    deps.cache.put_exact(
        key.clone(),
        CachedReply {
            sources: turn.sources.clone(),
            answer: accumulator.clone(),
        },
    );
    if let Some(embedding) = turn.query_embedding {
        deps.cache.add_to_semantic_index(key, embedding, turn.question.clone());
    }

    if let Some(chat_id) = chat_id {
        deps.chat_store
            .append(&chat_id, ChatMessage::new(Role::User, turn.question))
            .await;
        deps.chat_store
            .append(&chat_id, ChatMessage::new(Role::Assistant, accumulator))
            .await;
    }

    let _ = tx.send(StreamEvent::Done).await;
}

async fn emit_cached(tx: &mpsc::Sender<StreamEvent>, reply: CachedReply, hit: Option<SemanticHitInfo>) {
    if tx
        .send(StreamEvent::Sources { sources: reply.sources })
        .await
        .is_err()
    {
        return;
    }
    let (matched_question, similarity) = match hit {
        Some(h) => (Some(h.matched_question), Some(h.similarity)),
        None => (None, None),
    };
    if tx
        .send(StreamEvent::Cached { matched_question, similarity })
        .await
        .is_err()
    {
        return;
    }
    if tx
        .send(StreamEvent::Content { content: reply.answer })
        .await
        .is_err()
    {
        return;
    }
    let _ = tx.send(StreamEvent::Done).await;
}

//! Core data model (spec §3)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An immutable passage of a book's text, the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: u32,
    pub text: String,
    /// Character count, not bytes.
    pub length: u32,
}

impl Chunk {
    pub fn new(id: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        let length = text.chars().count() as u32;
        Self { id, text, length }
    }
}

/// Optional book metadata extracted from the source file (spec §3 BookMetadata).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub series: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
}

/// An ordered sequence of chunks and their parallel embeddings for one book.
///
/// Invariant: `chunks.len() == embeddings.len()`, and every embedding has the
/// same dimension (the embedding model's output width).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookIndex {
    pub chunks: Vec<Chunk>,
    pub embeddings: Vec<Vec<f32>>,
}

impl BookIndex {
    pub fn new(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Self {
        Self { chunks, embeddings }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Embedding dimension, or 0 if the index carries no embeddings.
    pub fn dimension(&self) -> usize {
        self.embeddings
            .iter()
            .find(|e| !e.is_empty())
            .map_or(0, |e| e.len())
    }
}

/// A listed book (for `list_books`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookEntry {
    pub file: String,
    pub title: String,
    pub format: String,
    #[serde(rename = "hasIndex")]
    pub has_index: bool,
}

/// A single turn's speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A compacted summary of older conversation turns (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub text: String,
    pub rounds_summarized: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The fully reconstructed history for one turn (spec §4.3 ChatContext).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatContext {
    pub summary: Option<ConversationSummary>,
    pub messages: Vec<ChatMessage>,
    pub total_rounds: u64,
}

/// Search hit returned by the retrieval engine (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
    pub keyword_score: f32,
    pub vector_score: f32,
    pub method: SearchMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    Hybrid,
    KeywordOnly,
    VectorOnly,
}

/// A source passage surfaced to a client alongside an answer.
///
/// The canonical shape (spec §9 Open Question 3): un-truncated text, used by
/// both sync and streaming endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePassage {
    pub text: String,
    pub score: f32,
}

impl From<&SearchHit> for SourcePassage {
    fn from(hit: &SearchHit) -> Self {
        Self {
            text: hit.chunk.text.clone(),
            score: hit.score,
        }
    }
}

/// A durable MCP session (spec §3 Session).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpSession {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    pub client_info: Option<ClientInfo>,
    pub protocol_version: Option<String>,
    pub selected_book: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl McpSession {
    pub fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_access_at: now,
            client_info: None,
            protocol_version: None,
            selected_book: None,
            log_level: None,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.last_access_at > max_age
    }

    pub fn touch(&mut self) {
        self.last_access_at = Utc::now();
    }
}

/// A long-running server-side job (spec §3 Task).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTask {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl McpTask {
    pub fn new(id: String, task_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            task_type: task_type.into(),
            status: TaskStatus::Pending,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            result: None,
        }
    }
}

/// Cached reply value, shared by the exact and semantic cache tiers
/// (spec §3 CacheEntry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedReply {
    pub sources: Vec<SourcePassage>,
    pub answer: String,
}

/// One entry in the bounded semantic-cache FIFO (spec §3 SemanticIndexEntry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticIndexEntry {
    pub cache_key: String,
    pub embedding: Vec<f32>,
    pub question: String,
}

/// Provenance returned alongside a semantic cache hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticHitInfo {
    pub matched_question: String,
    pub similarity: f32,
}

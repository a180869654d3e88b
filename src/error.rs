//! Error types for Athenaeum

use thiserror::Error;

/// Result type alias for Athenaeum operations
pub type Result<T> = std::result::Result<T, AthenaeumError>;

/// Main error type for the book-analysis server
#[derive(Error, Debug)]
pub enum AthenaeumError {
    #[error("book not found: {0}")]
    BookNotFound(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("task error: {0}")]
    Task(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("upstream LLM error: {0}")]
    Upstream(String),

    #[error("upstream rate limited: retry after {0}s")]
    RateLimited(u64),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    #[cfg(any(feature = "gemini", feature = "openai"))]
    Http(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AthenaeumError {
    /// JSON-RPC error code per spec §7.
    pub fn code(&self) -> i64 {
        match self {
            AthenaeumError::UnknownMethod(_) => -32601,
            AthenaeumError::UnknownTool(_) => -32601,
            AthenaeumError::UnknownResource(_) => -32602,
            AthenaeumError::InvalidInput(_) => -32602,
            AthenaeumError::Serialization(_) => -32700,
            _ => -32000,
        }
    }

    /// Whether this error should ever reach a client, per the propagation
    /// policy in spec §7: retrieval/cache errors degrade silently, upstream
    /// and parse errors surface, internal invariant violations surface as
    /// `-32000` but keep the process alive.
    pub fn is_client_visible(&self) -> bool {
        !matches!(self, AthenaeumError::Cache(_))
    }

    /// A 429 from upstream is annotated as rate-limiting per spec §7.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AthenaeumError::RateLimited(_))
    }
}

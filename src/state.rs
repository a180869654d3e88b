//! Shared application state, assembled once in `main` and handed to every
//! HTTP/WS/MCP handler behind `Arc`.

use std::sync::Arc;

use crate::cache::{CacheConfig, ResponseCache};
use crate::config::Config;
use crate::conversation::{ChatStore, ConversationConfig};
use crate::embedding::{self, Embedder};
use crate::library::BookLibrary;
use crate::mcp::session::SessionStore;
use crate::mcp::task::TaskStore;
use crate::streaming::BrokerDeps;
use crate::upstream::{GeminiProvider, OpenAiProvider, UpstreamProvider};

pub struct AppState {
    pub config: Config,
    pub library: Arc<BookLibrary>,
    pub embedder: Arc<dyn Embedder>,
    pub upstream: Arc<dyn UpstreamProvider>,
    pub cache: Arc<ResponseCache>,
    pub chat_store: Arc<ChatStore>,
    pub sessions: Arc<SessionStore>,
    pub tasks: Arc<TaskStore>,
}

impl AppState {
    pub fn new(config: Config) -> crate::error::Result<Self> {
        let embedder = embedding::create_embedder(&config.embedding_config())?;

        let upstream: Arc<dyn UpstreamProvider> = match config.ai_provider.as_str() {
            "gemini" => Arc::new(GeminiProvider::new(
                config
                    .gemini_api_key
                    .clone()
                    .ok_or_else(|| crate::error::AthenaeumError::Config("GEMINI_API_KEY required".into()))?,
                "gemini-1.5-flash".to_string(),
            )),
            "openai" => Arc::new(OpenAiProvider::new(
                config
                    .openai_api_key
                    .clone()
                    .ok_or_else(|| crate::error::AthenaeumError::Config("OPENAI_API_KEY required".into()))?,
                "gpt-4o-mini".to_string(),
            )),
            other => {
                return Err(crate::error::AthenaeumError::Config(format!(
                    "unknown AI_PROVIDER: {other}"
                )))
            }
        };

        let library = Arc::new(BookLibrary::new(
            config.books_dir(),
            config.book_cache_dir(),
            embedder.clone(),
        ));
        let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
        let chat_store = Arc::new(ChatStore::new(ConversationConfig::default()));
        let sessions = Arc::new(SessionStore::load(".mcp_sessions.json"));
        let tasks = Arc::new(TaskStore::load(".mcp_tasks.json"));

        Ok(Self {
            config,
            library,
            embedder,
            upstream,
            cache,
            chat_store,
            sessions,
            tasks,
        })
    }

    pub fn broker_deps(&self) -> BrokerDeps {
        BrokerDeps {
            library: self.library.clone(),
            embedder: self.embedder.clone(),
            upstream: self.upstream.clone(),
            cache: self.cache.clone(),
            chat_store: self.chat_store.clone(),
        }
    }

    /// Periodic janitor sweep (SPEC_FULL §11): expired cache entries, tasks,
    /// and sessions untouched for more than 24h.
    pub fn purge_expired(&self) {
        self.cache.purge_expired();
        self.tasks.purge_expired();
        self.sessions.purge_expired();
    }
}

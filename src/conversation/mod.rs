//! Conversation/session history store (spec §4.3).
//!
//! Keyed by `chat_id`, with a hard cap on stored turns and an explicit,
//! caller-driven compaction step once a history grows past a threshold.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::types::{ChatContext, ChatMessage, ConversationSummary};

#[derive(Debug, Clone, Copy)]
pub struct ConversationConfig {
    pub ttl: Duration,
    pub max_history_length: usize,
    pub summarize_threshold: usize,
    pub keep_recent_messages: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_history_length: 40,
            summarize_threshold: 16,
            keep_recent_messages: 8,
        }
    }
}

struct Entry {
    history: Vec<ChatMessage>,
    summary: Option<ConversationSummary>,
    expires_at: Instant,
}

/// Per-`chat_id` history + summary, with per-key serialization so concurrent
/// turns on the same id don't interleave their read-modify-write.
pub struct ChatStore {
    config: ConversationConfig,
    entries: DashMap<String, Entry>,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl ChatStore {
    pub fn new(config: ConversationConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, chat_id: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn is_live(entry: &Entry) -> bool {
        Instant::now() < entry.expires_at
    }

    /// `get_context(chat_id)`: reconstruct `{summary, messages, total_rounds}`.
    pub async fn get_context(&self, chat_id: &str) -> ChatContext {
        let lock = self.lock_for(chat_id);
        let _guard = lock.lock().await;
        self.get_context_locked(chat_id)
    }

    fn get_context_locked(&self, chat_id: &str) -> ChatContext {
        match self.entries.get(chat_id) {
            Some(entry) if Self::is_live(&entry) => {
                let rounds_from_summary = entry.summary.as_ref().map_or(0, |s| s.rounds_summarized);
                let total_rounds = entry.history.len() as u64 / 2 + rounds_from_summary;
                ChatContext {
                    summary: entry.summary.clone(),
                    messages: entry.history.clone(),
                    total_rounds,
                }
            }
            _ => ChatContext {
                summary: None,
                messages: Vec::new(),
                total_rounds: 0,
            },
        }
    }

    /// Append one message, dropping the oldest once the hard cap is exceeded.
    pub async fn append(&self, chat_id: &str, message: ChatMessage) {
        let lock = self.lock_for(chat_id);
        let _guard = lock.lock().await;

        let cap = self.config.max_history_length * 2;
        let mut entry = self
            .entries
            .remove(chat_id)
            .map(|(_, e)| e)
            .filter(Self::is_live)
            .unwrap_or_else(|| Entry {
                history: Vec::new(),
                summary: None,
                expires_at: Instant::now() + self.config.ttl,
            });

        entry.history.push(message);
        while entry.history.len() > cap {
            entry.history.remove(0);
        }
        entry.expires_at = Instant::now() + self.config.ttl;
        self.entries.insert(chat_id.to_string(), entry);
    }

    /// `|history| >= 2*summarize_threshold`: the caller must summarize before
    /// the next turn consumes this history.
    pub fn needs_compaction(&self, chat_id: &str) -> bool {
        self.entries
            .get(chat_id)
            .filter(|e| Self::is_live(e))
            .map(|e| e.history.len() >= 2 * self.config.summarize_threshold)
            .unwrap_or(false)
    }

    /// Replace `summary.text` with a freshly produced summarization of the
    /// dropped rounds, truncating history to the last `2*keep_recent_messages`.
    pub async fn compact(&self, chat_id: &str, new_summary_text: String) {
        let lock = self.lock_for(chat_id);
        let _guard = lock.lock().await;

        let Some(mut entry) = self.entries.remove(chat_id).map(|(_, e)| e) else {
            return;
        };

        let keep = 2 * self.config.keep_recent_messages;
        let dropped_rounds = (entry.history.len().saturating_sub(keep)) as u64 / 2;

        let rounds_summarized = entry.summary.as_ref().map_or(0, |s| s.rounds_summarized) + dropped_rounds;
        let now = chrono::Utc::now();
        entry.summary = Some(ConversationSummary {
            text: new_summary_text,
            rounds_summarized,
            created_at: entry.summary.as_ref().map_or(now, |s| s.created_at),
            updated_at: now,
        });

        if entry.history.len() > keep {
            let drop_count = entry.history.len() - keep;
            entry.history.drain(0..drop_count);
        }
        entry.expires_at = Instant::now() + self.config.ttl;
        self.entries.insert(chat_id.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn msg(n: usize) -> ChatMessage {
        let role = if n.is_multiple_of(2) { Role::User } else { Role::Assistant };
        ChatMessage::new(role, format!("message {n}"))
    }

    #[tokio::test]
    async fn append_caps_history_at_twice_max_length() {
        let store = ChatStore::new(ConversationConfig {
            max_history_length: 3,
            ..Default::default()
        });
        for i in 0..10 {
            store.append("chat-1", msg(i)).await;
        }
        let ctx = store.get_context("chat-1").await;
        assert_eq!(ctx.messages.len(), 6);
    }

    #[tokio::test]
    async fn total_rounds_accounts_for_summary() {
        let store = ChatStore::new(ConversationConfig::default());
        for i in 0..4 {
            store.append("chat-2", msg(i)).await;
        }
        let ctx = store.get_context("chat-2").await;
        assert_eq!(ctx.total_rounds, 2);
    }

    #[tokio::test]
    async fn needs_compaction_at_threshold() {
        let store = ChatStore::new(ConversationConfig {
            summarize_threshold: 2,
            ..Default::default()
        });
        for i in 0..8 {
            store.append("chat-3", msg(i)).await;
        }
        assert!(store.needs_compaction("chat-3"));
    }

    #[tokio::test]
    async fn compaction_preserves_round_identity() {
        let store = ChatStore::new(ConversationConfig {
            summarize_threshold: 2,
            keep_recent_messages: 2,
            ..Default::default()
        });
        for i in 0..8 {
            store.append("chat-4", msg(i)).await;
        }
        let total_before = store.get_context("chat-4").await.total_rounds;

        store.compact("chat-4", "summary so far".to_string()).await;
        let ctx = store.get_context("chat-4").await;

        assert!(ctx.messages.len() <= 4);
        let rounds_summarized = ctx.summary.as_ref().unwrap().rounds_summarized;
        assert_eq!(rounds_summarized + ctx.messages.len() as u64 / 2, total_before);
    }
}

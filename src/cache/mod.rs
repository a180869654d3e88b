//! Two-tier response cache (spec §4.4): exact fingerprint lookup backed by a
//! bounded semantic FIFO of query embeddings.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::embedding::cosine_similarity;
use crate::types::{CachedReply, SemanticHitInfo, SemanticIndexEntry};

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub semantic_threshold: f32,
    pub semantic_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            semantic_threshold: 0.96,
            semantic_capacity: 100,
        }
    }
}

struct ExactEntry {
    reply: CachedReply,
    expires_at: Instant,
}

struct SemanticEntry {
    entry: SemanticIndexEntry,
    expires_at: Instant,
}

/// `cache_key = md5(kind || ':' || question || ':' || top_k)`.
pub fn cache_key(kind: &str, question: &str, top_k: usize) -> String {
    let input = format!("{kind}:{question}:{top_k}");
    format!("{:x}", md5::compute(input))
}

pub struct ResponseCache {
    config: CacheConfig,
    exact: RwLock<std::collections::HashMap<String, ExactEntry>>,
    semantic: RwLock<VecDeque<SemanticEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

pub struct CacheStats {
    pub cached_items: u64,
    pub hits: u64,
    pub misses: u64,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            exact: RwLock::new(std::collections::HashMap::new()),
            semantic: RwLock::new(VecDeque::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Exact-tier lookup. Never errors; a missing/expired key is a miss.
    pub fn get_exact(&self, key: &str) -> Option<CachedReply> {
        let now = Instant::now();
        let found = self
            .exact
            .read()
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.reply.clone());
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Exact-tier write. Only called at stream completion, never on error.
    pub fn put_exact(&self, key: String, reply: CachedReply) {
        self.exact.write().insert(
            key,
            ExactEntry {
                reply,
                expires_at: Instant::now() + self.config.ttl,
            },
        );
    }

    /// Append a query embedding to the bounded semantic FIFO.
    pub fn add_to_semantic_index(&self, cache_key: String, embedding: Vec<f32>, question: String) {
        let mut semantic = self.semantic.write();
        semantic.push_back(SemanticEntry {
            entry: SemanticIndexEntry {
                cache_key,
                embedding,
                question,
            },
            expires_at: Instant::now() + self.config.ttl * 2,
        });
        while semantic.len() > self.config.semantic_capacity {
            semantic.pop_front();
        }
    }

    /// Semantic-tier lookup: argmax cosine similarity among live, dimension-
    /// matching entries. A hit above threshold that misses the exact tier
    /// falls through to a plain miss.
    pub fn get_semantic(&self, query_embedding: &[f32]) -> Option<(CachedReply, SemanticHitInfo)> {
        let now = Instant::now();
        let best = {
            let semantic = self.semantic.read();
            semantic
                .iter()
                .filter(|e| e.expires_at > now && e.entry.embedding.len() == query_embedding.len())
                .map(|e| (cosine_similarity(query_embedding, &e.entry.embedding), e))
                .filter(|(score, _)| *score > self.config.semantic_threshold)
                .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(score, e)| (score, e.entry.cache_key.clone(), e.entry.question.clone()))
        };

        let (score, key, question) = best?;
        let reply = self.get_exact(&key)?;
        Some((
            reply,
            SemanticHitInfo {
                matched_question: question,
                similarity: score,
            },
        ))
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let cached_items = self.exact.read().values().filter(|e| e.expires_at > now).count() as u64;
        CacheStats {
            cached_items,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Janitor sweep: drop expired exact and semantic entries.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.exact.write().retain(|_, e| e.expires_at > now);
        self.semantic.write().retain(|e| e.expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(answer: &str) -> CachedReply {
        CachedReply {
            sources: vec![],
            answer: answer.to_string(),
        }
    }

    #[test]
    fn exact_round_trip() {
        let cache = ResponseCache::new(CacheConfig::default());
        let key = cache_key("ask", "what happens next?", 5);
        assert!(cache.get_exact(&key).is_none());
        cache.put_exact(key.clone(), reply("answer one"));
        assert_eq!(cache.get_exact(&key).unwrap().answer, "answer one");
    }

    #[test]
    fn cache_key_is_stable_for_identical_inputs() {
        let a = cache_key("ask", "q", 5);
        let b = cache_key("ask", "q", 5);
        assert_eq!(a, b);
        let c = cache_key("chat", "q", 5);
        assert_ne!(a, c);
    }

    #[test]
    fn semantic_hit_above_threshold_fetches_exact() {
        let cache = ResponseCache::new(CacheConfig::default());
        let key = cache_key("ask", "original question", 5);
        cache.put_exact(key.clone(), reply("cached answer"));
        cache.add_to_semantic_index(key, vec![1.0, 0.0, 0.0], "original question".into());

        let hit = cache.get_semantic(&[0.999, 0.001, 0.0]).unwrap();
        assert_eq!(hit.0.answer, "cached answer");
        assert_eq!(hit.1.matched_question, "original question");
    }

    #[test]
    fn semantic_miss_below_threshold() {
        let cache = ResponseCache::new(CacheConfig::default());
        let key = cache_key("ask", "q", 5);
        cache.put_exact(key.clone(), reply("a"));
        cache.add_to_semantic_index(key, vec![1.0, 0.0], "q".into());

        assert!(cache.get_semantic(&[0.0, 1.0]).is_none());
    }

    #[test]
    fn semantic_index_is_bounded_fifo() {
        let cache = ResponseCache::new(CacheConfig {
            semantic_capacity: 2,
            ..Default::default()
        });
        cache.add_to_semantic_index("k1".into(), vec![1.0], "q1".into());
        cache.add_to_semantic_index("k2".into(), vec![1.0], "q2".into());
        cache.add_to_semantic_index("k3".into(), vec![1.0], "q3".into());
        assert_eq!(cache.semantic.read().len(), 2);
        assert_eq!(cache.semantic.read().front().unwrap().entry.cache_key, "k2");
    }
}

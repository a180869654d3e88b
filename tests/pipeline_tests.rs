//! End-to-end tests exercising the public crate surface: indexing a book
//! through `BookLibrary`, retrieving passages, and round-tripping the
//! response cache, all without touching a live upstream provider.
//!
//! Run with: cargo test --test pipeline_tests

use std::path::PathBuf;
use std::sync::Arc;

use athenaeum::cache::{cache_key, CacheConfig, ResponseCache};
use athenaeum::embedding::Embedder;
use athenaeum::error::Result;
use athenaeum::library::BookLibrary;
use athenaeum::retrieval;
use athenaeum::types::{CachedReply, SourcePassage};

/// Deterministic bag-of-words embedder: each dimension counts occurrences of
/// one tracked token. No network calls, so these tests run offline.
struct WordCountEmbedder {
    vocab: Vec<&'static str>,
}

impl WordCountEmbedder {
    fn new() -> Self {
        Self {
            vocab: vec!["whale", "sea", "captain", "storm", "harbor"],
        }
    }
}

impl Embedder for WordCountEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        Ok(self
            .vocab
            .iter()
            .map(|word| lower.matches(word).count() as f32)
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.vocab.len()
    }

    fn model_name(&self) -> &str {
        "word-count-test"
    }
}

fn write_book(dir: &std::path::Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn indexes_book_and_retrieves_relevant_passage() {
    let books_dir = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    write_book(
        books_dir.path(),
        "voyage.txt",
        "The captain steered through the storm.\n\n\
         Gulls circled the quiet harbor at dawn.\n\n\
         Far out the whale surfaced beside the ship.",
    );

    let library = BookLibrary::new(
        books_dir.path().to_path_buf(),
        cache_dir.path().to_path_buf(),
        Arc::new(WordCountEmbedder::new()),
    );

    let index = library.get_or_build("voyage").unwrap();
    assert!(!index.is_empty());

    let embedder = WordCountEmbedder::new();
    let query_embedding = embedder.embed("Tell me about the whale").unwrap();
    let hits = retrieval::search(&index, "whale", Some(&query_embedding), 2, 0.5);

    assert!(!hits.is_empty());
    assert!(hits[0].chunk.text.to_lowercase().contains("whale"));

    // A second call hits the in-memory cache and the on-disk index rather
    // than rebuilding, so it must return the identical chunk set.
    let reloaded = library.get_or_build("voyage").unwrap();
    assert_eq!(index.chunks.len(), reloaded.chunks.len());
}

#[test]
fn response_cache_round_trips_exact_and_semantic_hits() {
    let cache = ResponseCache::new(CacheConfig::default());
    let embedder = WordCountEmbedder::new();

    let key = cache_key("ask", "what happens to the whale?", 5);
    let reply = CachedReply {
        sources: vec![SourcePassage {
            text: "the whale surfaced beside the ship".to_string(),
            score: 0.9,
        }],
        answer: "The whale surfaces near the ship.".to_string(),
    };
    cache.put_exact(key.clone(), reply.clone());

    let hit = cache.get_exact(&key).expect("exact hit");
    assert_eq!(hit.answer, reply.answer);

    let embedding = embedder.embed("what happens to the whale?").unwrap();
    cache.add_to_semantic_index(key, embedding.clone(), "what happens to the whale?".to_string());

    let (semantic_reply, info) = cache.get_semantic(&embedding).expect("semantic hit");
    assert_eq!(semantic_reply.answer, reply.answer);
    assert!(info.similarity > 0.99);

    let stats = cache.stats();
    assert_eq!(stats.cached_items, 1);
    assert!(stats.hits >= 2);
}

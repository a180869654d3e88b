//! Hybrid lexical + vector retrieval (spec §4.2).

use std::collections::HashSet;

use crate::embedding::cosine_similarity;
use crate::types::{BookIndex, SearchHit, SearchMethod};

/// Derive the keyword set K from a query: Unicode whitespace/punctuation
/// split, tokens of length >= 2, plus every 2-char sliding window for
/// tokens longer than 2, deduplicated.
fn keyword_set(query: &str) -> Vec<String> {
    let mut keywords: HashSet<String> = HashSet::new();
    for token in query.split(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '_')) {
        let token = token.to_lowercase();
        let len = token.chars().count();
        if len < 2 {
            continue;
        }
        keywords.insert(token.clone());
        if len > 2 {
            let chars: Vec<char> = token.chars().collect();
            for window in chars.windows(2) {
                keywords.insert(window.iter().collect());
            }
        }
    }
    keywords.into_iter().collect()
}

/// Case-insensitive substring occurrence count (possibly overlapping).
fn count_occurrences_ci(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let haystack = haystack.to_lowercase();
    let mut count = 0;
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        count += 1;
        start += pos + 1;
        if start >= haystack.len() {
            break;
        }
    }
    count
}

fn lexical_score(text: &str, keywords: &[String]) -> f32 {
    keywords
        .iter()
        .map(|k| {
            let count = count_occurrences_ci(text, k);
            (1.0 + count as f32).ln() * k.chars().count() as f32
        })
        .sum()
}

fn vector_score(query_embedding: Option<&[f32]>, chunk_embedding: &[f32]) -> f32 {
    match query_embedding {
        Some(q) => cosine_similarity(q, chunk_embedding),
        None => 0.0,
    }
}

fn max_normalize(values: &[f32]) -> Vec<f32> {
    let max = values.iter().cloned().fold(0.0f32, f32::max);
    let denom = if max == 0.0 { 1.0 } else { max };
    values.iter().map(|v| v / denom).collect()
}

/// Hybrid search across `index`, fusing lexical and vector axes.
pub fn search(
    index: &BookIndex,
    query: &str,
    query_embedding: Option<&[f32]>,
    top_k: usize,
    keyword_weight: f32,
) -> Vec<SearchHit> {
    if index.is_empty() {
        return Vec::new();
    }

    let keywords = keyword_set(query);
    let dimension = index.dimension();

    let kw_scores: Vec<f32> = index
        .chunks
        .iter()
        .map(|c| lexical_score(&c.text, &keywords))
        .collect();

    let vec_scores: Vec<f32> = index
        .embeddings
        .iter()
        .map(|emb| {
            if emb.is_empty() || emb.len() != dimension {
                0.0
            } else {
                vector_score(query_embedding, emb)
            }
        })
        .collect();

    fuse(index, kw_scores, vec_scores, top_k, keyword_weight, SearchMethod::Hybrid)
}

/// Pure-vector search, skipping the lexical axis entirely.
pub fn search_vector_only(
    index: &BookIndex,
    query_embedding: Option<&[f32]>,
    top_k: usize,
) -> Vec<SearchHit> {
    if index.is_empty() {
        return Vec::new();
    }

    let dimension = index.dimension();
    let kw_scores = vec![0.0f32; index.chunks.len()];
    let vec_scores: Vec<f32> = index
        .embeddings
        .iter()
        .map(|emb| {
            if emb.is_empty() || emb.len() != dimension {
                0.0
            } else {
                vector_score(query_embedding, emb)
            }
        })
        .collect();

    fuse(index, kw_scores, vec_scores, top_k, 0.0, SearchMethod::VectorOnly)
}

fn fuse(
    index: &BookIndex,
    kw_scores: Vec<f32>,
    vec_scores: Vec<f32>,
    top_k: usize,
    keyword_weight: f32,
    method: SearchMethod,
) -> Vec<SearchHit> {
    let kw_norm = max_normalize(&kw_scores);
    let v_norm = max_normalize(&vec_scores);

    let mut hits: Vec<SearchHit> = index
        .chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let final_score = keyword_weight * kw_norm[i] + (1.0 - keyword_weight) * v_norm[i];
            SearchHit {
                chunk: chunk.clone(),
                score: final_score,
                keyword_score: kw_scores[i],
                vector_score: vec_scores[i],
                method,
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    hits.truncate(top_k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn sample_index() -> BookIndex {
        BookIndex::new(
            vec![
                Chunk::new(0, "the quick brown fox jumps"),
                Chunk::new(1, "lazy dog sleeps all day"),
                Chunk::new(2, "the fox and the dog are friends"),
            ],
            vec![
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![0.7, 0.7],
            ],
        )
    }

    #[test]
    fn empty_index_returns_empty_list() {
        let index = BookIndex::new(vec![], vec![]);
        let hits = search(&index, "fox", None, 10, 0.5);
        assert!(hits.is_empty());
    }

    #[test]
    fn keyword_only_when_no_query_embedding() {
        let index = sample_index();
        let hits = search(&index, "fox", None, 10, 0.5);
        assert!(hits.iter().all(|h| h.vector_score == 0.0));
        assert!(hits.iter().any(|h| h.chunk.text.contains("fox")));
    }

    #[test]
    fn top_k_truncates_and_sorts_descending() {
        let index = sample_index();
        let hits = search(&index, "fox dog", Some(&[1.0, 0.0]), 2, 0.5);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn mismatched_dimension_embedding_degrades_to_zero_vector_score() {
        let mut index = sample_index();
        index.embeddings[0] = vec![1.0]; // wrong dimension
        let hits = search(&index, "fox", Some(&[1.0, 0.0]), 10, 0.5);
        let hit0 = hits.iter().find(|h| h.chunk.id == 0).unwrap();
        assert_eq!(hit0.vector_score, 0.0);
    }

    #[test]
    fn ties_broken_by_ascending_chunk_id() {
        let index = BookIndex::new(
            vec![Chunk::new(2, "same"), Chunk::new(1, "same"), Chunk::new(0, "same")],
            vec![vec![], vec![], vec![]],
        );
        let hits = search(&index, "nomatch", None, 10, 0.5);
        let ids: Vec<u32> = hits.iter().map(|h| h.chunk.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn vector_only_skips_lexical_axis() {
        let index = sample_index();
        let hits = search_vector_only(&index, Some(&[1.0, 0.0]), 10);
        assert!(hits.iter().all(|h| h.keyword_score == 0.0));
        assert_eq!(hits[0].chunk.id, 0);
    }
}

//! Book library: listing, index loading, and on-demand index construction.
//!
//! EPUB text extraction is an external collaborator per spec §1 ("given file
//! path -> UTF-8 plain text + metadata"); this module only defines the seam
//! ([`BookExtractor`]) and a plain-text default, and owns everything
//! downstream of it: chunking, embedding, and the on-disk index cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::chunker::{self, ChunkerConfig};
use crate::embedding::Embedder;
use crate::error::{AthenaeumError, Result};
use crate::types::{BookEntry, BookIndex, BookMetadata};

/// Extracts plain text + metadata from a book source file.
pub trait BookExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<(String, BookMetadata)>;
}

/// Reads the file as UTF-8 text directly; title defaults to the filename stem.
/// Stands in for the EPUB extraction routine, which is out of scope (spec §1).
pub struct PlainTextExtractor;

impl BookExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<(String, BookMetadata)> {
        let text = std::fs::read_to_string(path)?;
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string();
        Ok((
            text,
            BookMetadata {
                title,
                ..Default::default()
            },
        ))
    }
}

pub struct BookLibrary {
    books_dir: PathBuf,
    book_cache: PathBuf,
    extractor: Arc<dyn BookExtractor>,
    embedder: Arc<dyn Embedder>,
    chunker_config: ChunkerConfig,
    loaded: DashMap<String, Arc<BookIndex>>,
    metadata: DashMap<String, BookMetadata>,
}

impl BookLibrary {
    pub fn new(books_dir: PathBuf, book_cache: PathBuf, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            books_dir,
            book_cache,
            extractor: Arc::new(PlainTextExtractor),
            embedder,
            chunker_config: ChunkerConfig::default(),
            loaded: DashMap::new(),
            metadata: DashMap::new(),
        }
    }

    fn index_path(&self, stem: &str) -> PathBuf {
        self.book_cache.join(format!("{stem}_index.json"))
    }

    fn source_path(&self, stem: &str) -> Option<PathBuf> {
        std::fs::read_dir(&self.books_dir)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| p.file_stem().and_then(|s| s.to_str()) == Some(stem))
    }

    /// `list_books` (spec §4.6 tool): scan the books directory.
    pub fn list(&self) -> Vec<BookEntry> {
        let Ok(entries) = std::fs::read_dir(&self.books_dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| {
                let path = e.path();
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                let format = path
                    .extension()
                    .and_then(|s| s.to_str())
                    .unwrap_or("txt")
                    .to_string();
                let title = self
                    .metadata
                    .get(&stem)
                    .map(|m| m.title.clone())
                    .unwrap_or_else(|| stem.clone());
                BookEntry {
                    file: path.file_name().and_then(|s| s.to_str()).unwrap_or_default().to_string(),
                    title,
                    format,
                    has_index: self.index_path(&stem).exists(),
                }
            })
            .collect()
    }

    /// The first book with an on-disk index, used as the default selection.
    pub fn first_indexed(&self) -> Option<String> {
        self.list().into_iter().find(|b| b.has_index).map(|b| {
            PathBuf::from(&b.file)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&b.file)
                .to_string()
        })
    }

    pub fn metadata(&self, stem: &str) -> Option<BookMetadata> {
        self.metadata.get(stem).map(|m| m.clone())
    }

    /// Load from the in-memory cache, then the on-disk index, building it
    /// from source only if absent (spec §3 "regenerated only when absent").
    pub fn get_or_build(&self, stem: &str) -> Result<Arc<BookIndex>> {
        if let Some(index) = self.loaded.get(stem) {
            return Ok(index.clone());
        }

        let index_path = self.index_path(stem);
        if index_path.exists() {
            let contents = std::fs::read_to_string(&index_path)?;
            let index: BookIndex = serde_json::from_str(&contents)?;
            let index = Arc::new(index);
            self.loaded.insert(stem.to_string(), index.clone());
            return Ok(index);
        }

        let source = self
            .source_path(stem)
            .ok_or_else(|| AthenaeumError::BookNotFound(stem.to_string()))?;
        let (text, metadata) = self.extractor.extract(&source)?;
        self.metadata.insert(stem.to_string(), metadata);

        let chunks = chunker::chunk_text(&text, self.chunker_config);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;
        let index = BookIndex::new(chunks, embeddings);

        if let Some(parent) = index_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&index_path, serde_json::to_string(&index)?)?;

        let index = Arc::new(index);
        self.loaded.insert(stem.to_string(), index.clone());
        Ok(index)
    }
}

#[allow(dead_code)]
fn _assert_send_sync<T: Send + Sync>() {}
#[allow(dead_code)]
fn _check() {
    _assert_send_sync::<BookLibrary>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;

    struct FixedEmbedder;
    impl Embedder for FixedEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
        fn dimensions(&self) -> usize {
            2
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn builds_index_from_source_and_caches_it() {
        let books_dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        std::fs::write(books_dir.path().join("moby.txt"), "Call me Ishmael.").unwrap();

        let library = BookLibrary::new(
            books_dir.path().to_path_buf(),
            cache_dir.path().to_path_buf(),
            Arc::new(FixedEmbedder),
        );

        let index = library.get_or_build("moby").unwrap();
        assert!(!index.is_empty());
        assert!(cache_dir.path().join("moby_index.json").exists());

        let books = library.list();
        assert_eq!(books.len(), 1);
        assert!(books[0].has_index);
    }

    #[test]
    fn missing_book_is_not_found() {
        let books_dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let library = BookLibrary::new(
            books_dir.path().to_path_buf(),
            cache_dir.path().to_path_buf(),
            Arc::new(FixedEmbedder),
        );
        assert!(library.get_or_build("nope").is_err());
    }
}

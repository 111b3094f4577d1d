// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Vector search contract.
//!
//! Used by RAG-style step handlers to retrieve supporting context. Concrete
//! embedding-backed implementations live outside this crate;
//! `InMemoryVectorSearch` is a deterministic double for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A single retrieved document.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Document identifier.
    pub id: String,
    /// Document content/text.
    pub content: String,
    /// Relevance score in `[0, 1]`, higher is more relevant.
    pub score: f64,
    /// Arbitrary document metadata.
    pub metadata: HashMap<String, Value>,
}

/// Optional metadata filters applied before scoring.
pub type Filters = HashMap<String, Value>;

/// A source of semantic search over a document corpus.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return up to `top_k` hits for `query` scoring at least
    /// `min_relevance`, sorted by score descending. `filters`, when
    /// present, restrict the corpus to matching metadata.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        min_relevance: f64,
        filters: Option<&Filters>,
    ) -> Result<Vec<SearchHit>>;
}

/// An in-memory `VectorSearch` double. Scores documents by a crude token
/// overlap ratio with the query rather than real embeddings, which is
/// enough to exercise ranking/filtering logic deterministically in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorSearch {
    documents: Vec<SearchHit>,
}

impl InMemoryVectorSearch {
    /// Create an empty corpus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document with a fixed metadata map; its `score` field is
    /// overwritten per-query by `search`.
    #[must_use]
    pub fn with_document(
        mut self,
        id: impl Into<String>,
        content: impl Into<String>,
        metadata: HashMap<String, Value>,
    ) -> Self {
        self.documents.push(SearchHit {
            id: id.into(),
            content: content.into(),
            score: 0.0,
            metadata,
        });
        self
    }

    fn overlap_score(query: &str, content: &str) -> f64 {
        let query_tokens: Vec<&str> = query.split_whitespace().collect();
        if query_tokens.is_empty() {
            return 0.0;
        }
        let content_lower = content.to_lowercase();
        let matches = query_tokens
            .iter()
            .filter(|t| content_lower.contains(&t.to_lowercase()))
            .count();
        matches as f64 / query_tokens.len() as f64
    }
}

#[async_trait]
impl VectorSearch for InMemoryVectorSearch {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        min_relevance: f64,
        filters: Option<&Filters>,
    ) -> Result<Vec<SearchHit>> {
        let mut scored: Vec<SearchHit> = self
            .documents
            .iter()
            .filter(|doc| match filters {
                None => true,
                Some(f) => f.iter().all(|(k, v)| doc.metadata.get(k) == Some(v)),
            })
            .map(|doc| SearchHit {
                score: Self::overlap_score(query, &doc.content),
                ..doc.clone()
            })
            .filter(|doc| doc.score >= min_relevance)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_ranks_by_score_descending() {
        let corpus = InMemoryVectorSearch::new()
            .with_document("a", "rust is a systems language", HashMap::new())
            .with_document("b", "rust rust rust everywhere", HashMap::new())
            .with_document("c", "completely unrelated text", HashMap::new());
        let hits = corpus.search("rust systems", 10, 0.0, None).await.unwrap();
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|h| h.id != "c" || h.score == 0.0));
    }

    #[tokio::test]
    async fn search_respects_min_relevance() {
        let corpus = InMemoryVectorSearch::new()
            .with_document("a", "rust systems language", HashMap::new())
            .with_document("c", "unrelated", HashMap::new());
        let hits = corpus.search("rust systems", 10, 0.5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn search_respects_top_k() {
        let corpus = InMemoryVectorSearch::new()
            .with_document("a", "rust", HashMap::new())
            .with_document("b", "rust", HashMap::new())
            .with_document("c", "rust", HashMap::new());
        let hits = corpus.search("rust", 2, 0.0, None).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn search_applies_metadata_filters() {
        let mut meta_a = HashMap::new();
        meta_a.insert("lang".to_string(), Value::String("en".to_string()));
        let mut meta_b = HashMap::new();
        meta_b.insert("lang".to_string(), Value::String("fr".to_string()));
        let corpus = InMemoryVectorSearch::new()
            .with_document("a", "rust language", meta_a)
            .with_document("b", "rust language", meta_b);
        let mut filters = HashMap::new();
        filters.insert("lang".to_string(), Value::String("fr".to_string()));
        let hits = corpus
            .search("rust language", 10, 0.0, Some(&filters))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }
}

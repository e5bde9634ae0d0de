//! Document retrieval over the similarity index
//!
//! Embeds the query, fetches a candidate pool from the index, and
//! re-ranks it with MMR down to the final document set.

use crate::embedder::QueryEmbedder;
use crate::index::SimilarityIndex;
use crate::mmr::MmrSelection;
use alzqa_common::documents::RetrievedDocument;
use alzqa_common::errors::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Trait for query-to-documents retrieval
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    /// Retrieve the most relevant, diversified documents for the query
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>>;
}

/// MMR retriever composing an embedder and a similarity index
pub struct MmrRetriever {
    embedder: Arc<dyn QueryEmbedder>,
    index: Arc<dyn SimilarityIndex>,
    selection: MmrSelection,
}

impl MmrRetriever {
    /// Create with default selection parameters
    pub fn new(embedder: Arc<dyn QueryEmbedder>, index: Arc<dyn SimilarityIndex>) -> Self {
        Self {
            embedder,
            index,
            selection: MmrSelection::default(),
        }
    }

    /// Create with custom selection parameters
    pub fn with_selection(
        embedder: Arc<dyn QueryEmbedder>,
        index: Arc<dyn SimilarityIndex>,
        selection: MmrSelection,
    ) -> Self {
        Self {
            embedder,
            index,
            selection,
        }
    }
}

#[async_trait]
impl DocumentRetriever for MmrRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation {
                message: "Retrieval query must not be empty".to_string(),
                field: Some("query".to_string()),
            });
        }

        let started = Instant::now();

        let query_embedding = self.embedder.embed_query(query).await?;
        let candidates = self
            .index
            .nearest(&query_embedding, self.selection.fetch_k)
            .await?;

        let fetched = candidates.len();
        let selected = self.selection.select(&query_embedding, candidates);
        let documents: Vec<RetrievedDocument> =
            selected.into_iter().map(|c| c.document).collect();

        alzqa_common::metrics::record_retrieval(started.elapsed().as_secs_f64(), documents.len());
        tracing::debug!(
            fetched = fetched,
            selected = documents.len(),
            "Retrieved documents"
        );

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexCandidate;

    struct FixedEmbedder;

    #[async_trait]
    impl QueryEmbedder for FixedEmbedder {
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct StubIndex {
        candidates: Vec<IndexCandidate>,
    }

    #[async_trait]
    impl SimilarityIndex for StubIndex {
        async fn nearest(
            &self,
            _embedding: &[f32],
            fetch_k: usize,
        ) -> Result<Vec<IndexCandidate>> {
            let mut candidates = self.candidates.clone();
            candidates.truncate(fetch_k);
            Ok(candidates)
        }
    }

    struct OfflineIndex;

    #[async_trait]
    impl SimilarityIndex for OfflineIndex {
        async fn nearest(
            &self,
            _embedding: &[f32],
            _fetch_k: usize,
        ) -> Result<Vec<IndexCandidate>> {
            Err(AppError::RetrievalUnavailable {
                message: "index offline".to_string(),
            })
        }
    }

    fn make_candidate(file: &str, embedding: Vec<f32>) -> IndexCandidate {
        IndexCandidate {
            document: RetrievedDocument::new(
                format!("content of {}", file),
                file,
                format!("Title of {}", file),
            ),
            embedding,
            score: 0.9,
        }
    }

    #[tokio::test]
    async fn test_retrieve_caps_at_k() {
        let candidates: Vec<IndexCandidate> = (0..10)
            .map(|i| make_candidate(&format!("f{}", i), vec![1.0, i as f32 * 0.1]))
            .collect();

        let retriever = MmrRetriever::new(
            Arc::new(FixedEmbedder),
            Arc::new(StubIndex { candidates }),
        );

        let documents = retriever.retrieve("what causes plaques?").await.unwrap();
        assert_eq!(documents.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let retriever = MmrRetriever::new(
            Arc::new(FixedEmbedder),
            Arc::new(StubIndex { candidates: vec![] }),
        );

        let err = retriever.retrieve("   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_index_failure_propagates() {
        let retriever = MmrRetriever::new(Arc::new(FixedEmbedder), Arc::new(OfflineIndex));

        let err = retriever.retrieve("what causes plaques?").await.unwrap_err();
        assert!(matches!(err, AppError::RetrievalUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_fewer_candidates_than_k() {
        let retriever = MmrRetriever::new(
            Arc::new(FixedEmbedder),
            Arc::new(StubIndex {
                candidates: vec![make_candidate("only", vec![1.0, 0.0])],
            }),
        );

        let documents = retriever.retrieve("tau tangles").await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].metadata.file, "only");
    }
}

//! Similarity index boundary
//!
//! The corpus is embedded and indexed ahead of time; at query time the
//! pipeline only reads nearest neighbors. Implementations:
//! - InMemoryIndex: exact scan over a loaded snapshot
//! - ChromaIndex (chroma module): HTTP client for a running server

use crate::mmr::cosine_similarity;
use alzqa_common::documents::{DocumentMetadata, RetrievedDocument};
use alzqa_common::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A candidate returned by the index before re-ranking
#[derive(Debug, Clone)]
pub struct IndexCandidate {
    /// The retrievable document
    pub document: RetrievedDocument,

    /// Stored embedding for the passage
    pub embedding: Vec<f32>,

    /// Index-reported similarity score (higher is closer)
    pub score: f32,
}

/// Trait for nearest-neighbor lookup over the corpus
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Fetch up to `fetch_k` nearest candidates for the query embedding,
    /// most similar first
    async fn nearest(&self, embedding: &[f32], fetch_k: usize) -> Result<Vec<IndexCandidate>>;
}

/// One record of a pre-built index snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub content: String,
    pub metadata: DocumentMetadata,
    pub embedding: Vec<f32>,
}

/// Exact-scan index over snapshot records held in memory
pub struct InMemoryIndex {
    records: Vec<IndexRecord>,
}

impl InMemoryIndex {
    pub fn new(records: Vec<IndexRecord>) -> Self {
        Self { records }
    }

    /// Load records from a JSON snapshot (an array of records)
    pub fn from_json(snapshot: &str) -> Result<Self> {
        let records: Vec<IndexRecord> = serde_json::from_str(snapshot)?;
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SimilarityIndex for InMemoryIndex {
    async fn nearest(&self, embedding: &[f32], fetch_k: usize) -> Result<Vec<IndexCandidate>> {
        let mut candidates: Vec<IndexCandidate> = self
            .records
            .iter()
            .map(|record| IndexCandidate {
                document: RetrievedDocument {
                    content: record.content.clone(),
                    metadata: record.metadata.clone(),
                },
                embedding: record.embedding.clone(),
                score: cosine_similarity(embedding, &record.embedding),
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(fetch_k);

        Ok(candidates)
    }
}

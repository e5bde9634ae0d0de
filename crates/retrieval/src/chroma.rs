//! Chroma HTTP adapter
//!
//! Queries a pre-populated collection on a running Chroma server. The
//! configured collection name is resolved to its id on first use and
//! cached for the life of the process.

use crate::index::{IndexCandidate, SimilarityIndex};
use alzqa_common::config::IndexConfig;
use alzqa_common::documents::{DocumentMetadata, RetrievedDocument};
use alzqa_common::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

/// Chroma-backed similarity index
pub struct ChromaIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    collection_id: OnceCell<String>,
}

#[derive(Serialize)]
struct QueryRequest {
    query_embeddings: Vec<Vec<f32>>,
    n_results: usize,
    include: Vec<&'static str>,
}

/// Query results come back as parallel arrays, one inner list per query
#[derive(Deserialize)]
struct QueryResponse {
    documents: Vec<Vec<Option<String>>>,
    metadatas: Vec<Vec<Option<serde_json::Value>>>,
    embeddings: Option<Vec<Vec<Vec<f32>>>>,
    distances: Option<Vec<Vec<f32>>>,
}

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
}

impl ChromaIndex {
    /// Create a new adapter for the configured server and collection
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            collection_id: OnceCell::new(),
        })
    }

    /// Resolve and cache the collection id for the configured name
    async fn resolve_collection(&self) -> Result<&str> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let url = format!("{}/api/v1/collections/{}", self.base_url, self.collection);

                let response =
                    self.client
                        .get(&url)
                        .send()
                        .await
                        .map_err(|e| AppError::RetrievalUnavailable {
                            message: format!("Collection lookup failed: {}", e),
                        })?;

                if !response.status().is_success() {
                    let status = response.status();
                    return Err(AppError::RetrievalUnavailable {
                        message: format!(
                            "Collection lookup error {} for '{}'",
                            status, self.collection
                        ),
                    });
                }

                let info: CollectionInfo =
                    response
                        .json()
                        .await
                        .map_err(|e| AppError::RetrievalUnavailable {
                            message: format!("Invalid collection response: {}", e),
                        })?;

                tracing::info!(
                    collection = %self.collection,
                    id = %info.id,
                    "Resolved index collection"
                );

                Ok(info.id)
            })
            .await?;

        Ok(id.as_str())
    }

    /// Flatten a query response into candidates, skipping null rows
    fn candidates_from_response(response: QueryResponse) -> Result<Vec<IndexCandidate>> {
        let documents = response.documents.into_iter().next().unwrap_or_default();
        let metadatas = response.metadatas.into_iter().next().unwrap_or_default();

        let embeddings = response
            .embeddings
            .and_then(|e| e.into_iter().next())
            .ok_or_else(|| AppError::RetrievalUnavailable {
                message: "Index response missing embeddings".to_string(),
            })?;

        let distances = response
            .distances
            .and_then(|d| d.into_iter().next())
            .ok_or_else(|| AppError::RetrievalUnavailable {
                message: "Index response missing distances".to_string(),
            })?;

        let mut candidates = Vec::with_capacity(documents.len());

        for (((content, metadata), embedding), distance) in documents
            .into_iter()
            .zip(metadatas)
            .zip(embeddings)
            .zip(distances)
        {
            let content = match content {
                Some(content) => content,
                None => continue,
            };

            let metadata = match metadata {
                Some(value) => serde_json::from_value::<DocumentMetadata>(value).map_err(|e| {
                    AppError::RetrievalUnavailable {
                        message: format!("Invalid document metadata: {}", e),
                    }
                })?,
                None => continue,
            };

            candidates.push(IndexCandidate {
                document: RetrievedDocument { content, metadata },
                embedding,
                // Chroma reports cosine distance; flip to a similarity
                score: 1.0 - distance,
            });
        }

        Ok(candidates)
    }
}

#[async_trait]
impl SimilarityIndex for ChromaIndex {
    async fn nearest(&self, embedding: &[f32], fetch_k: usize) -> Result<Vec<IndexCandidate>> {
        let collection_id = self.resolve_collection().await?;
        let url = format!(
            "{}/api/v1/collections/{}/query",
            self.base_url, collection_id
        );

        let request = QueryRequest {
            query_embeddings: vec![embedding.to_vec()],
            n_results: fetch_k,
            include: vec!["documents", "metadatas", "embeddings", "distances"],
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::RetrievalUnavailable {
                        message: format!("Index query timed out: {}", e),
                    }
                } else {
                    AppError::RetrievalUnavailable {
                        message: format!("Index query failed: {}", e),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RetrievalUnavailable {
                message: format!("Index error {}: {}", status, body),
            });
        }

        let query_response: QueryResponse =
            response
                .json()
                .await
                .map_err(|e| AppError::RetrievalUnavailable {
                    message: format!("Failed to parse index response: {}", e),
                })?;

        Self::candidates_from_response(query_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_from_json(value: serde_json::Value) -> QueryResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_candidates_score_is_one_minus_distance() {
        let response = response_from_json(serde_json::json!({
            "documents": [["Amyloid beta aggregates."]],
            "metadatas": [[{"file": "art1.pdf", "title": "Amyloid Cascade Review"}]],
            "embeddings": [[[0.1, 0.2]]],
            "distances": [[0.25]]
        }));

        let candidates = ChromaIndex::candidates_from_response(response).unwrap();
        assert_eq!(candidates.len(), 1);
        assert!((candidates[0].score - 0.75).abs() < 1e-6);
        assert_eq!(candidates[0].document.metadata.file, "art1.pdf");
    }

    #[test]
    fn test_candidates_skip_null_rows() {
        let response = response_from_json(serde_json::json!({
            "documents": [[null, "Tau tangles accumulate."]],
            "metadatas": [[null, {"file": "art2.pdf", "title": "Tau Pathology"}]],
            "embeddings": [[[0.0, 0.0], [0.3, 0.4]]],
            "distances": [[0.9, 0.1]]
        }));

        let candidates = ChromaIndex::candidates_from_response(response).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].document.metadata.file, "art2.pdf");
    }

    #[test]
    fn test_missing_embeddings_is_an_error() {
        let response = response_from_json(serde_json::json!({
            "documents": [["text"]],
            "metadatas": [[{"file": "f", "title": "t"}]],
            "distances": [[0.1]]
        }));

        let err = ChromaIndex::candidates_from_response(response).unwrap_err();
        assert!(matches!(err, AppError::RetrievalUnavailable { .. }));
    }

    #[test]
    fn test_empty_response_yields_no_candidates() {
        let response = response_from_json(serde_json::json!({
            "documents": [[]],
            "metadatas": [[]],
            "embeddings": [[]],
            "distances": [[]]
        }));

        let candidates = ChromaIndex::candidates_from_response(response).unwrap();
        assert!(candidates.is_empty());
    }
}

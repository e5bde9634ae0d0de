//! AlzQA retrieval crate
//!
//! Vector retrieval over an Alzheimer's disease article index.
//!
//! Provides:
//! - Query embedding clients (HTTP embedding service, mock)
//! - Similarity index backends (Chroma HTTP, in-memory)
//! - MMR re-ranking for relevance with diversity
//! - The `DocumentRetriever` trait and its MMR implementation

pub mod chroma;
pub mod embedder;
pub mod index;
pub mod mmr;
pub mod retriever;

// Re-export main types
pub use chroma::ChromaIndex;
pub use embedder::{create_query_embedder, HttpEmbedder, MockEmbedder, QueryEmbedder};
pub use index::{IndexCandidate, InMemoryIndex, SimilarityIndex};
pub use mmr::MmrSelection;
pub use retriever::{DocumentRetriever, MmrRetriever};

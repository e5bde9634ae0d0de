//! Maximal marginal relevance re-ranking
//!
//! MMR balances relevance to the query against diversity among the
//! results already picked:
//! - score = lambda * relevance - (1 - lambda) * max similarity to picks
//! - lambda 1.0 degenerates to the index's own similarity ranking
//! - low lambda favors coverage of distinct passages

use crate::index::IndexCandidate;
use alzqa_common::config::RetrievalConfig;

/// Cosine similarity between two embedding vectors.
///
/// Returns 0.0 for empty, mismatched, or zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// MMR selection parameters
#[derive(Debug, Clone)]
pub struct MmrSelection {
    /// Number of documents to select
    pub k: usize,

    /// Candidate pool size requested from the index
    pub fetch_k: usize,

    /// Relevance/diversity trade-off, 1.0 = pure relevance
    pub lambda: f32,
}

impl Default for MmrSelection {
    fn default() -> Self {
        Self {
            k: 5,
            fetch_k: 35,
            lambda: 0.3,
        }
    }
}

impl MmrSelection {
    /// Create from retrieval configuration
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            k: config.k,
            fetch_k: config.fetch_k,
            lambda: config.mmr_lambda,
        }
    }

    /// Create with a custom trade-off weight
    pub fn with_lambda(lambda: f32) -> Self {
        Self {
            lambda,
            ..Self::default()
        }
    }

    /// Greedily select up to `k` candidates.
    ///
    /// The first pick is always the candidate most similar to the query;
    /// subsequent picks trade relevance against the maximum similarity to
    /// anything already selected. Ties keep the earliest candidate, i.e.
    /// the index's own ranking.
    pub fn select(
        &self,
        query_embedding: &[f32],
        candidates: Vec<IndexCandidate>,
    ) -> Vec<IndexCandidate> {
        if self.k == 0 || candidates.is_empty() {
            return Vec::new();
        }

        let relevance: Vec<f32> = candidates
            .iter()
            .map(|c| cosine_similarity(query_embedding, &c.embedding))
            .collect();

        let mut selected: Vec<usize> = Vec::with_capacity(self.k.min(candidates.len()));
        let mut remaining: Vec<usize> = (0..candidates.len()).collect();

        while selected.len() < self.k && !remaining.is_empty() {
            let mut best_pos = 0;
            let mut best_score = f32::NEG_INFINITY;

            for (pos, &idx) in remaining.iter().enumerate() {
                let score = if selected.is_empty() {
                    relevance[idx]
                } else {
                    let redundancy = selected
                        .iter()
                        .map(|&s| {
                            cosine_similarity(&candidates[idx].embedding, &candidates[s].embedding)
                        })
                        .fold(f32::NEG_INFINITY, f32::max);

                    self.lambda * relevance[idx] - (1.0 - self.lambda) * redundancy
                };

                if score > best_score {
                    best_score = score;
                    best_pos = pos;
                }
            }

            selected.push(remaining.remove(best_pos));
        }

        // Return candidates in selection order
        let mut by_index: Vec<Option<IndexCandidate>> =
            candidates.into_iter().map(Some).collect();

        selected
            .into_iter()
            .filter_map(|idx| by_index[idx].take())
            .collect()
    }
}

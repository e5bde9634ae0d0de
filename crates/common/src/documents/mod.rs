//! Document and structured-answer types shared across the pipeline
//!
//! Provides:
//! - Retrieved passage types with file/title provenance
//! - The validated structured answer emitted per cycle
//! - The file-to-title source map consumed by the presentation layer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from source file identifier to article title.
///
/// Built from `StructuredAnswer::sources`; keys are unique with later
/// entries winning on duplicates.
pub type SourceMap = BTreeMap<String, String>;

/// Metadata attached to a retrieved passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Source file identifier within the corpus
    pub file: String,

    /// Article title
    pub title: String,

    /// Any further metadata keys the index stores (DOI, page, authors)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DocumentMetadata {
    pub fn new(file: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            title: title.into(),
            extra: BTreeMap::new(),
        }
    }
}

/// A passage retrieved from the corpus, owned by a single cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Passage text
    pub content: String,

    /// Provenance metadata
    pub metadata: DocumentMetadata,
}

impl RetrievedDocument {
    pub fn new(
        content: impl Into<String>,
        file: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            metadata: DocumentMetadata::new(file, title),
        }
    }
}

/// One source attribution in a structured answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Article title
    pub title: String,

    /// Source file identifier
    pub file: String,
}

/// Validated final output of a cycle: the generated answer text plus its
/// source attributions.
///
/// Invariant: `message` is byte-identical to the answer stage's output and
/// every source traces back to a document retrieved in the same cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    /// Answer text, verbatim from the answer stage
    pub message: String,

    /// Source attributions in backend order
    pub sources: Vec<SourceEntry>,
}

impl StructuredAnswer {
    /// Build the file-to-title map; later entries win on duplicate files
    pub fn source_map(&self) -> SourceMap {
        let mut map = SourceMap::new();
        for source in &self.sources {
            map.insert(source.file.clone(), source.title.clone());
        }
        map
    }
}

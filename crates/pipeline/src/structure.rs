//! Structured answer validation
//!
//! The structuring model's reply is a wire-level contract, not a trusted
//! value: `message` must echo the generated answer byte for byte, and
//! every source must trace back to a document retrieved in the same
//! cycle. Violations are repaired (default) or rejected (strict mode).

use alzqa_common::documents::{RetrievedDocument, SourceEntry, StructuredAnswer};
use alzqa_common::errors::{AppError, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Wire shape of the structuring model's reply.
///
/// Exactly two top-level keys; anything else fails JSON parsing and
/// surfaces as `MalformedOutput` upstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStructuredAnswer {
    pub message: String,
    pub sources: Vec<SourceEntry>,
}

/// Validates raw structured output against the cycle's answer and
/// retrieved documents
pub struct StructureValidator {
    strict: bool,
}

impl StructureValidator {
    /// Create a validator; strict mode fails the cycle on violations
    /// instead of repairing them
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Validate and finalize a structured answer.
    ///
    /// `answer_text` is the answer stage's verbatim output; `documents`
    /// is the retrieved set the sources must be drawn from.
    pub fn validate(
        &self,
        raw: RawStructuredAnswer,
        answer_text: &str,
        documents: &[RetrievedDocument],
    ) -> Result<StructuredAnswer> {
        let message = self.check_echo(raw.message, answer_text)?;
        let sources = self.check_provenance(raw.sources, documents)?;

        Ok(StructuredAnswer { message, sources })
    }

    fn check_echo(&self, message: String, answer_text: &str) -> Result<String> {
        if message == answer_text {
            return Ok(message);
        }

        if self.strict {
            return Err(AppError::StructureInvariantViolation {
                message: "Structured message does not echo the generated answer".to_string(),
            });
        }

        tracing::warn!(
            expected_chars = answer_text.len(),
            got_chars = message.len(),
            "Structuring model altered the answer text, restoring the original"
        );
        alzqa_common::metrics::record_structure_repair("echo");
        Ok(answer_text.to_string())
    }

    fn check_provenance(
        &self,
        sources: Vec<SourceEntry>,
        documents: &[RetrievedDocument],
    ) -> Result<Vec<SourceEntry>> {
        let titles_by_file: HashMap<&str, &str> = documents
            .iter()
            .map(|d| (d.metadata.file.as_str(), d.metadata.title.as_str()))
            .collect();

        let mut validated = Vec::with_capacity(sources.len());
        for mut source in sources {
            let Some(&title) = titles_by_file.get(source.file.as_str()) else {
                if self.strict {
                    return Err(AppError::StructureInvariantViolation {
                        message: format!(
                            "Source '{}' does not match any retrieved document",
                            source.file
                        ),
                    });
                }

                tracing::warn!(file = %source.file, "Dropping source not present in retrieved documents");
                alzqa_common::metrics::record_structure_repair("provenance");
                continue;
            };

            if source.title != title {
                if self.strict {
                    return Err(AppError::StructureInvariantViolation {
                        message: format!(
                            "Source '{}' carries title '{}', retrieved document says '{}'",
                            source.file, source.title, title
                        ),
                    });
                }

                tracing::warn!(
                    file = %source.file,
                    "Restoring source title from retrieved document metadata"
                );
                alzqa_common::metrics::record_structure_repair("provenance");
                source.title = title.to_string();
            }

            validated.push(source);
        }

        Ok(validated)
    }
}

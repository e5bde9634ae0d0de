//! Question-answer pipeline orchestration
//!
//! Provides:
//! - The cycle state machine (Idle through Completed, Failed terminal)
//! - `QaPipeline`, which drives one question through disambiguation,
//!   retrieval, grounded generation, and citation structuring
//! - `AnswerCycle`, the per-cycle output handed to the caller
//!
//! A cycle is atomic from the conversation's point of view: the user
//! turn is appended up front, the assistant turn only on success. A
//! failed cycle returns an error and leaves no partial output, which
//! keeps system failures distinguishable from the generator's in-band
//! "insufficient information" refusals.

use crate::format::{format_documents, format_history};
use crate::stage::PromptStage;
use crate::structure::{RawStructuredAnswer, StructureValidator};
use crate::templates::{self, TemplateEngine};
use alzqa_common::backend::{create_backend, CompletionBackend};
use alzqa_common::chat::Conversation;
use alzqa_common::config::AppConfig;
use alzqa_common::documents::{SourceMap, StructuredAnswer};
use alzqa_common::errors::{AppError, Result};
use alzqa_retrieval::{
    create_query_embedder, ChromaIndex, DocumentRetriever, MmrRetriever, MmrSelection,
};
use minijinja::context;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// States of one question-answer cycle, advanced strictly in sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Disambiguating,
    Retrieving,
    Generating,
    Structuring,
    Completed,
    Failed,
}

impl CycleState {
    /// The state entered when the current one succeeds; terminal states
    /// stay put
    pub fn next(self) -> Self {
        match self {
            CycleState::Idle => CycleState::Disambiguating,
            CycleState::Disambiguating => CycleState::Retrieving,
            CycleState::Retrieving => CycleState::Generating,
            CycleState::Generating => CycleState::Structuring,
            CycleState::Structuring => CycleState::Completed,
            terminal => terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CycleState::Completed | CycleState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::Disambiguating => "disambiguating",
            CycleState::Retrieving => "retrieving",
            CycleState::Generating => "generating",
            CycleState::Structuring => "structuring",
            CycleState::Completed => "completed",
            CycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one completed question-answer cycle
#[derive(Debug, Clone, Serialize)]
pub struct AnswerCycle {
    /// Cycle identifier, shared with the log lines it produced
    pub cycle_id: Uuid,

    /// The standalone question the documents were retrieved with
    pub standalone_query: String,

    /// Validated answer text plus source attributions
    pub answer: StructuredAnswer,

    /// File-to-title map for the presentation layer
    pub sources: SourceMap,

    /// Number of documents retrieved for this cycle
    pub retrieved: usize,

    /// End-to-end cycle latency in milliseconds
    pub elapsed_ms: u64,
}

/// The question-answer pipeline.
///
/// Holds the retriever, one `PromptStage` per LLM-bound step, and the
/// structure validator. Conversations are owned by the caller and
/// passed in per cycle; the pipeline itself keeps no per-session state.
pub struct QaPipeline {
    retriever: Arc<dyn DocumentRetriever>,
    disambiguate: PromptStage,
    generate: PromptStage,
    structurize: PromptStage,
    validator: StructureValidator,
    history_window: usize,
}

impl QaPipeline {
    /// Assemble a pipeline from a retriever, a completion backend, and
    /// stage configuration
    pub fn new(
        retriever: Arc<dyn DocumentRetriever>,
        backend: Arc<dyn CompletionBackend>,
        config: &AppConfig,
    ) -> Result<Self> {
        let engine = Arc::new(TemplateEngine::new()?);

        Ok(Self {
            retriever,
            disambiguate: PromptStage::new(
                templates::DISAMBIGUATE,
                config.completion.disambiguate.clone(),
                engine.clone(),
                backend.clone(),
            ),
            generate: PromptStage::new(
                templates::GENERATE,
                config.completion.generate.clone(),
                engine.clone(),
                backend.clone(),
            ),
            structurize: PromptStage::new(
                templates::STRUCTURIZE,
                config.completion.structure.clone(),
                engine,
                backend,
            ),
            validator: StructureValidator::new(config.pipeline.strict_citations),
            history_window: config.pipeline.history_window,
        })
    }

    /// Wire the production pipeline from configuration: completion
    /// backend, query embedder, and Chroma-backed MMR retrieval
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let backend = create_backend(&config.completion)?;
        let embedder = create_query_embedder(&config.embedding)?;
        let index = Arc::new(ChromaIndex::new(&config.index)?);
        let retriever = Arc::new(MmrRetriever::with_selection(
            embedder,
            index,
            MmrSelection::from_config(&config.retrieval),
        ));

        Self::new(retriever, backend, config)
    }

    /// Run one question-answer cycle against the conversation.
    ///
    /// On success the conversation gains the user turn and the
    /// assistant turn; on failure it gains the user turn only and no
    /// source map is produced.
    pub async fn answer(
        &self,
        conversation: &mut Conversation,
        question: &str,
    ) -> Result<AnswerCycle> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation {
                message: "Question must not be empty".to_string(),
                field: Some("question".to_string()),
            });
        }

        let cycle_id = Uuid::new_v4();
        let started = Instant::now();
        tracing::info!(cycle_id = %cycle_id, "Starting question-answer cycle");

        conversation.push_user(question);

        let mut state = CycleState::Idle;
        let result = self
            .run_stages(cycle_id, &mut state, conversation, question)
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok((standalone_query, answer, retrieved)) => {
                transition(cycle_id, &mut state, CycleState::Completed);
                conversation.push_assistant(answer.message.clone());

                let sources = answer.source_map();
                alzqa_common::metrics::record_cycle(started.elapsed().as_secs_f64(), "completed");
                tracing::info!(
                    cycle_id = %cycle_id,
                    retrieved = retrieved,
                    sources = sources.len(),
                    elapsed_ms = elapsed_ms,
                    "Cycle completed"
                );

                Ok(AnswerCycle {
                    cycle_id,
                    standalone_query,
                    answer,
                    sources,
                    retrieved,
                    elapsed_ms,
                })
            }
            Err(err) => {
                transition(cycle_id, &mut state, CycleState::Failed);
                alzqa_common::metrics::record_cycle(started.elapsed().as_secs_f64(), "failed");
                tracing::error!(cycle_id = %cycle_id, error = %err, "Cycle failed");
                Err(err)
            }
        }
    }

    #[instrument(skip(self, state, conversation, question), fields(cycle_id = %cycle_id))]
    async fn run_stages(
        &self,
        cycle_id: Uuid,
        state: &mut CycleState,
        conversation: &Conversation,
        question: &str,
    ) -> Result<(String, StructuredAnswer, usize)> {
        // The recency window includes the just-appended user turn
        transition(cycle_id, state, CycleState::Disambiguating);
        let history = format_history(conversation.recent(self.history_window));
        let standalone = self
            .disambiguate
            .complete_text(context! {
                chat_history => history,
                question => question,
            })
            .await?
            .trim()
            .to_string();

        if standalone.is_empty() {
            return Err(AppError::MalformedOutput {
                message: "Disambiguation produced an empty question".to_string(),
            });
        }
        tracing::debug!(cycle_id = %cycle_id, standalone = %standalone, "Question disambiguated");

        transition(cycle_id, state, CycleState::Retrieving);
        let documents = self.retriever.retrieve(&standalone).await?;
        let docs_text = format_documents(&documents);

        transition(cycle_id, state, CycleState::Generating);
        let answer = self
            .generate
            .complete_text(context! {
                docs => docs_text,
                question => standalone,
            })
            .await?;

        transition(cycle_id, state, CycleState::Structuring);
        let raw: RawStructuredAnswer = self
            .structurize
            .complete_json(context! {
                initial_answer => answer,
                docs => docs_text,
            })
            .await?;
        let structured = self.validator.validate(raw, &answer, &documents)?;

        Ok((standalone, structured, documents.len()))
    }
}

fn transition(cycle_id: Uuid, state: &mut CycleState, to: CycleState) {
    tracing::debug!(cycle_id = %cycle_id, from = %state, to = %to, "Pipeline transition");
    *state = to;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alzqa_common::backend::GenerationParams;
    use alzqa_common::chat::Role;
    use alzqa_common::documents::RetrievedDocument;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedBackend {
        replies: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AppError::BackendUnavailable {
                    message: "Script exhausted".to_string(),
                })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct StubRetriever {
        documents: Vec<RetrievedDocument>,
    }

    #[async_trait]
    impl DocumentRetriever for StubRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedDocument>> {
            Ok(self.documents.clone())
        }
    }

    struct OfflineRetriever;

    #[async_trait]
    impl DocumentRetriever for OfflineRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedDocument>> {
            Err(AppError::RetrievalUnavailable {
                message: "index unreachable".to_string(),
            })
        }
    }

    fn make_documents() -> Vec<RetrievedDocument> {
        vec![
            RetrievedDocument::new(
                "Amyloid beta aggregation is the initiating event.",
                "art1.pdf",
                "Amyloid Cascade Review",
            ),
            RetrievedDocument::new(
                "Tau tangles correlate with cognitive decline.",
                "art2.pdf",
                "Tau Pathology Survey",
            ),
        ]
    }

    fn make_pipeline(
        retriever: Arc<dyn DocumentRetriever>,
        backend: Arc<dyn CompletionBackend>,
    ) -> QaPipeline {
        QaPipeline::new(retriever, backend, &AppConfig::default()).unwrap()
    }

    fn strict_pipeline(
        retriever: Arc<dyn DocumentRetriever>,
        backend: Arc<dyn CompletionBackend>,
    ) -> QaPipeline {
        let mut config = AppConfig::default();
        config.pipeline.strict_citations = true;
        QaPipeline::new(retriever, backend, &config).unwrap()
    }

    #[test]
    fn test_state_sequence() {
        let mut state = CycleState::Idle;
        let expected = [
            CycleState::Disambiguating,
            CycleState::Retrieving,
            CycleState::Generating,
            CycleState::Structuring,
            CycleState::Completed,
        ];
        for want in expected {
            assert!(!state.is_terminal());
            state = state.next();
            assert_eq!(state, want);
        }

        assert!(state.is_terminal());
        assert_eq!(CycleState::Completed.next(), CycleState::Completed);
        assert_eq!(CycleState::Failed.next(), CycleState::Failed);
        assert!(CycleState::Failed.is_terminal());
    }

    #[tokio::test]
    async fn test_end_to_end_cycle() {
        let answer_text = "Plaques build up when amyloid beta aggregates (Amyloid Cascade Review, art1.pdf), while tau tangles track later decline (Tau Pathology Survey, art2.pdf).";
        let structured_json = format!(
            r#"{{"message": {}, "sources": [{{"title": "Amyloid Cascade Review", "file": "art1.pdf"}}]}}"#,
            serde_json::to_string(answer_text).unwrap()
        );

        let backend = ScriptedBackend::new(&[
            "What causes amyloid plaque buildup?",
            answer_text,
            &structured_json,
        ]);
        let pipeline = make_pipeline(
            Arc::new(StubRetriever {
                documents: make_documents(),
            }),
            backend.clone(),
        );

        let mut conversation = Conversation::new();
        let cycle = pipeline
            .answer(&mut conversation, "What causes amyloid plaque buildup?")
            .await
            .unwrap();

        assert_eq!(cycle.standalone_query, "What causes amyloid plaque buildup?");
        assert_eq!(cycle.answer.message, answer_text);
        assert_eq!(cycle.retrieved, 2);
        assert_eq!(cycle.sources.len(), 1);
        assert_eq!(
            cycle.sources.get("art1.pdf").map(String::as_str),
            Some("Amyloid Cascade Review")
        );

        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.turns()[0].role, Role::User);
        assert_eq!(conversation.turns()[1].role, Role::Assistant);
        assert_eq!(conversation.turns()[1].text, answer_text);

        // The generation prompt carries the retrieved passages
        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1].contains("[file: art1.pdf | title: Amyloid Cascade Review]"));
        assert!(prompts[1].contains("Tau tangles correlate with cognitive decline."));
    }

    #[tokio::test]
    async fn test_disambiguation_window_is_bounded() {
        let answer_text = "Donepezil was dosed at 10mg daily (Amyloid Cascade Review, art1.pdf).";
        let structured_json = format!(
            r#"{{"message": {}, "sources": [{{"title": "Amyloid Cascade Review", "file": "art1.pdf"}}]}}"#,
            serde_json::to_string(answer_text).unwrap()
        );

        let backend = ScriptedBackend::new(&[
            "What dosage of donepezil was used in the trial?",
            answer_text,
            &structured_json,
        ]);
        let pipeline = make_pipeline(
            Arc::new(StubRetriever {
                documents: make_documents(),
            }),
            backend.clone(),
        );

        let mut conversation = Conversation::new();
        for i in 1..=99 {
            if i % 2 == 1 {
                conversation.push_user(format!("history entry {:03}", i));
            } else {
                conversation.push_assistant(format!("history entry {:03}", i));
            }
        }

        pipeline
            .answer(&mut conversation, "What about the dosage?")
            .await
            .unwrap();

        // 99 prior turns plus the new user turn; only the last 5 are visible
        let prompts = backend.prompts.lock().unwrap();
        let disambiguate_prompt = &prompts[0];
        assert!(disambiguate_prompt.contains("history entry 096"));
        assert!(disambiguate_prompt.contains("history entry 099"));
        assert!(disambiguate_prompt.contains("What about the dosage?"));
        assert!(!disambiguate_prompt.contains("history entry 095"));
        assert!(!disambiguate_prompt.contains("history entry 001"));
    }

    #[tokio::test]
    async fn test_identity_reformulation_passes_through() {
        let answer_text = "Tau forms tangles that track decline (Tau Pathology Survey, art2.pdf).";
        let structured_json = format!(
            r#"{{"message": {}, "sources": [{{"title": "Tau Pathology Survey", "file": "art2.pdf"}}]}}"#,
            serde_json::to_string(answer_text).unwrap()
        );

        // The model echoes the question with stray whitespace
        let backend = ScriptedBackend::new(&[
            "  What role does tau play in Alzheimer's disease?  \n",
            answer_text,
            &structured_json,
        ]);
        let pipeline = make_pipeline(
            Arc::new(StubRetriever {
                documents: make_documents(),
            }),
            backend,
        );

        let mut conversation = Conversation::new();
        let cycle = pipeline
            .answer(
                &mut conversation,
                "What role does tau play in Alzheimer's disease?",
            )
            .await
            .unwrap();

        assert_eq!(
            cycle.standalone_query,
            "What role does tau play in Alzheimer's disease?"
        );
    }

    #[tokio::test]
    async fn test_refusal_answer_still_structures() {
        let refusal =
            "The provided documents do not contain sufficient information about gene therapy.";
        let structured_json = format!(
            r#"{{"message": {}, "sources": []}}"#,
            serde_json::to_string(refusal).unwrap()
        );

        let backend = ScriptedBackend::new(&[
            "Can gene therapy reverse Alzheimer's disease?",
            refusal,
            &structured_json,
        ]);
        let pipeline = make_pipeline(
            Arc::new(StubRetriever {
                documents: make_documents(),
            }),
            backend,
        );

        let mut conversation = Conversation::new();
        let cycle = pipeline
            .answer(&mut conversation, "Can gene therapy reverse Alzheimer's disease?")
            .await
            .unwrap();

        assert!(cycle.sources.is_empty());
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.turns()[1].text, refusal);
    }

    #[tokio::test]
    async fn test_retrieval_failure_leaves_user_turn_only() {
        let backend = ScriptedBackend::new(&["What causes plaques?"]);
        let pipeline = make_pipeline(Arc::new(OfflineRetriever), backend);

        let mut conversation = Conversation::new();
        let err = pipeline
            .answer(&mut conversation, "What causes plaques?")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RetrievalUnavailable { .. }));
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.turns()[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_backend_failure_mid_cycle_keeps_user_turn_only() {
        // Script runs dry after disambiguation, failing the answer stage
        let backend = ScriptedBackend::new(&["What causes plaques?"]);
        let pipeline = make_pipeline(
            Arc::new(StubRetriever {
                documents: make_documents(),
            }),
            backend,
        );

        let mut conversation = Conversation::new();
        let err = pipeline
            .answer(&mut conversation, "What causes plaques?")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BackendUnavailable { .. }));
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_structure_output_fails_cycle() {
        let backend = ScriptedBackend::new(&[
            "What causes plaques?",
            "Amyloid beta aggregates (Amyloid Cascade Review, art1.pdf).",
            "I could not produce JSON, sorry.",
        ]);
        let pipeline = make_pipeline(
            Arc::new(StubRetriever {
                documents: make_documents(),
            }),
            backend,
        );

        let mut conversation = Conversation::new();
        let err = pipeline
            .answer(&mut conversation, "What causes plaques?")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::MalformedOutput { .. }));
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn test_lenient_mode_restores_mutated_answer() {
        let answer_text = "Amyloid beta aggregates (Amyloid Cascade Review, art1.pdf).";
        let backend = ScriptedBackend::new(&[
            "What causes plaques?",
            answer_text,
            r#"{"message": "A different paraphrase.", "sources": [{"title": "Amyloid Cascade Review", "file": "art1.pdf"}]}"#,
        ]);
        let pipeline = make_pipeline(
            Arc::new(StubRetriever {
                documents: make_documents(),
            }),
            backend,
        );

        let mut conversation = Conversation::new();
        let cycle = pipeline
            .answer(&mut conversation, "What causes plaques?")
            .await
            .unwrap();

        assert_eq!(cycle.answer.message, answer_text);
        assert_eq!(conversation.turns()[1].text, answer_text);
    }

    #[tokio::test]
    async fn test_strict_mode_fails_on_fabricated_source() {
        let answer_text = "Amyloid beta aggregates (Amyloid Cascade Review, art1.pdf).";
        let structured_json = format!(
            r#"{{"message": {}, "sources": [{{"title": "Fabricated Paper", "file": "ghost.pdf"}}]}}"#,
            serde_json::to_string(answer_text).unwrap()
        );

        let backend = ScriptedBackend::new(&[
            "What causes plaques?",
            answer_text,
            &structured_json,
        ]);
        let pipeline = strict_pipeline(
            Arc::new(StubRetriever {
                documents: make_documents(),
            }),
            backend,
        );

        let mut conversation = Conversation::new();
        let err = pipeline
            .answer(&mut conversation, "What causes plaques?")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::StructureInvariantViolation { .. }));
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected_before_any_turn() {
        let backend = ScriptedBackend::new(&[]);
        let pipeline = make_pipeline(
            Arc::new(StubRetriever {
                documents: make_documents(),
            }),
            backend.clone(),
        );

        let mut conversation = Conversation::new();
        let err = pipeline.answer(&mut conversation, "  \t ").await.unwrap_err();

        assert!(matches!(err, AppError::Validation { .. }));
        assert!(conversation.is_empty());
        assert!(backend.prompts.lock().unwrap().is_empty());
    }
}

//! AlzQA pipeline crate
//!
//! The multi-stage question-answering pipeline for the Alzheimer's
//! disease article corpus.
//!
//! Provides:
//! - Prompt templates and strict rendering
//! - The generic prompt stage executor
//! - Structured answer validation (echo and provenance invariants)
//! - `QaPipeline`, the per-cycle orchestrator

pub mod format;
pub mod pipeline;
pub mod stage;
pub mod structure;
pub mod templates;

// Re-export main types
pub use pipeline::{AnswerCycle, CycleState, QaPipeline};
pub use stage::PromptStage;
pub use structure::{RawStructuredAnswer, StructureValidator};
pub use templates::TemplateEngine;

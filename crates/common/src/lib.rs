//! AlzQA Common Library
//!
//! Shared code for the question-answering pipeline including:
//! - Error types and handling
//! - Configuration management
//! - Conversation state
//! - Document and structured-answer types
//! - Completion backend abstraction
//! - Metrics and telemetry

pub mod backend;
pub mod chat;
pub mod config;
pub mod documents;
pub mod errors;
pub mod metrics;
pub mod telemetry;

// Re-export commonly used types
pub use backend::{CompletionBackend, GenerationParams};
pub use chat::{Conversation, Role, Turn};
pub use config::AppConfig;
pub use documents::{RetrievedDocument, SourceMap, StructuredAnswer};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default OpenAI-compatible completion endpoint
pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";

/// Default model for disambiguation and answer generation
pub const DEFAULT_GENERATION_MODEL: &str = "google/gemma-3-27b-it:free";

/// Default model for answer structuring
pub const DEFAULT_STRUCTURING_MODEL: &str = "meta-llama/llama-3.3-70b-instruct:free";

/// Embedding model the article corpus is indexed with
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-mpnet-base-v2";

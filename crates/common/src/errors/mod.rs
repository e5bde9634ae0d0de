//! Error types for the AlzQA pipeline
//!
//! Provides a single error taxonomy with:
//! - Distinct error types for each failure mode of a question-answer cycle
//! - Machine-readable error codes for callers
//! - A transiency flag advertising which failures are worth retrying

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Input validation (1xxx)
    ValidationError,

    // Template errors (2xxx)
    MissingVariable,

    // Retrieval errors (3xxx)
    RetrievalUnavailable,

    // Completion backend errors (4xxx)
    BackendUnavailable,

    // Structuring errors (5xxx)
    MalformedOutput,
    StructureInvariantViolation,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,

            // Templates (2xxx)
            ErrorCode::MissingVariable => 2001,

            // Retrieval (3xxx)
            ErrorCode::RetrievalUnavailable => 3001,

            // Backend (4xxx)
            ErrorCode::BackendUnavailable => 4001,

            // Structuring (5xxx)
            ErrorCode::MalformedOutput => 5001,
            ErrorCode::StructureInvariantViolation => 5002,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    // Template errors
    #[error("Template '{template}' render failed: {message}")]
    MissingVariable { template: String, message: String },

    // Retrieval errors
    #[error("Retrieval unavailable: {message}")]
    RetrievalUnavailable { message: String },

    // Completion backend errors
    #[error("Completion backend unavailable: {message}")]
    BackendUnavailable { message: String },

    // Structuring errors
    #[error("Malformed structured output: {message}")]
    MalformedOutput { message: String },

    #[error("Structure invariant violated: {message}")]
    StructureInvariantViolation { message: String },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingVariable { .. } => ErrorCode::MissingVariable,
            AppError::RetrievalUnavailable { .. } => ErrorCode::RetrievalUnavailable,
            AppError::BackendUnavailable { .. } => ErrorCode::BackendUnavailable,
            AppError::MalformedOutput { .. } => ErrorCode::MalformedOutput,
            AppError::StructureInvariantViolation { .. } => {
                ErrorCode::StructureInvariantViolation
            }
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the failure is transient and worth retrying at the cycle level.
    ///
    /// The pipeline itself never retries; callers may wrap whole-cycle
    /// execution in their own retry policy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::RetrievalUnavailable { .. } | AppError::BackendUnavailable { .. }
        )
    }
}

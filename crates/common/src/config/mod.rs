//! Configuration management for the AlzQA pipeline
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values matching the production corpus deployment

use crate::backend::GenerationParams;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Completion backend configuration
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Query embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Similarity index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Retrieval tuning (MMR)
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Pipeline behavior
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionConfig {
    /// Completion provider: openrouter, mock
    #[serde(default = "default_completion_provider")]
    pub provider: String,

    /// OpenAI-compatible API base URL
    #[serde(default = "default_completion_api_base")]
    pub api_base: String,

    /// API key; falls back to the OPENROUTER_API_KEY environment variable
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,

    /// Generation parameters for the disambiguation stage
    #[serde(default = "default_disambiguate_params")]
    pub disambiguate: GenerationParams,

    /// Generation parameters for the answer stage
    #[serde(default = "default_generate_params")]
    pub generate: GenerationParams,

    /// Generation parameters for the structuring stage
    #[serde(default = "default_structure_params")]
    pub structure: GenerationParams,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: http, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for the embedding service (if it requires one)
    pub api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[serde(default = "default_embedding_api_base")]
    pub api_base: String,

    /// Model the corpus was indexed with
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Base URL of the similarity index server
    #[serde(default = "default_index_url")]
    pub url: String,

    /// Collection holding the article corpus
    #[serde(default = "default_index_collection")]
    pub collection: String,

    /// Request timeout in seconds
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Number of documents returned per query
    #[serde(default = "default_retrieval_k")]
    pub k: usize,

    /// Candidate pool size fetched from the index before re-ranking
    #[serde(default = "default_retrieval_fetch_k")]
    pub fetch_k: usize,

    /// Relevance/diversity trade-off, 1.0 = pure relevance
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Number of recent turns visible to the disambiguator
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Fail the cycle on echo/provenance violations instead of repairing
    #[serde(default = "default_strict_citations")]
    pub strict_citations: bool,
}

// Default value functions
fn default_completion_provider() -> String { "openrouter".to_string() }
fn default_completion_api_base() -> String { crate::DEFAULT_API_BASE.to_string() }
fn default_completion_timeout() -> u64 { 60 }
fn default_embedding_provider() -> String { "http".to_string() }
fn default_embedding_api_base() -> String { "http://localhost:8080/v1".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_timeout() -> u64 { 30 }
fn default_index_url() -> String { "http://localhost:8000".to_string() }
fn default_index_collection() -> String { "articles".to_string() }
fn default_index_timeout() -> u64 { 30 }
fn default_retrieval_k() -> usize { 5 }
fn default_retrieval_fetch_k() -> usize { 35 }
fn default_mmr_lambda() -> f32 { 0.3 }
fn default_history_window() -> usize { 5 }
fn default_strict_citations() -> bool { false }

fn default_disambiguate_params() -> GenerationParams {
    GenerationParams {
        model: crate::DEFAULT_GENERATION_MODEL.to_string(),
        temperature: 0.2,
        max_output_tokens: Some(2000),
    }
}

fn default_generate_params() -> GenerationParams {
    GenerationParams {
        model: crate::DEFAULT_GENERATION_MODEL.to_string(),
        temperature: 0.2,
        max_output_tokens: Some(2000),
    }
}

fn default_structure_params() -> GenerationParams {
    GenerationParams {
        model: crate::DEFAULT_STRUCTURING_MODEL.to_string(),
        temperature: 0.0,
        max_output_tokens: None,
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        // Pick up OPENROUTER_API_KEY and friends from a local .env if present
        dotenvy::dotenv().ok();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__K=10
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl CompletionConfig {
    /// Resolve the API key, falling back to OPENROUTER_API_KEY
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EmbeddingConfig {
    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl IndexConfig {
    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            api_base: default_completion_api_base(),
            api_key: None,
            timeout_secs: default_completion_timeout(),
            disambiguate: default_disambiguate_params(),
            generate: default_generate_params(),
            structure: default_structure_params(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: default_embedding_api_base(),
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: default_index_url(),
            collection: default_index_collection(),
            timeout_secs: default_index_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_retrieval_k(),
            fetch_k: default_retrieval_fetch_k(),
            mmr_lambda: default_mmr_lambda(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            strict_citations: default_strict_citations(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            completion: CompletionConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

//! Prompt templates and rendering
//!
//! Provides:
//! - The built-in prompt templates for the three pipeline stages
//! - `TemplateEngine` wrapping a strict Jinja environment

use alzqa_common::errors::{AppError, Result};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

/// Template name for the standalone-question rewrite stage
pub const DISAMBIGUATE: &str = "disambiguate";
/// Template name for the grounded answer stage
pub const GENERATE: &str = "generate";
/// Template name for the citation structuring stage
pub const STRUCTURIZE: &str = "structurize";

const DISAMBIGUATE_SOURCE: &str = r#"Given a chat history and the latest user question which might reference context in the chat history,
formulate a standalone question which can be understood without the chat history. Do NOT answer the question,
just reformulate it if needed and otherwise return it as is.

Chat History:
{{ chat_history }}

Latest Question:
{{ question }}

Standalone Question:
"#;

const GENERATE_SOURCE: &str = r#"You are a scientific assistant specializing in Alzheimer's disease research. Your task is to answer questions based ONLY on the provided context from scientific articles.

STRICT RULES:
1. Answer ONLY using information explicitly stated in the context below
2. If the context does not contain enough information to answer fully, say "The provided documents do not contain sufficient information about [topic]"
3. Never use external knowledge or make assumptions beyond the given text
4. Always cite the sources: include article titles and DOI/URLs when mentioning findings

CONTEXT:
{{ docs }}

QUESTION: {{ question }}

ANSWER (cite sources with titles and links):"#;

const STRUCTURIZE_SOURCE: &str = r#"You are a formatting assistant.
Input:
1. An "Answer" text.
2. A list of "Source Documents" with metadata.

Task:
Return a JSON object with two keys:
- "message": The exact "Answer" text provided below.
- "sources": A list of objects ["title": "...", "file": "..."] for every document from the "Source Documents" list that supports the answer.

Answer:
{{ initial_answer }}

Source Documents:
{{ docs }}
"#;

/// Strict template renderer shared by all pipeline stages
///
/// Every placeholder must be bound at render time; an unbound variable
/// fails with `MissingVariable` instead of rendering as empty text.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create an engine with the three built-in stage templates registered
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        env.add_template(DISAMBIGUATE, DISAMBIGUATE_SOURCE)
            .map_err(|e| AppError::Internal {
                message: format!("Failed to register template '{}': {}", DISAMBIGUATE, e),
            })?;
        env.add_template(GENERATE, GENERATE_SOURCE)
            .map_err(|e| AppError::Internal {
                message: format!("Failed to register template '{}': {}", GENERATE, e),
            })?;
        env.add_template(STRUCTURIZE, STRUCTURIZE_SOURCE)
            .map_err(|e| AppError::Internal {
                message: format!("Failed to register template '{}': {}", STRUCTURIZE, e),
            })?;

        Ok(Self { env })
    }

    /// Register an additional template under the given name
    pub fn register(&mut self, name: &'static str, source: &'static str) -> Result<()> {
        self.env
            .add_template(name, source)
            .map_err(|e| AppError::Internal {
                message: format!("Failed to register template '{}': {}", name, e),
            })
    }

    /// Render the named template with the given variables
    pub fn render<S: Serialize>(&self, name: &str, variables: S) -> Result<String> {
        let template = self.env.get_template(name).map_err(|e| AppError::Internal {
            message: format!("Unknown template '{}': {}", name, e),
        })?;

        template.render(variables).map_err(|e| match e.kind() {
            minijinja::ErrorKind::UndefinedError => AppError::MissingVariable {
                template: name.to_string(),
                message: e.to_string(),
            },
            _ => AppError::Internal {
                message: format!("Failed to render template '{}': {}", name, e),
            },
        })
    }
}

//! Generic prompt stage executor
//!
//! One parameterized unit drives all three pipeline stages: render a
//! template with bound variables, invoke the completion backend with
//! stage-specific generation parameters, and return either raw text or
//! a parsed JSON object.

use crate::templates::TemplateEngine;
use alzqa_common::backend::{CompletionBackend, GenerationParams};
use alzqa_common::errors::{AppError, Result};
use alzqa_common::metrics::StageTimer;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// A single pipeline stage: template + generation parameters + backend
pub struct PromptStage {
    name: &'static str,
    params: GenerationParams,
    engine: Arc<TemplateEngine>,
    backend: Arc<dyn CompletionBackend>,
}

impl PromptStage {
    /// Create a stage bound to a registered template
    pub fn new(
        name: &'static str,
        params: GenerationParams,
        engine: Arc<TemplateEngine>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            name,
            params,
            engine,
            backend,
        }
    }

    /// Stage name, shared with the template and metric labels
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Render the stage template without calling the backend
    pub fn render<S: Serialize>(&self, variables: S) -> Result<String> {
        self.engine.render(self.name, variables)
    }

    /// Render and complete, returning the backend's raw text
    pub async fn complete_text<S: Serialize>(&self, variables: S) -> Result<String> {
        let prompt = self.render(variables)?;

        let timer = StageTimer::start(self.name);
        let result = self.backend.complete(&prompt, &self.params).await;
        timer.finish();

        let text = result?;
        tracing::debug!(
            stage = self.name,
            model = %self.params.model,
            chars = text.len(),
            "Stage completed"
        );

        Ok(text)
    }

    /// Render and complete, parsing the backend's reply as JSON
    pub async fn complete_json<T, S>(&self, variables: S) -> Result<T>
    where
        T: DeserializeOwned,
        S: Serialize,
    {
        let text = self.complete_text(variables).await?;
        parse_json(&text)
    }
}

/// Parse a model reply as JSON, tolerating markdown fences and prose
/// around the object. Anything else is a hard `MalformedOutput`.
fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let stripped = strip_code_fence(text);

    match serde_json::from_str(stripped) {
        Ok(value) => Ok(value),
        Err(parse_err) => {
            // Some models wrap the object in explanatory prose; retry on
            // the outermost brace span before giving up.
            if let (Some(start), Some(end)) = (stripped.find('{'), stripped.rfind('}')) {
                if start < end {
                    if let Ok(value) = serde_json::from_str(&stripped[start..=end]) {
                        return Ok(value);
                    }
                }
            }

            let preview: String = text.chars().take(160).collect();
            Err(AppError::MalformedOutput {
                message: format!("Failed to parse model output as JSON: {} ({})", parse_err, preview),
            })
        }
    }
}

/// Strip a surrounding ```/```json markdown fence if present
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates;
    use async_trait::async_trait;
    use minijinja::context;
    use std::sync::Mutex;

    struct CapturingBackend {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl CapturingBackend {
        fn new(reply: impl Into<String>) -> Self {
            Self {
                reply: reply.into(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for CapturingBackend {
        async fn complete(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }

        fn name(&self) -> &str {
            "capturing"
        }
    }

    fn make_stage(backend: Arc<CapturingBackend>) -> PromptStage {
        let engine = Arc::new(TemplateEngine::new().unwrap());
        let params = GenerationParams {
            model: "test-model".to_string(),
            temperature: 0.2,
            max_output_tokens: None,
        };
        PromptStage::new(templates::DISAMBIGUATE, params, engine, backend)
    }

    #[tokio::test]
    async fn test_complete_text_renders_variables_into_prompt() {
        let backend = Arc::new(CapturingBackend::new("What is tau phosphorylation?"));
        let stage = make_stage(backend.clone());

        let text = stage
            .complete_text(context! {
                chat_history => "user: What is tau?",
                question => "What about its phosphorylation?",
            })
            .await
            .unwrap();

        assert_eq!(text, "What is tau phosphorylation?");
        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("user: What is tau?"));
        assert!(prompts[0].contains("What about its phosphorylation?"));
    }

    #[tokio::test]
    async fn test_missing_variable_skips_backend_call() {
        let backend = Arc::new(CapturingBackend::new("unused"));
        let stage = make_stage(backend.clone());

        let err = stage
            .complete_text(context! { question => "only one" })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::MissingVariable { .. }));
        assert!(backend.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_json_parses_fenced_reply() {
        let backend = Arc::new(CapturingBackend::new(
            "```json\n{\"message\": \"hi\", \"sources\": []}\n```",
        ));
        let stage = make_stage(backend);

        let value: serde_json::Value = stage
            .complete_json(context! {
                chat_history => "",
                question => "q",
            })
            .await
            .unwrap();

        assert_eq!(value["message"], "hi");
    }

    #[tokio::test]
    async fn test_complete_json_rejects_non_json() {
        let backend = Arc::new(CapturingBackend::new("Sorry, I cannot do that."));
        let stage = make_stage(backend);

        let err = stage
            .complete_json::<serde_json::Value, _>(context! {
                chat_history => "",
                question => "q",
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::MalformedOutput { .. }));
    }

    #[test]
    fn test_parse_json_extracts_object_from_prose() {
        let value: serde_json::Value =
            parse_json("Here is the JSON you asked for: {\"a\": 1} hope that helps").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_strip_code_fence_variants() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }
}

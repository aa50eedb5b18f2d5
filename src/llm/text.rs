//! Text generation: definition, example sentence and image description.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, info, warn};

use crate::config::PromptTemplates;
use crate::error::{Error, Result};
use crate::telemetry::genai::start_chat_span;
use crate::telemetry::metrics;

/// Prefix of every fallback definition. Callers tell fallback content apart
/// from real content by this marker only.
pub const FALLBACK_MARKER: &str = "Failed to generate definition for";

/// Upper bound on one text completion. The rig client sets none of its own.
pub const DEFAULT_TEXT_TIMEOUT: Duration = Duration::from_secs(60);

/// A remote chat-completion call.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Model name, for spans and logs.
    fn name(&self) -> &str;

    /// Send one system/user prompt pair and return the raw reply text.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// rig-core backed OpenAI chat model.
pub struct RigTextModel {
    client: rig::providers::openai::Client,
    model: String,
}

impl RigTextModel {
    pub fn new(client: rig::providers::openai::Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextModel for RigTextModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let agent = self.client.agent(&self.model).preamble(system).build();
        agent
            .prompt(user)
            .await
            .map_err(|e| Error::Llm(e.to_string()))
    }
}

/// The structured document a text model must return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedText {
    pub definition: String,
    pub example: String,
    pub image_prompt: String,
}

impl GeneratedText {
    /// The deterministic document returned when generation fails.
    pub fn fallback(word: &str, error: &str) -> Self {
        Self {
            definition: format!("{FALLBACK_MARKER} {word}. Error: {error}"),
            example: format!("Could not generate example sentence for {word}"),
            image_prompt: format!("Simple illustration of the concept: {word}"),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.definition.starts_with(FALLBACK_MARKER)
    }

    /// Parse a model reply. Tolerates markdown code fences and chatter
    /// around the JSON object; all three fields must be present and non-empty.
    pub fn parse(raw: &str) -> Result<Self> {
        let start = raw
            .find('{')
            .ok_or_else(|| Error::Llm("reply contains no JSON object".to_string()))?;
        let end = raw
            .rfind('}')
            .filter(|end| *end > start)
            .ok_or_else(|| Error::Llm("reply contains no JSON object".to_string()))?;

        let parsed: GeneratedText = serde_json::from_str(&raw[start..=end])
            .map_err(|e| Error::Llm(format!("malformed reply: {e}")))?;

        for (field, value) in [
            ("definition", &parsed.definition),
            ("example", &parsed.example),
            ("imagePrompt", &parsed.image_prompt),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Llm(format!("reply has empty {field}")));
            }
        }
        Ok(parsed)
    }
}

/// Word → [`GeneratedText`], with prompt templating and fallback.
#[derive(Clone)]
pub struct TextAdapter {
    model: Arc<dyn TextModel>,
    prompts: Arc<PromptTemplates>,
    timeout: Duration,
}

impl TextAdapter {
    pub fn new(model: Arc<dyn TextModel>, prompts: Arc<PromptTemplates>) -> Self {
        Self {
            model,
            prompts,
            timeout: DEFAULT_TEXT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Generate content for `word`. Never fails: errors become the fallback.
    pub async fn generate(&self, word: &str) -> GeneratedText {
        let user = self.prompts.render_user(word);
        let span = start_chat_span(self.model.name(), "openai");

        let result = async {
            let call = self.model.complete(&self.prompts.system_prompt, &user);
            let raw = tokio::time::timeout(self.timeout, call)
                .await
                .map_err(|_| {
                    Error::Llm(format!("timed out after {}s", self.timeout.as_secs_f64()))
                })??;
            debug!(word, raw = %raw, "raw text reply");
            GeneratedText::parse(&raw)
        }
        .instrument(span)
        .await;

        match result {
            Ok(text) => {
                info!(word, "text generated");
                metrics::generation_outcomes().add(
                    1,
                    &[
                        KeyValue::new("stage", "text"),
                        KeyValue::new("result", "ok"),
                    ],
                );
                text
            }
            Err(e) => {
                warn!(word, error = %e, "text generation failed, using fallback");
                metrics::generation_outcomes().add(
                    1,
                    &[
                        KeyValue::new("stage", "text"),
                        KeyValue::new("result", "fallback"),
                    ],
                );
                GeneratedText::fallback(word, &e.to_string())
            }
        }
    }
}

//! Image generation: one square illustration per word.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{Instrument, info, warn};

use crate::config::PromptTemplates;
use crate::error::{Error, Result};
use crate::telemetry::genai::start_image_span;
use crate::telemetry::metrics;

/// What an image model handed back.
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePayload {
    /// Base64-encoded bytes returned inline.
    Inline { b64: String, mime: String },
    /// A link to the rendered image.
    Remote(String),
}

impl ImagePayload {
    /// Normalize to something a card or browser can embed directly.
    pub fn into_url(self) -> String {
        match self {
            ImagePayload::Inline { b64, mime } => format!("data:{mime};base64,{b64}"),
            ImagePayload::Remote(url) => url,
        }
    }
}

/// Result of the image stage. Distinguishes "nothing asked for" from
/// "asked for and failed" so failures stay visible.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    NotRequested,
    Ready(String),
    Failed(String),
}

impl ImageOutcome {
    pub fn url(&self) -> Option<&str> {
        match self {
            ImageOutcome::Ready(url) => Some(url),
            _ => None,
        }
    }
}

/// A remote image-generation call.
#[async_trait]
pub trait ImageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Render exactly one square image for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<ImagePayload>;
}

/// OpenAI `/images/generations` client.
pub struct OpenAiImages {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
    url: Option<String>,
}

impl OpenAiImages {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    /// Pick the first image out of an images response body.
    pub fn payload_from_response(body: &str) -> Result<ImagePayload> {
        let parsed: ImagesResponse = serde_json::from_str(body)?;
        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("image response contained no images".to_string()))?;
        match (datum.b64_json, datum.url) {
            (Some(b64), _) if !b64.is_empty() => Ok(ImagePayload::Inline {
                b64,
                mime: "image/png".to_string(),
            }),
            (_, Some(url)) if !url.is_empty() => Ok(ImagePayload::Remote(url)),
            _ => Err(Error::Llm("image response had neither b64_json nor url".to_string())),
        }
    }
}

#[async_trait]
impl ImageModel for OpenAiImages {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<ImagePayload> {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "size": "1024x1024",
            "n": 1,
        });
        // Only the gpt-image family understands quality tiers.
        if self.model.starts_with("gpt-image") {
            body["quality"] = serde_json::json!("medium");
        }

        let response = self
            .http
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Llm(format!("image generation returned {status}: {text}")));
        }
        Self::payload_from_response(&text)
    }
}

/// Scene description → [`ImageOutcome`].
#[derive(Clone)]
pub struct ImageAdapter {
    model: Arc<dyn ImageModel>,
    prompts: Arc<PromptTemplates>,
}

impl ImageAdapter {
    pub fn new(model: Arc<dyn ImageModel>, prompts: Arc<PromptTemplates>) -> Self {
        Self { model, prompts }
    }

    /// Render an illustration for `description`. Never fails.
    pub async fn generate(&self, description: &str) -> ImageOutcome {
        if description.trim().is_empty() {
            return ImageOutcome::NotRequested;
        }

        let prompt = self.prompts.render_image(description);
        let span = start_image_span(self.model.name(), "openai");
        let result = self.model.generate(&prompt).instrument(span).await;

        let (outcome, label) = match result {
            Ok(payload) => {
                info!(model = self.model.name(), "image generated");
                (ImageOutcome::Ready(payload.into_url()), "ok")
            }
            Err(e) => {
                warn!(model = self.model.name(), error = %e, "image generation failed");
                (ImageOutcome::Failed(e.to_string()), "failed")
            }
        };
        metrics::generation_outcomes().add(
            1,
            &[KeyValue::new("stage", "image"), KeyValue::new("result", label)],
        );
        outcome
    }
}

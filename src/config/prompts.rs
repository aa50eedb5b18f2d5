//! Prompt templates for the generative services.
//!
//! Defaults are built in. An optional TOML file overrides any subset:
//!
//! ```toml
//! [prompts]
//! system = "You are a vocabulary tutor..."
//! user_template = "For the word \"{{WORD}}\", provide..."
//! image_prefix = "Ukiyo-e woodblock print: {{IMAGE_DESCRIPTION}}"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Placeholder substituted with the submitted word.
pub const WORD_PLACEHOLDER: &str = "{{WORD}}";

/// Placeholder substituted with the generated scene description.
pub const IMAGE_DESCRIPTION_PLACEHOLDER: &str = "{{IMAGE_DESCRIPTION}}";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a GRE vocabulary tutor. Create educational content for vocabulary words. Always respond with valid JSON format.";

const DEFAULT_USER_TEMPLATE: &str = r#"For the GRE word "{{WORD}}", provide:
1. A clear, concise definition suitable for GRE test preparation
2. An example sentence that demonstrates the word's usage in context
3. A vivid, memorable visual scene description that would help someone remember this word (describe an image that connects the word's meaning to a memorable scenario)

Format your response as JSON:
{
  "definition": "...",
  "example": "...",
  "imagePrompt": "..."
}"#;

const DEFAULT_IMAGE_PREFIX: &str = "Educational illustration: {{IMAGE_DESCRIPTION}}. Style: clean, simple, educational diagram suitable for vocabulary learning.";

/// Active prompt templates, as read back by the `config` command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptTemplates {
    pub system_prompt: String,
    pub user_prompt_template: String,
    pub image_prompt_prefix: String,
    /// True when a prompts file was found and applied.
    pub is_custom: bool,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_prompt_template: DEFAULT_USER_TEMPLATE.to_string(),
            image_prompt_prefix: DEFAULT_IMAGE_PREFIX.to_string(),
            is_custom: false,
        }
    }
}

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct PromptsFile {
    #[serde(default)]
    prompts: PromptOverrides,
}

#[derive(Debug, Default, Deserialize)]
struct PromptOverrides {
    system: Option<String>,
    user_template: Option<String>,
    image_prefix: Option<String>,
}

impl PromptTemplates {
    /// Load overrides from `path`, falling back to defaults when it is absent.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("using default prompts (no {} found)", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let templates = Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("bad prompts file {}: {e}", path.display())))?;
        info!(path = %path.display(), "custom prompts loaded");
        Ok(templates)
    }

    /// Parse a prompts document. Fields left out keep their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: PromptsFile =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        let defaults = Self::default();
        let pick = |v: Option<String>, d: String| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(d)
        };
        Ok(Self {
            system_prompt: pick(file.prompts.system, defaults.system_prompt),
            user_prompt_template: pick(file.prompts.user_template, defaults.user_prompt_template),
            image_prompt_prefix: pick(file.prompts.image_prefix, defaults.image_prompt_prefix),
            is_custom: true,
        })
    }

    /// The user prompt for `word`.
    pub fn render_user(&self, word: &str) -> String {
        self.user_prompt_template.replace(WORD_PLACEHOLDER, word)
    }

    /// The full image prompt for a scene description.
    pub fn render_image(&self, description: &str) -> String {
        self.image_prompt_prefix
            .replace(IMAGE_DESCRIPTION_PLACEHOLDER, description)
    }
}

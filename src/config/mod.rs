//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

pub mod prompts;

use crate::error::{Error, Result};
use crate::model::ExportPolicy;
use secrecy::SecretString;
use std::path::PathBuf;

pub use prompts::PromptTemplates;

#[derive(Debug)]
pub struct Config {
    pub openai_api_key: SecretString,
    pub openai_base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub anki_connect_url: String,
    pub deck_name: String,
    pub state_file: PathBuf,
    pub prompts_file: PathBuf,
    pub max_concurrent: usize,
    pub export_policy: ExportPolicy,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::Config("required environment variable OPENAI_API_KEY is not set".into())
            })?;

        let max_concurrent = match lookup("MAX_CONCURRENT") {
            Some(v) => v.parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
                Error::Config(format!("MAX_CONCURRENT must be a positive integer, got {v:?}"))
            })?,
            None => 3,
        };

        let export_policy = match lookup("REQUIRE_APPROVAL").as_deref() {
            Some("1" | "true" | "yes") => ExportPolicy::ApprovedOnly,
            Some("0" | "false" | "no" | "") | None => ExportPolicy::Generated,
            Some(other) => {
                return Err(Error::Config(format!(
                    "REQUIRE_APPROVAL must be true or false, got {other:?}"
                )));
            }
        };

        Ok(Self {
            openai_api_key: SecretString::from(openai_api_key),
            openai_base_url: var("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            text_model: var("TEXT_MODEL", "gpt-5-mini"),
            image_model: var("IMAGE_MODEL", "gpt-image-1"),
            anki_connect_url: var("ANKI_CONNECT_URL", "http://localhost:8765"),
            deck_name: var("ANKI_DECK_NAME", "GRE Vocabulary"),
            state_file: PathBuf::from(var("STATE_FILE", "word-queue.json")),
            prompts_file: PathBuf::from(var("PROMPTS_FILE", "lexideck.toml")),
            max_concurrent,
            export_policy,
            otel_endpoint: lookup("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL", "info"),
        })
    }
}

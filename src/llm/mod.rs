//! Generative-service adapters.
//!
//! Two independent adapters sit on top of two narrow model traits:
//!
//! - [`TextAdapter`] renders the prompt pair for a word, calls a
//!   [`TextModel`] and parses the reply into a [`GeneratedText`]. It never
//!   fails; a transport or parse error turns into a fallback document.
//! - [`ImageAdapter`] renders the image prompt, calls an [`ImageModel`]
//!   and normalizes the result into an [`ImageOutcome`].
//!
//! Production text generation goes through rig-core's OpenAI provider;
//! image generation calls the OpenAI images endpoint directly with reqwest
//! so both inline (`b64_json`) and linked (`url`) results can be handled.
//! Both use the same configured base URL.

pub mod image;
pub mod text;

pub use image::{ImageAdapter, ImageModel, ImageOutcome, ImagePayload, OpenAiImages};
pub use text::{GeneratedText, RigTextModel, TextAdapter, TextModel};

use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result};

/// Create an OpenAI client from a secret API key, pointed at `base_url`
/// (e.g. `https://api.openai.com/v1` or a compatible proxy).
///
/// # Errors
/// Returns an error if the underlying HTTP client cannot be constructed.
pub fn openai_client(
    api_key: &SecretString,
    base_url: &str,
) -> Result<rig::providers::openai::Client> {
    rig::providers::openai::Client::builder()
        .api_key(api_key.expose_secret())
        .base_url(base_url.trim_end_matches('/'))
        .build()
        .map_err(|e| Error::Llm(format!("failed to create OpenAI client: {e}")))
}

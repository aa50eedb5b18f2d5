//! Card assembly: HTML body, illustration upload, `addNote`.

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::FlashcardRpc;
use crate::error::{Error, Result};

/// Note id returned by `addNote`.
pub type NoteId = i64;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

const NOTE_NOT_DOWNLOADED: &str =
    r#"<p style="color: #666; font-size: 12px;">Note: AI image could not be downloaded</p>"#;
const NOTE_NOT_STORED: &str =
    r#"<p style="color: #666; font-size: 12px;">Note: AI image could not be stored</p>"#;

/// Where and how notes are created.
#[derive(Debug, Clone)]
pub struct CardOptions {
    pub deck_name: String,
    pub model_name: String,
    pub tags: Vec<String>,
    /// Leading part of every uploaded media filename.
    pub media_prefix: String,
}

impl Default for CardOptions {
    fn default() -> Self {
        Self {
            deck_name: "GRE Vocabulary".to_string(),
            model_name: "Basic".to_string(),
            tags: vec![
                "gre".to_string(),
                "vocabulary".to_string(),
                "ai-generated".to_string(),
            ],
            media_prefix: "gre".to_string(),
        }
    }
}

/// Raw image bytes ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaData {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl MediaData {
    /// Decode a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| Error::Other("not a data URL".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::Other("data URL has no payload".to_string()))?;
        let (mime, encoding) = header.split_once(';').unwrap_or((header, ""));
        if encoding != "base64" {
            return Err(Error::Other(format!(
                "unsupported data URL encoding: {header}"
            )));
        }
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| Error::Other(format!("bad base64 image data: {e}")))?;
        let mime = if mime.is_empty() { "image/png" } else { mime };
        Ok(Self {
            bytes,
            mime: mime.to_string(),
        })
    }

    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

/// Media filename unique per word and upload time:
/// `{prefix}_{sanitized word}_{md5(word + salt)}.{ext}`.
pub fn media_filename(prefix: &str, word: &str, salt: i64, extension: &str) -> String {
    let hash = md5::compute(format!("{word}{salt}").as_bytes());
    let sanitized: String = word
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{prefix}_{sanitized}_{hash:x}.{extension}")
}

/// Card back: definition and example, HTML-escaped.
pub fn card_back(definition: &str, example: &str) -> String {
    format!(
        "<div style=\"font-family: Arial, sans-serif;\">\n\
         <p><strong>Definition:</strong> {}</p>\n\
         <p><strong>Example:</strong> <em>{}</em></p>",
        html_escape::encode_text(definition),
        html_escape::encode_text(example),
    )
}

/// Creates notes through a [`FlashcardRpc`].
#[derive(Clone)]
pub struct CardWriter {
    rpc: Arc<dyn FlashcardRpc>,
    http: reqwest::Client,
    options: CardOptions,
}

impl CardWriter {
    pub fn new(rpc: Arc<dyn FlashcardRpc>, options: CardOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(Self { rpc, http, options })
    }

    pub fn rpc(&self) -> &dyn FlashcardRpc {
        self.rpc.as_ref()
    }

    pub fn options(&self) -> &CardOptions {
        &self.options
    }

    /// Normalize an image reference (data URL or remote URL) to bytes.
    pub async fn fetch_media(&self, image_ref: &str) -> Result<MediaData> {
        if image_ref.starts_with("data:") {
            return MediaData::from_data_url(image_ref);
        }

        let response = self
            .http
            .get(image_ref)
            .send()
            .await?
            .error_for_status()?;
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| "image/png".to_string());
        let bytes = response.bytes().await?.to_vec();
        info!(bytes = bytes.len(), mime = %mime, "image downloaded");
        Ok(MediaData { bytes, mime })
    }

    /// Upload media via `storeMediaFile`, returning the stored filename.
    pub async fn store_media(&self, word: &str, media: &MediaData) -> Result<String> {
        let filename = media_filename(
            &self.options.media_prefix,
            word,
            chrono::Utc::now().timestamp_millis(),
            media.extension(),
        );
        self.rpc
            .call(
                "storeMediaFile",
                json!({
                    "filename": filename,
                    "data": BASE64.encode(&media.bytes),
                }),
            )
            .await?;
        Ok(filename)
    }

    /// The illustration fragment for the card back. Never fails: problems
    /// turn into a visible note instead of an `<img>` tag.
    async fn image_fragment(&self, word: &str, image_ref: &str) -> String {
        let media = match self.fetch_media(image_ref).await {
            Ok(media) => media,
            Err(e) => {
                warn!(word, error = %e, "could not download image");
                return NOTE_NOT_DOWNLOADED.to_string();
            }
        };
        match self.store_media(word, &media).await {
            Ok(filename) => {
                info!(word, filename = %filename, "image stored in Anki");
                format!(r#"<br><img src="{filename}" style="max-width: 300px; margin-top: 10px;">"#)
            }
            Err(e) => {
                warn!(word, error = %e, "could not store image");
                NOTE_NOT_STORED.to_string()
            }
        }
    }

    /// Create one Basic note for `word`.
    ///
    /// Illustration problems never block the note; an `addNote` failure
    /// is returned to the caller.
    pub async fn create_card(
        &self,
        word: &str,
        definition: &str,
        example: &str,
        image_ref: Option<&str>,
    ) -> Result<NoteId> {
        let mut back = card_back(definition, example);
        if let Some(image_ref) = image_ref.filter(|r| !r.is_empty()) {
            back.push('\n');
            back.push_str(&self.image_fragment(word, image_ref).await);
        }
        back.push_str("\n</div>");

        let result = self
            .rpc
            .call(
                "addNote",
                json!({
                    "note": {
                        "deckName": self.options.deck_name,
                        "modelName": self.options.model_name,
                        "fields": {
                            "Front": word,
                            "Back": back,
                        },
                        "tags": self.options.tags,
                    }
                }),
            )
            .await?;

        let id = note_id(&result)?;
        info!(word, note_id = id, "card created");
        Ok(id)
    }
}

fn note_id(result: &Value) -> Result<NoteId> {
    result.as_i64().ok_or_else(|| Error::Rpc {
        action: "addNote".to_string(),
        message: format!("unexpected result: {result}"),
    })
}

//! In-memory fakes for the generative services and AnkiConnect.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lexideck::anki::FlashcardRpc;
use lexideck::error::{Error, Result};
use lexideck::llm::{ImageModel, ImagePayload, TextModel};
use serde_json::{Value, json};

/// A 1x1 transparent PNG, base64 encoded.
pub const TINY_PNG_B64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

pub fn tiny_png_data_url() -> String {
    format!("data:image/png;base64,{TINY_PNG_B64}")
}

/// Text model answering with well-formed JSON, except for words it is told
/// to fail on.
#[derive(Default)]
pub struct FakeText {
    pub failing: HashSet<String>,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeText {
    pub fn failing_on(words: &[&str]) -> Self {
        Self {
            failing: words.iter().map(|w| w.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl TextModel for FakeText {
    fn name(&self) -> &str {
        "fake-text"
    }

    async fn complete(&self, _system: &str, user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        // The default template quotes the word: For the GRE word "lucid", ...
        let word = user.split('"').nth(1).unwrap_or("unknown").to_string();
        if self.failing.contains(&word) {
            return Err(Error::Llm("model overloaded".to_string()));
        }
        Ok(json!({
            "definition": format!("meaning of {word}"),
            "example": format!("A sentence using {word}."),
            "imagePrompt": format!("a scene about {word}"),
        })
        .to_string())
    }
}

/// Image model returning a tiny inline PNG, or failing.
#[derive(Default)]
pub struct FakeImage {
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl ImageModel for FakeImage {
    fn name(&self) -> &str {
        "fake-image"
    }

    async fn generate(&self, _prompt: &str) -> Result<ImagePayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Llm("content policy".to_string()));
        }
        Ok(ImagePayload::Inline {
            b64: TINY_PNG_B64.to_string(),
            mime: "image/png".to_string(),
        })
    }
}

/// AnkiConnect stand-in that records every call.
#[derive(Default)]
pub struct RecordingRpc {
    pub calls: Mutex<Vec<(String, Value)>>,
    /// Actions that always fail.
    pub failing_actions: HashSet<String>,
    /// Words whose `addNote` fails.
    pub failing_words: HashSet<String>,
    next_id: AtomicI64,
}

impl RecordingRpc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_failing_actions(actions: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing_actions: actions.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn with_failing_words(words: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing_words: words.iter().map(|w| w.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn calls_to(&self, action: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| a == action)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl FlashcardRpc for RecordingRpc {
    async fn call(&self, action: &str, params: Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((action.to_string(), params.clone()));

        if self.failing_actions.contains(action) {
            return Err(Error::Rpc {
                action: action.to_string(),
                message: "collection is not available".to_string(),
            });
        }

        match action {
            "version" => Ok(json!(6)),
            "storeMediaFile" => Ok(params["filename"].clone()),
            "addNote" => {
                let word = params["note"]["fields"]["Front"].as_str().unwrap_or("");
                if self.failing_words.contains(word) {
                    return Err(Error::Rpc {
                        action: action.to_string(),
                        message: "cannot create note because it is a duplicate".to_string(),
                    });
                }
                Ok(json!(1_700_000_000_000i64 + self.next_id.fetch_add(1, Ordering::SeqCst)))
            }
            _ => Ok(Value::Null),
        }
    }
}

//! The per-word generation pipeline: text, then illustration, then write-back.

use std::time::Instant;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tracing::{Instrument, Span, error, info, warn};

use super::queue::JobProcessor;
use crate::error::{Error, Result};
use crate::llm::{ImageAdapter, ImageOutcome, TextAdapter};
use crate::model::{EntryId, WordEntry, WordState};
use crate::store::Store;
use crate::telemetry::metrics;
use crate::telemetry::work::{record_state_transition, start_job_span};

/// Production [`JobProcessor`]: generates content for one stored word.
pub struct Generator {
    store: Store,
    text: TextAdapter,
    image: ImageAdapter,
}

impl Generator {
    pub fn new(store: Store, text: TextAdapter, image: ImageAdapter) -> Self {
        Self { store, text, image }
    }

    async fn run(&self, word_id: EntryId, span: &Span) {
        let started = Instant::now();

        let entry = match self.store.get(word_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                warn!(word_id = %word_id, "word not found, skipping");
                record_outcome("vanished");
                return;
            }
            Err(e) => {
                error!(word_id = %word_id, error = %e, "could not load word");
                record_outcome("store_error");
                return;
            }
        };
        span.record("job.word", entry.word.as_str());

        let outcome = match self.generate(&entry).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(word = %entry.word, error = %e, "generation failed");
                self.mark_failed(word_id, &e).await
            }
        };

        match outcome {
            Some(state) => {
                record_state_transition(span, "pending", &state.to_string());
                record_outcome(if state == WordState::Generated {
                    "generated"
                } else {
                    "failed"
                });
            }
            None => {
                warn!(word = %entry.word, "word was removed during generation");
                record_outcome("vanished");
            }
        }
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "generation_job")],
        );
    }

    /// Run both adapters and write the result back.
    ///
    /// Returns the entry's new state, or `None` if it was deleted meanwhile.
    async fn generate(&self, entry: &WordEntry) -> Result<Option<WordState>> {
        let text = self.text.generate(&entry.word).await;

        let (image, target) = if text.is_fallback() {
            (ImageOutcome::NotRequested, WordState::GenerationFailed)
        } else {
            let image = self.image.generate(&text.image_prompt).await;
            (image, WordState::Generated)
        };

        // Reload inside the writer: other jobs may have changed the document.
        let id = entry.id;
        self.store
            .update(move |entries| {
                let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
                    return Ok(None);
                };
                entry.definition = text.definition;
                entry.example = text.example;
                entry.image_prompt = text.image_prompt;
                match image {
                    ImageOutcome::Ready(url) => {
                        entry.image_url = url;
                        entry.image_error = None;
                    }
                    ImageOutcome::Failed(reason) => {
                        entry.image_url.clear();
                        entry.image_error = Some(reason);
                    }
                    ImageOutcome::NotRequested => {
                        entry.image_url.clear();
                        entry.image_error = None;
                    }
                }
                settle(entry, target)?;
                info!(word = %entry.word, status = %entry.status, "generation stored");
                Ok(Some(entry.status))
            })
            .await
    }

    /// Record a failure on the entry so it does not stay pending forever.
    async fn mark_failed(&self, word_id: EntryId, cause: &Error) -> Option<WordState> {
        let definition = format!("AI generation failed: {cause}");
        let result = self
            .store
            .update(move |entries| {
                let Some(entry) = entries.iter_mut().find(|e| e.id == word_id) else {
                    return Ok(None);
                };
                entry.definition = definition;
                entry.example = "Error occurred during generation".to_string();
                settle(entry, WordState::GenerationFailed)?;
                Ok(Some(entry.status))
            })
            .await;

        match result {
            Ok(state) => state,
            Err(e) => {
                error!(word_id = %word_id, error = %e, "could not record generation failure");
                None
            }
        }
    }
}

/// Move a finished entry to `to`, passing through `Pending` if a stale
/// state is on disk.
fn settle(entry: &mut WordEntry, to: WordState) -> Result<()> {
    if entry.status != WordState::Pending {
        entry.transition(WordState::Pending)?;
    }
    entry.transition(to)
}

fn record_outcome(result: &'static str) {
    metrics::generation_outcomes().add(
        1,
        &[KeyValue::new("stage", "job"), KeyValue::new("result", result)],
    );
}

#[async_trait]
impl JobProcessor for Generator {
    async fn process(&self, word_id: EntryId) {
        let span = start_job_span(&word_id);
        self.run(word_id, &span).instrument(span.clone()).await;
    }
}

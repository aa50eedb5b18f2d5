//! The workbench: every operator-facing operation in one place.
//!
//! Submissions land in the [`Store`] and their ids go to the
//! [`GenerationQueue`]; review, deletion and export read and mutate the
//! store; status and sync talk to Anki.

use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::anki::{self, AnkiConnect, CardOptions, CardWriter, FlashcardStatus, RetryPolicy};
use crate::config::{Config, PromptTemplates};
use crate::engine::{GenerationQueue, Generator, QueueConfig, QueueStatus};
use crate::error::{Error, Result};
use crate::export::{ExportConfig, ExportReport, Exporter};
use crate::llm::{ImageAdapter, OpenAiImages, RigTextModel, TextAdapter, openai_client};
use crate::model::{EntryId, WordEntry, WordState, parse_words};
use crate::store::Store;
use crate::telemetry::metrics;

/// Image generation routinely takes tens of seconds.
const IMAGE_TIMEOUT: Duration = Duration::from_secs(120);

pub struct Workbench {
    store: Store,
    queue: GenerationQueue,
    exporter: Exporter,
    prompts: Arc<PromptTemplates>,
}

impl Workbench {
    pub fn new(
        store: Store,
        queue: GenerationQueue,
        exporter: Exporter,
        prompts: Arc<PromptTemplates>,
    ) -> Self {
        Self {
            store,
            queue,
            exporter,
            prompts,
        }
    }

    /// Wire up the production stack: OpenAI for generation, AnkiConnect
    /// for cards, the configured JSON file for state.
    pub fn from_config(config: &Config) -> Result<Self> {
        let prompts = Arc::new(PromptTemplates::load(&config.prompts_file)?);
        let store = Store::open(&config.state_file)?;

        let client = openai_client(&config.openai_api_key, &config.openai_base_url)?;
        let text = TextAdapter::new(
            Arc::new(RigTextModel::new(client, &config.text_model)),
            Arc::clone(&prompts),
        );
        let image = ImageAdapter::new(
            Arc::new(OpenAiImages::new(
                &config.openai_base_url,
                SecretString::from(config.openai_api_key.expose_secret().to_string()),
                &config.image_model,
                IMAGE_TIMEOUT,
            )?),
            Arc::clone(&prompts),
        );

        let generator = Generator::new(store.clone(), text, image);
        let queue = GenerationQueue::new(
            Arc::new(generator),
            QueueConfig {
                max_concurrent: config.max_concurrent,
                ..QueueConfig::default()
            },
        );

        let rpc = AnkiConnect::new(&config.anki_connect_url, RetryPolicy::default())?;
        let cards = CardWriter::new(
            Arc::new(rpc),
            CardOptions {
                deck_name: config.deck_name.clone(),
                ..CardOptions::default()
            },
        )?;
        let exporter = Exporter::new(
            cards,
            ExportConfig {
                policy: config.export_policy,
                ..ExportConfig::default()
            },
        );

        Ok(Self::new(store, queue, exporter, prompts))
    }

    /// Add one pending entry per non-blank line of `text`.
    pub async fn add_words(&self, text: &str) -> Result<Vec<WordEntry>> {
        let added: Vec<WordEntry> = parse_words(text)
            .iter()
            .filter_map(|w| WordEntry::new(w))
            .collect();
        if added.is_empty() {
            return Ok(added);
        }

        self.store.append(added.clone()).await?;
        metrics::words_submitted().add(added.len() as u64, &[]);
        info!(count = added.len(), "words submitted");
        Ok(added)
    }

    /// Add words and queue each new entry for generation.
    pub async fn submit_words(&self, text: &str) -> Result<Vec<WordEntry>> {
        let added = self.add_words(text).await?;
        for entry in &added {
            self.queue.submit(entry.id);
        }
        Ok(added)
    }

    pub async fn entries(&self) -> Result<Vec<WordEntry>> {
        self.store.load().await
    }

    /// Resolve a full id or unique prefix.
    pub async fn resolve(&self, id_or_prefix: &str) -> Result<EntryId> {
        self.store.resolve(id_or_prefix).await
    }

    pub async fn get(&self, id: EntryId) -> Result<WordEntry> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.0.to_string()))
    }

    /// Re-run generation for an existing entry. Idempotent while it is
    /// already queued or running.
    pub async fn regenerate(&self, id: EntryId) -> Result<QueueStatus> {
        let reset = self
            .store
            .update(move |entries| {
                let entry = entries
                    .iter_mut()
                    .find(|e| e.id == id)
                    .ok_or_else(|| Error::NotFound(id.0.to_string()))?;
                if entry.status == WordState::Pending {
                    return Ok(false);
                }
                entry.transition(WordState::Pending)?;
                Ok(true)
            })
            .await?;

        // A finished result was just reset to pending, so a run that is still
        // winding down must be followed by another one.
        if reset {
            self.queue.rerun_when_done(id);
        } else {
            self.queue.submit(id);
        }
        Ok(self.queue.status())
    }

    pub async fn approve(&self, id: EntryId) -> Result<WordEntry> {
        self.review(id, WordState::Approved).await
    }

    pub async fn reject(&self, id: EntryId) -> Result<WordEntry> {
        self.review(id, WordState::Rejected).await
    }

    async fn review(&self, id: EntryId, to: WordState) -> Result<WordEntry> {
        let entry = self
            .store
            .update(move |entries| {
                let entry = entries
                    .iter_mut()
                    .find(|e| e.id == id)
                    .ok_or_else(|| Error::NotFound(id.0.to_string()))?;
                entry.transition(to)?;
                Ok(entry.clone())
            })
            .await?;
        info!(word = %entry.word, status = %entry.status, "entry reviewed");
        Ok(entry)
    }

    pub async fn delete(&self, id: EntryId) -> Result<WordEntry> {
        let removed = self.store.remove(id).await?;
        info!(word = %removed.word, "entry deleted");
        Ok(removed)
    }

    pub async fn clear_all(&self) -> Result<usize> {
        self.store.clear(None).await
    }

    pub async fn clear_by_status(&self, status: WordState) -> Result<usize> {
        self.store.clear(Some(status)).await
    }

    /// Queue every entry still pending, e.g. after a restart.
    pub async fn resume_pending(&self) -> Result<usize> {
        let pending: Vec<EntryId> = self
            .store
            .load()
            .await?
            .into_iter()
            .filter(|e| e.status == WordState::Pending)
            .map(|e| e.id)
            .collect();
        let admitted = pending.iter().filter(|id| self.queue.submit(**id)).count();
        if admitted > 0 {
            info!(admitted, "resumed pending words");
        }
        Ok(admitted)
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// Wait until the generation queue has drained.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    pub async fn flashcard_status(&self) -> FlashcardStatus {
        let cards = self.exporter.cards();
        anki::probe_status(cards.rpc(), &cards.options().deck_name).await
    }

    pub async fn export(&self) -> Result<ExportReport> {
        let started = Instant::now();
        let entries = self.store.load().await?;
        let result = self.exporter.export(&entries).await;
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "export")],
        );
        result
    }

    pub async fn sync(&self) -> Result<()> {
        anki::sync(self.exporter.cards().rpc()).await
    }

    pub fn prompt_config(&self) -> &PromptTemplates {
        &self.prompts
    }
}

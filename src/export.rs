//! Export pipeline: push ready entries into Anki one card at a time.

use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::anki::CardWriter;
use crate::error::{Error, Result};
use crate::model::{ExportPolicy, WordEntry};
use crate::telemetry::metrics;

/// Configuration for the export pipeline.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Pause between consecutive cards.
    pub card_delay: Duration,
    pub policy: ExportPolicy,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            card_delay: Duration::from_millis(200),
            policy: ExportPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Success,
    Failed,
}

/// Per-word line of an export report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportDetail {
    pub word: String,
    pub has_definition: bool,
    pub has_example: bool,
    pub has_image: bool,
    pub status: ExportStatus,
}

/// Aggregate result of one export run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportReport {
    pub added: usize,
    pub failed: usize,
    pub total: usize,
    pub errors: Vec<String>,
    pub message: String,
    pub details: Vec<ExportDetail>,
}

/// Drives [`CardWriter`] over a batch of entries.
pub struct Exporter {
    cards: CardWriter,
    config: ExportConfig,
}

impl Exporter {
    pub fn new(cards: CardWriter, config: ExportConfig) -> Self {
        Self { cards, config }
    }

    pub fn cards(&self) -> &CardWriter {
        &self.cards
    }

    /// Export every eligible entry in `entries`.
    ///
    /// Fails without touching Anki when nothing is eligible, and fails early
    /// if Anki does not answer a `version` probe. Past that point one card's
    /// failure is recorded and the batch moves on.
    pub async fn export(&self, entries: &[WordEntry]) -> Result<ExportReport> {
        let ready: Vec<&WordEntry> = entries
            .iter()
            .filter(|e| e.is_export_ready(self.config.policy))
            .collect();
        info!(ready = ready.len(), "starting export");

        if ready.is_empty() {
            return Err(Error::NothingToExport);
        }

        let version = self
            .cards
            .rpc()
            .call("version", Value::Null)
            .await
            .map_err(|e| Error::Unreachable(e.to_string()))?;
        info!(version = %version, deck = %self.cards.options().deck_name, "AnkiConnect reachable");

        let mut added = 0;
        let mut errors = Vec::new();
        let mut details = Vec::with_capacity(ready.len());

        for (i, entry) in ready.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.card_delay).await;
            }

            let started = Instant::now();
            let image = Some(entry.image_url.as_str()).filter(|u| !u.is_empty());
            let status = match self
                .cards
                .create_card(&entry.word, &entry.definition, &entry.example, image)
                .await
            {
                Ok(note_id) => {
                    added += 1;
                    info!(
                        word = %entry.word,
                        note_id,
                        duration_ms = started.elapsed().as_millis() as u64,
                        progress = %format!("{}/{}", i + 1, ready.len()),
                        "card exported"
                    );
                    metrics::cards_exported().add(1, &[KeyValue::new("result", "ok")]);
                    ExportStatus::Success
                }
                Err(e) => {
                    error!(word = %entry.word, error = %e, "card export failed");
                    errors.push(format!("Failed to add {}: {e}", entry.word));
                    metrics::cards_exported().add(1, &[KeyValue::new("result", "error")]);
                    ExportStatus::Failed
                }
            };

            details.push(ExportDetail {
                word: entry.word.clone(),
                has_definition: !entry.definition.is_empty(),
                has_example: !entry.example.is_empty(),
                has_image: entry.has_image(),
                status,
            });
        }

        let total = ready.len();
        let failed = errors.len();
        if failed > 0 {
            warn!(added, failed, total, "export finished with failures");
        } else {
            info!(added, total, "export finished");
        }

        Ok(ExportReport {
            added,
            failed,
            total,
            errors,
            message: format!(
                "Added {added}/{total} cards to Anki deck \"{}\"",
                self.cards.options().deck_name
            ),
            details,
        })
    }
}

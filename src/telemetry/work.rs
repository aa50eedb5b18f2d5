//! Generation job span helpers.
//!
//! Provides span creation and state-transition recording for word entries
//! flowing through the generation queue.

use tracing::Span;

use crate::model::EntryId;

/// Start a span for one generation job.
///
/// The `job.word` field is declared empty and filled once the entry is loaded.
pub fn start_job_span(word_id: &EntryId) -> Span {
    tracing::info_span!(
        "generation.job",
        "job.word_id" = %word_id.0,
        "job.word" = tracing::field::Empty,
    )
}

/// Record a state transition event on the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}

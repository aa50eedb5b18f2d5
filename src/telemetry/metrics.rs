//! Metric instrument factories for lexideck.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"lexideck"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for lexideck instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("lexideck")
}

/// Counter: words added to the state store.
pub fn words_submitted() -> Counter<u64> {
    meter()
        .u64_counter("lexideck.words.submitted")
        .with_description("Number of words submitted")
        .build()
}

/// Counter: generation queue submissions.
/// Labels: `result` ("admitted" | "duplicate").
pub fn queue_submissions() -> Counter<u64> {
    meter()
        .u64_counter("lexideck.queue.submissions")
        .with_description("Number of generation queue submissions")
        .build()
}

/// Counter: generation stage outcomes.
/// Labels: `stage` ("text" | "image" | "job"), `result`.
pub fn generation_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("lexideck.generation.outcomes")
        .with_description("Outcomes of generation stages")
        .build()
}

/// Counter: AnkiConnect calls.
/// Labels: `action`, `result` ("ok" | "retry" | "error").
pub fn anki_calls() -> Counter<u64> {
    meter()
        .u64_counter("lexideck.anki.calls")
        .with_description("Number of AnkiConnect call attempts")
        .build()
}

/// Counter: cards pushed by the export pipeline.
/// Labels: `result` ("ok" | "error").
pub fn cards_exported() -> Counter<u64> {
    meter()
        .u64_counter("lexideck.export.cards")
        .with_description("Number of cards exported")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("lexideck.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}

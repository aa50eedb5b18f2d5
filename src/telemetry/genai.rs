//! GenAI semantic convention span helpers for generative-service calls.
//!
//! Uses OpenTelemetry GenAI semantic conventions:
//! - `gen_ai.operation.name`
//! - `gen_ai.request.model`
//! - `gen_ai.provider.name`

use tracing::Span;

/// Start a span for a chat/completion operation.
pub fn start_chat_span(model: &str, provider: &str) -> Span {
    tracing::info_span!(
        "gen_ai.chat",
        "gen_ai.operation.name" = "chat",
        "gen_ai.request.model" = model,
        "gen_ai.provider.name" = provider,
    )
}

/// Start a span for an image-generation operation.
pub fn start_image_span(model: &str, provider: &str) -> Span {
    tracing::info_span!(
        "gen_ai.image_generation",
        "gen_ai.operation.name" = "image_generation",
        "gen_ai.request.model" = model,
        "gen_ai.provider.name" = provider,
    )
}

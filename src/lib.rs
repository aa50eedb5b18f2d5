//! # lexideck
//!
//! Background pipeline that turns vocabulary words into illustrated Anki
//! flashcards.
//!
//! Provides a flat-file word store with a single writer, a bounded
//! deduplicating generation queue over OpenAI text (rig-core) and image
//! generation, an AnkiConnect client with retrying RPC and card assembly,
//! a sequential export pipeline, and OpenTelemetry observability.

pub mod anki;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod llm;
pub mod model;
pub mod store;
pub mod telemetry;
pub mod workbench;

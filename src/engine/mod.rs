//! Generation engine: bounded job queue and the per-word pipeline it drives.

pub mod job;
pub mod queue;

pub use job::Generator;
pub use queue::{GenerationQueue, JobProcessor, QueueConfig, QueueStatus};

//! Write path from the queue to the vector index

pub mod processor;
pub mod prompts;
pub mod reweight;

pub use processor::{BatchOutcome, DrainSummary, EmbeddingProcessor};
pub use reweight::{ReweightReport, WeightRecomputer};

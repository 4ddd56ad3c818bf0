//! precedent - retrieval of statutes and weighted precedents
//!
//! This crate provides:
//! - Chunking of statutes and court decisions into retrieval units
//! - A durable SQLite-backed queue feeding an embedding processor
//! - Authority weighting of decisions by court, age, citations and status
//! - Tension-aware hybrid vector search over Qdrant
//! - Agglomerative clustering of decisions into emergent doctrines
//! - Structured input for downstream legal synthesis

pub mod chunk;
pub mod cluster;
pub mod commands;
pub mod config;
pub mod embed;
pub mod embedding_backend;
pub mod error;
pub mod meta;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod search;
pub mod store;
pub mod synthesis;
pub mod tension;
pub mod vector;
pub mod weight;

pub use config::Config;
pub use error::{Error, Result};

//! Configuration management for precedent
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,

    /// Qdrant collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Ingestion queue and processor configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// Hybrid search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Doctrine discovery and clustering configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Synthesis input assembly configuration
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name/identifier sent to the backend
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (fixed for the whole collection)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Base URL of the OpenAI-compatible embedding backend
    #[serde(default = "default_embedding_url")]
    pub url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_embedding_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Retries per request on transient failures
    #[serde(default = "default_embedding_retries")]
    pub retries: usize,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    #[serde(default = "default_statute_max_tokens")]
    pub statute_max_tokens: usize,

    /// Sliding window size in characters
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,

    /// Overlap between consecutive windows in characters
    #[serde(default = "default_window_overlap")]
    pub overlap_chars: usize,

    #[serde(default = "default_statute_min_chars")]
    pub statute_min_chars: usize,

    #[serde(default = "default_decision_max_chars")]
    pub decision_max_chars: usize,

    #[serde(default = "default_decision_min_section_chars")]
    pub decision_min_section_chars: usize,

    #[serde(default = "default_principle_fallback_chars")]
    pub principle_fallback_chars: usize,
}

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Failed items are swept back to pending while retry_count is below this
    #[serde(default = "default_queue_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_queue_insert_batch")]
    pub insert_batch_size: usize,

    /// Items claimed per processing batch
    #[serde(default = "default_queue_batch_size")]
    pub batch_size: usize,

    /// Items processed concurrently within a batch
    #[serde(default = "default_queue_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_top_k")]
    pub top_k: usize,

    /// Use tension vector arithmetic (otherwise plain query embedding)
    #[serde(default = "default_use_tensions")]
    pub use_tensions: bool,

    #[serde(default = "default_tension_weight")]
    pub tension_weight: f32,

    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,

    #[serde(default = "default_doctrine_topk_factor")]
    pub doctrine_topk_factor: f32,

    /// Scale applied to reinforcing modifiers
    #[serde(default = "default_add_scale")]
    pub add_scale: f32,

    /// Scale applied to de-emphasising modifiers
    #[serde(default = "default_subtract_scale")]
    pub subtract_scale: f32,

    /// Per-request embedding cache capacity
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Deadline applied to every external call made while searching
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
}

/// Doctrine discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,

    /// Upper bound on vectors fed into agglomerative clustering
    #[serde(default = "default_max_vectors")]
    pub max_vectors: usize,

    #[serde(default = "default_query_min_jaccard")]
    pub query_min_jaccard: f32,

    #[serde(default = "default_query_min_cluster_size")]
    pub query_min_cluster_size: usize,

    #[serde(default = "default_legal_domain")]
    pub legal_domain: String,
}

/// Synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Attempts per tension resolution before it is omitted
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay between attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_max_statutes")]
    pub max_statutes: usize,

    #[serde(default = "default_cluster_threshold")]
    pub cluster_threshold: usize,

    #[serde(default = "default_representatives_per_cluster")]
    pub representatives_per_cluster: usize,

    #[serde(default = "default_max_representatives")]
    pub max_representatives: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for precedent data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
            collection_name: default_collection_name(),
            embedding: EmbeddingConfig::default(),
            chunk: ChunkConfig::default(),
            queue: QueueConfig::default(),
            search: SearchConfig::default(),
            discovery: DiscoveryConfig::default(),
            synthesis: SynthesisConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            url: default_embedding_url(),
            api_key_env: default_embedding_api_key_env(),
            batch_size: default_embedding_batch_size(),
            timeout_secs: default_embedding_timeout(),
            retries: default_embedding_retries(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            statute_max_tokens: default_statute_max_tokens(),
            window_chars: default_window_chars(),
            overlap_chars: default_window_overlap(),
            statute_min_chars: default_statute_min_chars(),
            decision_max_chars: default_decision_max_chars(),
            decision_min_section_chars: default_decision_min_section_chars(),
            principle_fallback_chars: default_principle_fallback_chars(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_queue_max_retries(),
            insert_batch_size: default_queue_insert_batch(),
            batch_size: default_queue_batch_size(),
            concurrency: default_queue_concurrency(),
            preview_chars: default_preview_chars(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_search_top_k(),
            use_tensions: default_use_tensions(),
            tension_weight: default_tension_weight(),
            keyword_weight: default_keyword_weight(),
            doctrine_topk_factor: default_doctrine_topk_factor(),
            add_scale: default_add_scale(),
            subtract_scale: default_subtract_scale(),
            cache_capacity: default_cache_capacity(),
            request_timeout_secs: default_request_timeout(),
            candidate_multiplier: default_candidate_multiplier(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            min_similarity: default_min_similarity(),
            min_cluster_size: default_min_cluster_size(),
            max_clusters: default_max_clusters(),
            max_vectors: default_max_vectors(),
            query_min_jaccard: default_query_min_jaccard(),
            query_min_cluster_size: default_query_min_cluster_size(),
            legal_domain: default_legal_domain(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            max_statutes: default_max_statutes(),
            cluster_threshold: default_cluster_threshold(),
            representatives_per_cluster: default_representatives_per_cluster(),
            max_representatives: default_max_representatives(),
        }
    }
}

impl Config {
    /// Get the default base directory for precedent (~/.precedent)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".precedent")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("precedent.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("precedent.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        if self.qdrant_api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.qdrant_api_key_env).ok()
    }

    /// Get the embedding API key from environment
    pub fn embedding_api_key(&self) -> Option<String> {
        if self.embedding.api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.embedding.api_key_env).ok()
    }

    /// Check if precedent is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be positive".to_string(),
            ));
        }

        if self.chunk.overlap_chars >= self.chunk.window_chars {
            return Err(Error::Config(
                "chunk.overlap_chars must be < chunk.window_chars".to_string(),
            ));
        }

        if self.queue.concurrency == 0 || self.queue.batch_size == 0 {
            return Err(Error::Config(
                "queue.concurrency and queue.batch_size must be positive".to_string(),
            ));
        }

        if self.queue.insert_batch_size == 0 {
            return Err(Error::Config(
                "queue.insert_batch_size must be positive".to_string(),
            ));
        }

        for (name, value) in [
            ("search.tension_weight", self.search.tension_weight),
            ("search.keyword_weight", self.search.keyword_weight),
            ("search.doctrine_topk_factor", self.search.doctrine_topk_factor),
            ("discovery.min_similarity", self.discovery.min_similarity),
            ("discovery.query_min_jaccard", self.discovery.query_min_jaccard),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        if self.discovery.min_cluster_size == 0 {
            return Err(Error::Config(
                "discovery.min_cluster_size must be at least 1".to_string(),
            ));
        }

        if self.synthesis.retry_attempts == 0 {
            return Err(Error::Config(
                "synthesis.retry_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.collection_name, "legal_chunks");
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.search.cache_capacity, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.collection_name = "test_collection".to_string();
        config.discovery.min_cluster_size = 7;

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.collection_name, "test_collection");
        assert_eq!(loaded.discovery.min_cluster_size, 7);
        assert_eq!(loaded.paths.db_file, tmp.path().join("precedent.db"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            collection_name = "cz_civil"

            [search]
            top_k = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.collection_name, "cz_civil");
        assert_eq!(config.search.top_k, 5);
        assert_eq!(config.search.tension_weight, 0.5);
        assert_eq!(config.chunk.window_chars, 4000);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.chunk.overlap_chars = config.chunk.window_chars;
        assert!(config.validate().is_err());

        config.chunk.overlap_chars = 400;
        assert!(config.validate().is_ok());

        config.search.keyword_weight = 1.5;
        assert!(config.validate().is_err());

        config.search.keyword_weight = 0.2;
        config.synthesis.retry_attempts = 0;
        assert!(config.validate().is_err());
    }
}

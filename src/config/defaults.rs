//! Default values for configuration

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("PRECEDENT_QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "".to_string()
}

/// Default collection name
pub fn default_collection_name() -> String {
    "legal_chunks".to_string()
}

pub fn default_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}

pub fn default_embedding_dimension() -> usize {
    1536
}

/// Default embedding backend URL (OpenAI-compatible)
pub fn default_embedding_url() -> String {
    std::env::var("PRECEDENT_EMBEDDING_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Environment variable holding the bearer token for the embedding backend
pub fn default_embedding_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

pub fn default_embedding_batch_size() -> usize {
    32
}

pub fn default_embedding_timeout() -> u64 {
    30
}

pub fn default_embedding_retries() -> usize {
    2
}

/// Statute sections estimated above this many tokens get sub-split
pub fn default_statute_max_tokens() -> usize {
    1000
}

pub fn default_window_chars() -> usize {
    4000
}

pub fn default_window_overlap() -> usize {
    400
}

/// Statute sections shorter than this (trimmed) are skipped
pub fn default_statute_min_chars() -> usize {
    20
}

pub fn default_decision_max_chars() -> usize {
    14_000
}

/// Decision sections shorter than this are dropped
pub fn default_decision_min_section_chars() -> usize {
    100
}

/// Principle fallback length when no holding block is found
pub fn default_principle_fallback_chars() -> usize {
    500
}

pub fn default_queue_max_retries() -> u32 {
    3
}

pub fn default_queue_insert_batch() -> usize {
    50
}

pub fn default_queue_batch_size() -> usize {
    10
}

pub fn default_queue_concurrency() -> usize {
    4
}

/// Maximum characters of chunk text stored alongside each vector
pub fn default_preview_chars() -> usize {
    5000
}

pub fn default_search_top_k() -> usize {
    20
}

pub fn default_use_tensions() -> bool {
    true
}

pub fn default_tension_weight() -> f32 {
    0.5
}

pub fn default_keyword_weight() -> f32 {
    0.2
}

/// Extra damping on doctrine component result counts
pub fn default_doctrine_topk_factor() -> f32 {
    0.5
}

pub fn default_add_scale() -> f32 {
    0.3
}

pub fn default_subtract_scale() -> f32 {
    0.2
}

pub fn default_cache_capacity() -> usize {
    100
}

pub fn default_request_timeout() -> u64 {
    30
}

/// Candidate pool size as a multiple of top_k
pub fn default_candidate_multiplier() -> usize {
    3
}

pub fn default_min_similarity() -> f32 {
    0.70
}

pub fn default_min_cluster_size() -> usize {
    5
}

pub fn default_max_clusters() -> usize {
    20
}

pub fn default_max_vectors() -> usize {
    500
}

pub fn default_query_min_jaccard() -> f32 {
    0.4
}

pub fn default_query_min_cluster_size() -> usize {
    3
}

pub fn default_legal_domain() -> String {
    "civil_law".to_string()
}

pub fn default_retry_attempts() -> u32 {
    3
}

pub fn default_retry_delay_ms() -> u64 {
    500
}

pub fn default_max_statutes() -> usize {
    10
}

/// Judicial result count at which query-time clustering kicks in
pub fn default_cluster_threshold() -> usize {
    10
}

pub fn default_representatives_per_cluster() -> usize {
    3
}

pub fn default_max_representatives() -> usize {
    8
}

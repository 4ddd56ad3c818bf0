//! Vector index integration
//!
//! This module defines the [`VectorIndex`] contract the retrieval core needs
//! and two implementations:
//! - [`QdrantStore`], backed by a Qdrant collection
//! - [`MemoryIndex`], a brute-force in-process index
//!
//! Records are keyed by chunk id; upserting the same id twice leaves one
//! record holding the latest payload.

mod memory;
mod payload;

pub use memory::*;
pub use payload::*;

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, Distance, Filter, GetPointsBuilder,
    PointId, PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder, VectorsOutput,
};
use qdrant_client::Qdrant;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

/// A vector with its id and payload
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

/// Search hit; `score` is cosine similarity, higher is closer
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub payload: Payload,
    #[serde(skip)]
    pub vector: Option<Vec<f32>>,
}

/// Scalar value a filter can match on
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Bool(bool),
    Integer(i64),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

/// Conjunction of exact-match conditions on payload keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    pub must: Vec<(String, FilterValue)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key == value`
    pub fn eq(mut self, key: &str, value: impl Into<FilterValue>) -> Self {
        self.must.push((key.to_string(), value.into()));
        self
    }

    /// Shorthand for filtering on the chunk type tag
    pub fn chunk_type(kind: &str) -> Self {
        Self::new().eq("type", kind)
    }

    /// Evaluate against a payload (used by the in-memory index)
    pub fn matches(&self, payload: &Payload) -> bool {
        self.must.iter().all(|(key, expected)| match expected {
            FilterValue::Text(s) => payload.get_str(key) == Some(s.as_str()),
            FilterValue::Bool(b) => payload.get_bool(key) == Some(*b),
            FilterValue::Integer(i) => {
                payload.get(key).and_then(serde_json::Value::as_i64) == Some(*i)
            }
        })
    }

    fn to_qdrant_filter(&self) -> Option<Filter> {
        if self.must.is_empty() {
            return None;
        }

        let must: Vec<Condition> = self
            .must
            .iter()
            .map(|(key, value)| match value {
                FilterValue::Text(s) => Condition::matches(key.as_str(), s.clone()),
                FilterValue::Bool(b) => Condition::matches(key.as_str(), *b),
                FilterValue::Integer(i) => Condition::matches(key.as_str(), *i),
            })
            .collect();

        Some(Filter {
            must,
            should: vec![],
            must_not: vec![],
            min_should: None,
        })
    }
}

/// Query parameters
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
    pub filter: Option<MetadataFilter>,
    /// Return stored vectors with each hit
    pub with_vectors: bool,
}

impl QueryOptions {
    pub fn top_k(top_k: usize) -> Self {
        Self {
            top_k,
            filter: None,
            with_vectors: false,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_vectors(mut self) -> Self {
        self.with_vectors = true;
        self
    }
}

/// Vector index contract
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records by id
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Nearest neighbours of `vector`, best first
    async fn query(&self, vector: &[f32], options: &QueryOptions) -> Result<Vec<SearchResult>>;

    /// Fetch records by id; unknown ids are omitted
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<VectorRecord>>;

    /// Read up to `limit` records matching `filter`, with vectors
    async fn scroll(&self, filter: Option<&MetadataFilter>, limit: usize)
        -> Result<Vec<VectorRecord>>;

    /// Number of stored records
    async fn count(&self) -> Result<usize>;

    /// Fixed vector dimension of the index
    fn dimension(&self) -> usize;
}

/// Reject records whose vectors don't match the index dimension
pub fn check_dimensions(records: &[VectorRecord], dimension: usize, index: &str) -> Result<()> {
    if let Some(mismatch) = records.iter().find(|r| r.vector.len() != dimension) {
        return Err(Error::Qdrant(format!(
            "Vector dimension mismatch for '{}': expected {} (got {} for {})",
            index,
            dimension,
            mismatch.vector.len(),
            mismatch.id
        )));
    }
    Ok(())
}

/// Information about a Qdrant collection
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub indexed_vectors_count: u64,
    pub status: String,
}

/// Qdrant store handle
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    /// Connect to Qdrant using config
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(
            &config.qdrant_url,
            &config.collection_name,
            config.embedding.dimension,
            config.qdrant_api_key(),
        )
        .await
    }

    /// Create a new store connection directly with URL and collection name
    pub async fn new(
        url: &str,
        collection: &str,
        dimension: usize,
        api_key: Option<String>,
    ) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let mut builder = Qdrant::from_url(url).skip_compatibility_check();
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder.build().map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
        })
    }

    /// Ensure the collection exists with correct configuration
    pub async fn ensure_collection(&self) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            debug!("Collection {} already exists", self.collection);

            if let Some(size) = self.collection_vector_size().await? {
                if size as usize != self.dimension {
                    return Err(Error::Qdrant(format!(
                        "Collection '{}' has vector size {}, but config expects {}. Remediation: set a new collection name or reset the collection.",
                        self.collection, size, self.dimension
                    )));
                }
            }
            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {}",
            self.collection, self.dimension
        );

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                ),
            )
            .await?;

        info!("Collection {} created successfully", self.collection);
        Ok(())
    }

    /// Check if the collection exists
    pub async fn collection_exists(&self) -> Result<bool> {
        Ok(self.client.collection_exists(&self.collection).await?)
    }

    /// Reset the collection (delete and recreate)
    pub async fn reset_collection(&self) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            info!("Deleting existing collection {}", self.collection);
            self.client.delete_collection(&self.collection).await?;
        }
        self.ensure_collection().await
    }

    /// Get collection info (point count, etc)
    pub async fn get_collection_info(&self) -> Result<Option<CollectionInfo>> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(None);
        }

        let info = self.client.collection_info(&self.collection).await?;
        Ok(info.result.map(|result| CollectionInfo {
            points_count: result.points_count.unwrap_or(0),
            indexed_vectors_count: result.indexed_vectors_count.unwrap_or(0),
            status: format!("{:?}", result.status()),
        }))
    }

    async fn collection_vector_size(&self) -> Result<Option<u64>> {
        use qdrant_client::qdrant::vectors_config::Config as VectorsConfig;

        let info = self.client.collection_info(&self.collection).await?;
        let size = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|config| match config {
                VectorsConfig::Params(params) => Some(params.size),
                VectorsConfig::ParamsMap(_) => None,
            });
        Ok(size)
    }
}

/// Stable UUID point id for a chunk id
pub fn point_id_for(chunk_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes())
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        check_dimensions(&records, self.dimension, &self.collection)?;

        debug!(
            "Upserting {} points to collection {}",
            records.len(),
            self.collection
        );

        let points: Vec<PointStruct> = records
            .into_iter()
            .map(|record| {
                let mut payload = record.payload;
                payload.insert(CHUNK_ID_KEY, record.id.clone());
                PointStruct::new(
                    point_id_for(&record.id).to_string(),
                    record.vector,
                    payload.to_qdrant_payload(),
                )
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], options: &QueryOptions) -> Result<Vec<SearchResult>> {
        debug!(
            "Searching collection {} with limit {}",
            self.collection, options.top_k
        );

        let mut search = SearchPointsBuilder::new(&self.collection, vector.to_vec(), options.top_k as u64)
            .with_payload(true)
            .with_vectors(options.with_vectors);

        if let Some(filter) = options.filter.as_ref().and_then(MetadataFilter::to_qdrant_filter) {
            search = search.filter(filter);
        }

        let response = self.client.search_points(search).await?;

        Ok(response
            .result
            .into_iter()
            .map(|p| {
                let payload = Payload::from_qdrant_payload(p.payload);
                SearchResult {
                    id: record_id(&payload, p.id),
                    score: p.score,
                    vector: p.vectors.and_then(dense_vector),
                    payload,
                }
            })
            .collect())
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<VectorRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let point_ids: Vec<PointId> = ids
            .iter()
            .map(|id| PointId::from(point_id_for(id).to_string()))
            .collect();

        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, point_ids)
                    .with_payload(true)
                    .with_vectors(true),
            )
            .await?;

        Ok(response
            .result
            .into_iter()
            .map(|p| {
                let payload = Payload::from_qdrant_payload(p.payload);
                VectorRecord {
                    id: record_id(&payload, p.id),
                    vector: p.vectors.and_then(dense_vector).unwrap_or_default(),
                    payload,
                }
            })
            .collect())
    }

    async fn scroll(
        &self,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<VectorRecord>> {
        let mut records = Vec::new();
        let mut offset: Option<PointId> = None;
        let page_size = limit.min(256) as u32;

        while records.len() < limit {
            let mut scroll = ScrollPointsBuilder::new(&self.collection)
                .limit(page_size.max(1))
                .with_payload(true)
                .with_vectors(true);

            if let Some(f) = filter.and_then(MetadataFilter::to_qdrant_filter) {
                scroll = scroll.filter(f);
            }
            if let Some(ref o) = offset {
                scroll = scroll.offset(o.clone());
            }

            let response = self.client.scroll(scroll).await?;
            if response.result.is_empty() {
                break;
            }

            for p in response.result {
                let payload = Payload::from_qdrant_payload(p.payload);
                records.push(VectorRecord {
                    id: record_id(&payload, p.id),
                    vector: p.vectors.and_then(dense_vector).unwrap_or_default(),
                    payload,
                });
            }

            offset = response.next_page_offset;
            if offset.is_none() {
                break;
            }
        }

        records.truncate(limit);
        Ok(records)
    }

    async fn count(&self) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Chunk id from the payload, falling back to the raw point id
fn record_id(payload: &Payload, id: Option<PointId>) -> String {
    match payload.chunk_id() {
        Some(chunk_id) => chunk_id.to_string(),
        None => point_id_to_string(id),
    }
}

/// Convert PointId to string
fn point_id_to_string(id: Option<PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;

    match id.and_then(|p| p.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

/// Extract the unnamed dense vector from a point
#[allow(deprecated)]
fn dense_vector(vectors: VectorsOutput) -> Option<Vec<f32>> {
    use qdrant_client::qdrant::vectors_output::VectorsOptions;

    match vectors.vectors_options? {
        VectorsOptions::Vector(v) => Some(v.data),
        VectorsOptions::Vectors(_) => None,
    }
}

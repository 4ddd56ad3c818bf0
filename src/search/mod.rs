//! Hybrid vector search
//!
//! A [`HybridSearchStrategy`] carries up to three kinds of weighted query
//! vectors. Each present component is issued against the index in parallel
//! and the hits are fused by weighted running average of their scores.

use crate::error::{with_timeout, Error, Result};
use crate::store::{MetadataFilter, Payload, QueryOptions, SearchResult, VectorIndex};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// How a request builds its query vectors, resolved once per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Tension, doctrine and keyword components
    Tension,
    /// Question embedding only
    Plain,
}

impl SearchMode {
    pub fn from_flag(use_tensions: bool) -> Self {
        if use_tensions {
            SearchMode::Tension
        } else {
            SearchMode::Plain
        }
    }
}

/// Component that contributed a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Tension,
    Doctrine,
    Keyword,
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchSource::Tension => write!(f, "tension"),
            SearchSource::Doctrine => write!(f, "doctrine"),
            SearchSource::Keyword => write!(f, "keyword"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedVector {
    pub vector: Vec<f32>,
    pub weight: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridSearchStrategy {
    pub tension: Option<WeightedVector>,
    pub doctrines: Vec<WeightedVector>,
    pub keyword: Option<WeightedVector>,
}

impl HybridSearchStrategy {
    /// Single keyword component carrying the full weight
    pub fn plain(vector: Vec<f32>) -> Self {
        Self {
            keyword: Some(WeightedVector {
                vector,
                weight: 1.0,
            }),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tension.is_none() && self.doctrines.is_empty() && self.keyword.is_none()
    }
}

/// A hit after fusion
#[derive(Debug, Clone, Serialize)]
pub struct FusedResult {
    pub id: String,
    /// Weighted average similarity across contributing components
    pub score: f32,
    /// Sum of the weights of contributing components
    pub accumulated_weight: f32,
    pub sources: Vec<SearchSource>,
    /// `score` scaled by stored authority weight, once ranked
    pub authority_score: f32,
    pub payload: Payload,
    #[serde(skip)]
    pub vector: Option<Vec<f32>>,
}

impl FusedResult {
    /// Stored authority weight (1.0 if absent)
    pub fn weight(&self) -> f64 {
        self.payload.weight()
    }
}

/// Results of one component query
pub struct ComponentHits {
    pub source: SearchSource,
    pub weight: f32,
    pub hits: Vec<SearchResult>,
}

/// Per-component result count: `max(1, floor(top_k × weight))`
pub fn component_top_k(top_k: usize, weight: f32) -> usize {
    ((top_k as f32 * weight).floor() as usize).max(1)
}

/// Merge component hits by id.
///
/// A repeated id gets the weighted running average of its scores and the
/// union of its sources. Output is ordered by `score × accumulated_weight`
/// and truncated to `top_k`.
pub fn fuse(components: Vec<ComponentHits>, top_k: usize) -> Vec<FusedResult> {
    let mut merged: Vec<FusedResult> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for component in components {
        for hit in component.hits {
            match positions.get(&hit.id) {
                Some(&pos) => {
                    let existing = &mut merged[pos];
                    existing.score = (existing.score * existing.accumulated_weight
                        + hit.score * component.weight)
                        / (existing.accumulated_weight + component.weight);
                    existing.accumulated_weight += component.weight;
                    existing.authority_score = existing.score;
                    if !existing.sources.contains(&component.source) {
                        existing.sources.push(component.source);
                    }
                    if existing.vector.is_none() {
                        existing.vector = hit.vector;
                    }
                }
                None => {
                    positions.insert(hit.id.clone(), merged.len());
                    merged.push(FusedResult {
                        id: hit.id,
                        score: hit.score,
                        accumulated_weight: component.weight,
                        sources: vec![component.source],
                        authority_score: hit.score,
                        payload: hit.payload,
                        vector: hit.vector,
                    });
                }
            }
        }
    }

    merged.sort_by(|a, b| {
        (b.score * b.accumulated_weight).total_cmp(&(a.score * a.accumulated_weight))
    });
    merged.truncate(top_k);
    merged
}

/// Multiply each fused score by its stored authority weight and re-sort
pub fn authority_rank(mut results: Vec<FusedResult>) -> Vec<FusedResult> {
    for r in &mut results {
        r.authority_score = r.score * r.weight() as f32;
    }
    results.sort_by(|a, b| b.authority_score.total_cmp(&a.authority_score));
    results
}

/// Executes hybrid strategies against a vector index
pub struct HybridSearcher<'a> {
    index: &'a dyn VectorIndex,
    timeout: Duration,
    doctrine_topk_factor: f32,
}

impl<'a> HybridSearcher<'a> {
    pub fn new(index: &'a dyn VectorIndex, timeout: Duration, doctrine_topk_factor: f32) -> Self {
        Self {
            index,
            timeout,
            doctrine_topk_factor,
        }
    }

    /// Query every component in parallel and fuse.
    ///
    /// Failed components are skipped; the search only errors when no
    /// component is present or every component failed.
    pub async fn execute(
        &self,
        strategy: &HybridSearchStrategy,
        top_k: usize,
        filter: Option<&MetadataFilter>,
        with_vectors: bool,
    ) -> Result<Vec<FusedResult>> {
        if strategy.is_empty() {
            return Err(Error::Search("no search components".to_string()));
        }

        let mut planned: Vec<(SearchSource, &WeightedVector, usize)> = Vec::new();
        if let Some(ref t) = strategy.tension {
            planned.push((SearchSource::Tension, t, component_top_k(top_k, t.weight)));
        }
        for d in &strategy.doctrines {
            planned.push((
                SearchSource::Doctrine,
                d,
                component_top_k(top_k, d.weight * self.doctrine_topk_factor),
            ));
        }
        if let Some(ref k) = strategy.keyword {
            planned.push((SearchSource::Keyword, k, component_top_k(top_k, k.weight)));
        }

        let queries = planned.iter().map(|(source, wv, k)| {
            let mut options = QueryOptions::top_k(*k);
            options.filter = filter.cloned();
            options.with_vectors = with_vectors;
            async move {
                let result =
                    with_timeout(self.timeout, self.index.query(&wv.vector, &options)).await;
                (*source, wv.weight, result)
            }
        });

        let mut components = Vec::new();
        let mut failures = 0usize;
        for (source, weight, result) in join_all(queries).await {
            match result {
                Ok(hits) => {
                    debug!("{} component returned {} hits", source, hits.len());
                    components.push(ComponentHits {
                        source,
                        weight,
                        hits,
                    });
                }
                Err(e) => {
                    warn!("{} search component failed: {}", source, e);
                    failures += 1;
                }
            }
        }

        if components.is_empty() {
            return Err(Error::Search(format!(
                "all {} search components failed",
                failures
            )));
        }

        Ok(fuse(components, top_k))
    }
}

/// Which components produced the results and how they map to tensions
#[derive(Debug, Clone, Default, Serialize)]
pub struct Provenance {
    pub source_counts: BTreeMap<String, usize>,
    pub dominant_source: String,
    pub tension_contributions: BTreeMap<String, usize>,
    pub tension_alignment: BTreeMap<String, String>,
}

/// Summarise the provenance of a fused result set
pub fn analyze_provenance(results: &[FusedResult], tension_types: &[String]) -> Provenance {
    let mut counts: BTreeMap<SearchSource, usize> = BTreeMap::new();
    for r in results {
        for s in &r.sources {
            *counts.entry(*s).or_insert(0) += 1;
        }
    }

    // Highest count wins; ties go to the earlier source kind
    let dominant_source = counts
        .iter()
        .fold(None::<(SearchSource, usize)>, |best, (s, c)| match best {
            Some((_, bc)) if bc >= *c => best,
            _ => Some((*s, *c)),
        })
        .map(|(s, _)| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let mut provenance = Provenance {
        source_counts: counts.iter().map(|(s, c)| (s.to_string(), *c)).collect(),
        dominant_source,
        ..Provenance::default()
    };

    for tension in tension_types {
        let needle = tension.to_lowercase();
        let relevant = results
            .iter()
            .filter(|r| {
                r.sources.contains(&SearchSource::Tension)
                    && r.payload.text().to_lowercase().contains(&needle)
            })
            .count();
        provenance
            .tension_contributions
            .insert(tension.clone(), relevant);
        provenance.tension_alignment.insert(
            tension.clone(),
            if relevant > 0 { "aligned" } else { "weak" }.to_string(),
        );
    }

    provenance
}

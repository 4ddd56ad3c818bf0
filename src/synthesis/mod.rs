//! Structured input for the narrative synthesis service.
//!
//! A question is analysed for tensions, searched with the hybrid executor,
//! ranked by authority and split into statutes and case law. Large sets of
//! decisions are grouped by shared statute references and thinned to
//! representatives. Each tension is resolved against the index in parallel;
//! a tension that keeps failing is left out rather than failing the request.

use crate::cluster::{
    cluster_query_results, enrich_with_keywords, select_representatives, ClusterMember,
    DoctrineCluster,
};
use crate::config::{Config, DiscoveryConfig, SearchConfig, SynthesisConfig};
use crate::embed::Embedder;
use crate::error::{with_timeout, Error, Result};
use crate::search::{
    analyze_provenance, authority_rank, FusedResult, HybridSearchStrategy, HybridSearcher,
    Provenance, SearchMode,
};
use crate::store::{MetadataFilter, QueryOptions, VectorIndex};
use crate::tension::{
    analyze_question, doctrines_for, generate_strategies, Tension, TensionVectorizer,
    VectorStrategy, DOCTRINE_TENSIONS,
};
use crate::vector::{normalize, CachedEmbedder, EmbeddingCache};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Supporting decisions fetched per tension
const RESOLUTION_TOP_K: usize = 5;

/// Keywords attached to each query-time cluster
const CLUSTER_KEYWORDS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct SynthesisRequest {
    pub question: String,
    pub top_k: Option<usize>,
    /// Overrides `search.use_tensions`
    pub mode: Option<SearchMode>,
}

impl SynthesisRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedStatute {
    pub id: String,
    pub section: Option<String>,
    pub score: f32,
    pub authority_score: f32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseSummary {
    pub id: String,
    pub case_id: Option<String>,
    pub court: Option<String>,
    pub date: Option<String>,
    pub score: f32,
    pub weight: f64,
    pub text: String,
}

impl From<&ClusterMember> for CaseSummary {
    fn from(member: &ClusterMember) -> Self {
        let p = &member.payload;
        Self {
            id: member.id.clone(),
            case_id: p.get_str("case_id").map(str::to_string),
            court: p.get_str("court").map(str::to_string),
            date: p.get_str("date").map(str::to_string),
            score: member.score,
            weight: member.weight(),
            text: p.text().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub id: String,
    pub size: usize,
    pub common_sections: Vec<String>,
    pub keywords: Vec<String>,
    pub avg_weight: f64,
    /// Ids of the members chosen as representatives
    pub representatives: Vec<String>,
}

/// Index evidence for one tension
#[derive(Debug, Clone, Serialize)]
pub struct TensionResolution {
    pub tension_type: String,
    pub strength: f32,
    /// Doctrines known to resolve this tension
    pub resolving_doctrines: Vec<String>,
    pub supporting_cases: Vec<CaseSummary>,
}

/// Everything the synthesis service consumes
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisInput {
    pub question: String,
    pub mode: SearchMode,
    pub total_results: usize,
    pub statutes: Vec<RankedStatute>,
    pub clusters: Vec<ClusterSummary>,
    pub representative_cases: Vec<CaseSummary>,
    pub tensions: Vec<Tension>,
    pub resolutions: Vec<TensionResolution>,
    pub provenance: Provenance,
}

/// Run `op` until it succeeds, a non-transient error occurs, or `attempts`
/// are used up, sleeping `delay` between attempts.
pub async fn retry_fixed<T, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                debug!("Attempt {}/{} failed: {}", attempt, attempts, e);
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct Synthesizer<'a> {
    index: &'a dyn VectorIndex,
    embedder: &'a dyn Embedder,
    search: &'a SearchConfig,
    discovery: &'a DiscoveryConfig,
    synthesis: &'a SynthesisConfig,
}

impl<'a> Synthesizer<'a> {
    pub fn new(index: &'a dyn VectorIndex, embedder: &'a dyn Embedder, config: &'a Config) -> Self {
        Self {
            index,
            embedder,
            search: &config.search,
            discovery: &config.discovery,
            synthesis: &config.synthesis,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.search.request_timeout_secs)
    }

    /// Build the synthesis input for a question
    pub async fn prepare(&self, request: &SynthesisRequest) -> Result<SynthesisInput> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(Error::Validation("Question is required".to_string()));
        }

        let mode = request
            .mode
            .unwrap_or_else(|| SearchMode::from_flag(self.search.use_tensions));
        let top_k = request.top_k.unwrap_or(self.search.top_k).max(1);

        let cache = EmbeddingCache::new(self.search.cache_capacity);
        let vectorizer = TensionVectorizer::new(
            CachedEmbedder::new(self.embedder, &cache, self.timeout()),
            self.search,
        );

        let tensions = match mode {
            SearchMode::Tension => analyze_question(question),
            SearchMode::Plain => Vec::new(),
        };
        let strategies = generate_strategies(&tensions);
        let tension_types: Vec<String> = tensions.iter().map(|t| t.tension_type.clone()).collect();

        let strategy = if strategies.is_empty() {
            debug!("No tensions in question, searching with the plain query vector");
            let embedder = CachedEmbedder::new(self.embedder, &cache, self.timeout());
            HybridSearchStrategy::plain(normalize(&embedder.embed(question).await?))
        } else {
            vectorizer
                .build_hybrid_strategy(&strategies, &doctrines_for(&tension_types), Some(question))
                .await?
        };

        let candidates = top_k * self.search.candidate_multiplier.max(1);
        let searcher =
            HybridSearcher::new(self.index, self.timeout(), self.search.doctrine_topk_factor);
        let ranked = authority_rank(searcher.execute(&strategy, candidates, None, false).await?);
        let provenance = analyze_provenance(&ranked, &tension_types);
        let total_results = ranked.len();

        let (statutes, judicial): (Vec<FusedResult>, Vec<FusedResult>) = ranked
            .into_iter()
            .partition(|r| r.payload.chunk_type() == Some("statute"));

        let statutes: Vec<RankedStatute> = statutes
            .into_iter()
            .take(self.synthesis.max_statutes)
            .map(|r| RankedStatute {
                section: r.payload.get_str("section").map(str::to_string),
                text: r.payload.text().to_string(),
                id: r.id,
                score: r.score,
                authority_score: r.authority_score,
            })
            .collect();

        let (clusters, representative_cases) = self.group_cases(judicial);
        let resolutions = self.resolve_tensions(&vectorizer, &tensions).await;

        info!(
            "Prepared synthesis input: {} statutes, {} clusters, {} cases, {}/{} tensions resolved",
            statutes.len(),
            clusters.len(),
            representative_cases.len(),
            resolutions.len(),
            tensions.len()
        );

        Ok(SynthesisInput {
            question: question.to_string(),
            mode,
            total_results,
            statutes,
            clusters,
            representative_cases,
            tensions,
            resolutions,
            provenance,
        })
    }

    /// Cluster judicial results when there are enough of them and pick
    /// representatives; otherwise keep the top-ranked decisions.
    fn group_cases(&self, judicial: Vec<FusedResult>) -> (Vec<ClusterSummary>, Vec<CaseSummary>) {
        let members: Vec<ClusterMember> = judicial.into_iter().map(ClusterMember::from).collect();
        let limit = self.synthesis.max_representatives;

        if members.len() < self.synthesis.cluster_threshold {
            let cases = members.iter().take(limit).map(CaseSummary::from).collect();
            return (Vec::new(), cases);
        }

        let fallback: Vec<CaseSummary> = members.iter().take(limit).map(CaseSummary::from).collect();
        let mut clusters: Vec<DoctrineCluster> = cluster_query_results(
            members,
            self.discovery.query_min_jaccard,
            self.discovery.query_min_cluster_size,
        );
        if clusters.is_empty() {
            debug!("No statute-reference clusters among judicial results");
            return (Vec::new(), fallback);
        }
        enrich_with_keywords(&mut clusters, CLUSTER_KEYWORDS);

        let mut seen = HashSet::new();
        let mut cases = Vec::new();
        let mut summaries = Vec::with_capacity(clusters.len());

        for cluster in &clusters {
            let reps = select_representatives(cluster, self.synthesis.representatives_per_cluster);
            for rep in &reps {
                if cases.len() < limit && seen.insert(rep.id.clone()) {
                    cases.push(CaseSummary::from(rep));
                }
            }
            summaries.push(ClusterSummary {
                id: cluster.id.clone(),
                size: cluster.len(),
                common_sections: cluster.common_sections.clone(),
                keywords: cluster.keywords.clone(),
                avg_weight: cluster.avg_weight,
                representatives: reps.into_iter().map(|r| r.id).collect(),
            });
        }

        (summaries, cases)
    }

    /// Resolve every tension concurrently; exhausted tensions are omitted
    pub async fn resolve_tensions(
        &self,
        vectorizer: &TensionVectorizer<'_>,
        tensions: &[Tension],
    ) -> Vec<TensionResolution> {
        let strategies = generate_strategies(tensions);
        self.resolve_strategies(vectorizer, &strategies).await
    }

    pub async fn resolve_strategies(
        &self,
        vectorizer: &TensionVectorizer<'_>,
        strategies: &[VectorStrategy],
    ) -> Vec<TensionResolution> {
        let delay = Duration::from_millis(self.synthesis.retry_delay_ms);
        let attempts = self.synthesis.retry_attempts;

        let tasks = strategies.iter().map(|strategy| async move {
            let outcome =
                retry_fixed(attempts, delay, || self.resolve_one(vectorizer, strategy)).await;
            (strategy, outcome)
        });

        join_all(tasks)
            .await
            .into_iter()
            .filter_map(|(strategy, outcome)| match outcome {
                Ok(resolution) => Some(resolution),
                Err(e) => {
                    warn!("Omitting tension {}: {}", strategy.tension_type, e);
                    None
                }
            })
            .collect()
    }

    async fn resolve_one(
        &self,
        vectorizer: &TensionVectorizer<'_>,
        strategy: &VectorStrategy,
    ) -> Result<TensionResolution> {
        let vector = vectorizer.tension_vector(strategy).await?;
        let options =
            QueryOptions::top_k(RESOLUTION_TOP_K).with_filter(MetadataFilter::chunk_type("judicial"));
        let hits = with_timeout(self.timeout(), self.index.query(&vector, &options)).await?;

        let resolving_doctrines = DOCTRINE_TENSIONS
            .iter()
            .filter(|d| d.resolves.contains(&strategy.tension_type.as_str()))
            .map(|d| d.doctrine.to_string())
            .collect();

        let supporting_cases = hits
            .into_iter()
            .map(|hit| {
                CaseSummary::from(&ClusterMember {
                    id: hit.id,
                    score: hit.score,
                    vector: Vec::new(),
                    payload: hit.payload,
                })
            })
            .collect();

        Ok(TensionResolution {
            tension_type: strategy.tension_type.clone(),
            strength: strategy.weight,
            resolving_doctrines,
            supporting_cases,
        })
    }
}

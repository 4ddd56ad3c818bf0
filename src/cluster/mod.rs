//! Doctrine clustering
//!
//! Two clustering passes exist:
//! - [`agglomerative_cluster`] groups stored vectors by cosine similarity
//!   into candidate doctrines (average link, exact)
//! - [`cluster_query_results`] groups a ranked result set by the statute
//!   sections its members reference
//!
//! Keyword enrichment, anchoring and naming only decorate clusters and never
//! influence merge decisions.

mod anchor;
mod discovery;
mod keywords;
mod namer;
mod query;

pub use anchor::*;
pub use discovery::*;
pub use keywords::*;
pub use namer::*;
pub use query::*;

use crate::search::FusedResult;
use crate::store::{Payload, VectorRecord};
use crate::vector::{cosine_similarity, mean, normalize};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// One clustered item
#[derive(Debug, Clone, Serialize)]
pub struct ClusterMember {
    pub id: String,
    pub score: f32,
    #[serde(skip)]
    pub vector: Vec<f32>,
    pub payload: Payload,
}

impl ClusterMember {
    pub fn weight(&self) -> f64 {
        self.payload.weight()
    }

    pub fn statute_refs(&self) -> Vec<String> {
        self.payload.get_str_list("statute_refs")
    }
}

impl From<VectorRecord> for ClusterMember {
    fn from(record: VectorRecord) -> Self {
        Self {
            id: record.id,
            score: 0.0,
            vector: record.vector,
            payload: record.payload,
        }
    }
}

impl From<FusedResult> for ClusterMember {
    fn from(result: FusedResult) -> Self {
        Self {
            id: result.id,
            score: result.score,
            vector: result.vector.unwrap_or_default(),
            payload: result.payload,
        }
    }
}

/// Best-matching exemplar attached to a cluster
#[derive(Debug, Clone, Serialize)]
pub struct Anchor {
    pub id: String,
    pub score: f32,
    pub payload: Payload,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctrineCluster {
    pub id: String,
    pub members: Vec<ClusterMember>,
    #[serde(skip)]
    pub centroid: Vec<f32>,
    pub common_sections: Vec<String>,
    pub avg_weight: f64,
    pub avg_score: f32,
    pub keywords: Vec<String>,
    pub statute_anchor: Option<Anchor>,
    pub precedent_anchor: Option<Anchor>,
}

impl DoctrineCluster {
    fn from_members(id: String, members: Vec<ClusterMember>) -> Self {
        let centroid = centroid_of(&members);
        let avg_weight = average(members.iter().map(ClusterMember::weight));
        let avg_score = average(members.iter().map(|m| m.score as f64)) as f32;
        let common_sections = common_sections(&members);
        Self {
            id,
            members,
            centroid,
            common_sections,
            avg_weight,
            avg_score,
            keywords: Vec::new(),
            statute_anchor: None,
            precedent_anchor: None,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Distinct case ids of the members, in member order
    pub fn case_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.members
            .iter()
            .filter_map(|m| m.payload.get_str("case_id"))
            .filter(|id| seen.insert(id.to_string()))
            .map(str::to_string)
            .collect()
    }
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Normalised mean of the members' raw vectors
fn centroid_of(members: &[ClusterMember]) -> Vec<f32> {
    mean(
        members
            .iter()
            .filter(|m| !m.vector.is_empty())
            .map(|m| m.vector.as_slice()),
    )
    .map(|m| normalize(&m))
    .unwrap_or_default()
}

/// Sections referenced by at least half of the members, sorted
pub fn common_sections(members: &[ClusterMember]) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for m in members {
        let unique: HashSet<String> = m.statute_refs().into_iter().collect();
        for s in unique {
            *counts.entry(s).or_insert(0) += 1;
        }
    }

    let threshold = members.len().div_ceil(2);
    counts
        .into_iter()
        .filter(|(_, c)| *c >= threshold && *c > 0)
        .map(|(s, _)| s)
        .collect()
}

/// Agglomerative average-link clustering by cosine similarity.
///
/// Every round merges the single most similar pair of clusters (first pair
/// in scan order on ties) until the best similarity drops below
/// `min_similarity`. Merged centroids are the normalised mean of all member
/// vectors. Clusters smaller than `min_cluster_size` are dropped and the
/// rest are ordered largest first.
///
/// Pairwise similarities are cached and only the merged cluster's row is
/// recomputed after a merge, so the decision sequence equals a full rescan.
pub fn agglomerative_cluster(
    items: Vec<ClusterMember>,
    min_similarity: f32,
    min_cluster_size: usize,
) -> Vec<DoctrineCluster> {
    if items.is_empty() {
        return Vec::new();
    }

    let mut groups: Vec<Vec<ClusterMember>> = Vec::with_capacity(items.len());
    let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(items.len());
    for item in items {
        centroids.push(item.vector.clone());
        groups.push(vec![item]);
    }

    let n = groups.len();
    let mut sims = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let s = cosine_similarity(&centroids[i], &centroids[j]);
            sims[i][j] = s;
            sims[j][i] = s;
        }
    }

    let mut merges = 0usize;
    loop {
        let mut best: Option<(usize, usize, f32)> = None;
        for i in 0..groups.len() {
            for j in (i + 1)..groups.len() {
                let s = sims[i][j];
                if s >= min_similarity && best.map_or(true, |(_, _, b)| s > b) {
                    best = Some((i, j, s));
                }
            }
        }

        let Some((i, j, similarity)) = best else {
            break;
        };

        let absorbed = groups.remove(j);
        centroids.remove(j);
        sims.remove(j);
        for row in sims.iter_mut() {
            row.remove(j);
        }

        groups[i].extend(absorbed);
        centroids[i] = centroid_of(&groups[i]);
        for k in 0..groups.len() {
            let s = if k == i {
                0.0
            } else {
                cosine_similarity(&centroids[i], &centroids[k])
            };
            sims[i][k] = s;
            sims[k][i] = s;
        }

        merges += 1;
        if merges % 10 == 0 {
            debug!(
                "Merged {} times, {} clusters remaining, last sim={:.3}",
                merges,
                groups.len(),
                similarity
            );
        }
    }

    let mut groups: Vec<Vec<ClusterMember>> = groups
        .into_iter()
        .filter(|g| g.len() >= min_cluster_size)
        .collect();
    // Stable: equal sizes keep their first-member order
    groups.sort_by(|a, b| b.len().cmp(&a.len()));

    let clusters: Vec<DoctrineCluster> = groups
        .into_iter()
        .enumerate()
        .map(|(idx, members)| DoctrineCluster::from_members(format!("doctrine_{}", idx + 1), members))
        .collect();
    debug!(
        "Clustering finished: {} clusters kept after {} merges",
        clusters.len(),
        merges
    );
    clusters
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn member(id: &str, vector: Vec<f32>) -> ClusterMember {
        ClusterMember {
            id: id.to_string(),
            score: 0.0,
            vector,
            payload: Payload::default(),
        }
    }

    #[test]
    fn test_pair_above_threshold_merges_with_raw_mean_centroid() {
        // cos(a, b) = 0.75
        let a = vec![1.0, 0.0];
        let b = vec![0.75, (1.0f32 - 0.5625).sqrt()];
        assert!((cosine_similarity(&a, &b) - 0.75).abs() < 1e-6);

        let clusters = agglomerative_cluster(
            vec![member("a", a.clone()), member("b", b.clone())],
            0.70,
            2,
        );

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 2);

        let expected = normalize(&[(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0]);
        for (got, want) in clusters[0].centroid.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_centroid_uses_member_vectors_not_old_centroids() {
        // Three members merge in two rounds; the final centroid must be the
        // mean of all three raw vectors
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.98, 0.2, 0.0];
        let c = vec![0.9, 0.0, 0.43];
        let clusters = agglomerative_cluster(
            vec![member("a", a.clone()), member("b", b.clone()), member("c", c.clone())],
            0.5,
            1,
        );

        assert_eq!(clusters.len(), 1);
        let expected = normalize(&mean([&a[..], &b[..], &c[..]]).unwrap());
        for (got, want) in clusters[0].centroid.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_below_threshold_stays_apart() {
        let clusters = agglomerative_cluster(
            vec![member("a", vec![1.0, 0.0]), member("b", vec![0.0, 1.0])],
            0.70,
            1,
        );
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_min_cluster_size_and_ordering() {
        let items = vec![
            member("x1", vec![1.0, 0.0, 0.0]),
            member("y1", vec![0.0, 1.0, 0.0]),
            member("x2", vec![0.99, 0.1, 0.0]),
            member("y2", vec![0.1, 0.99, 0.0]),
            member("x3", vec![0.98, 0.0, 0.1]),
            member("z1", vec![0.0, 0.0, 1.0]),
        ];

        let clusters = agglomerative_cluster(items, 0.9, 2);
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.len() >= 2));
        assert_eq!(clusters[0].len(), 3);
        assert_eq!(clusters[1].len(), 2);
        assert!(clusters[0].members.iter().all(|m| m.id.starts_with('x')));
    }

    #[test]
    fn test_ids_follow_size_order() {
        let items = vec![
            member("y1", vec![0.0, 1.0, 0.0]),
            member("y2", vec![0.1, 0.99, 0.0]),
            member("x1", vec![1.0, 0.0, 0.0]),
            member("x2", vec![0.99, 0.1, 0.0]),
            member("x3", vec![0.98, 0.0, 0.1]),
        ];

        let clusters = agglomerative_cluster(items, 0.9, 2);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].id, "doctrine_1");
        assert_eq!(clusters[0].len(), 3);
        assert_eq!(clusters[0].members[0].id, "x1");
        assert_eq!(clusters[1].id, "doctrine_2");
        assert_eq!(clusters[1].members[0].id, "y1");
    }

    #[test]
    fn test_empty_input() {
        assert!(agglomerative_cluster(Vec::new(), 0.7, 1).is_empty());
    }

    #[test]
    fn test_common_sections_half_threshold() {
        let with_refs = |id: &str, refs: &[&str]| {
            let mut m = member(id, vec![1.0]);
            m.payload.insert(
                "statute_refs",
                refs.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            );
            m
        };
        let members = vec![
            with_refs("a", &["§1089", "§992"]),
            with_refs("b", &["§1089"]),
            with_refs("c", &["§992", "§1089"]),
            with_refs("d", &["§3"]),
        ];
        assert_eq!(common_sections(&members), vec!["§1089", "§992"]);
    }

    #[test]
    fn test_avg_weight_defaults_to_one() {
        let mut heavy = member("a", vec![1.0, 0.0]);
        heavy.payload.insert("weight", 3.0);
        let clusters =
            agglomerative_cluster(vec![heavy, member("b", vec![1.0, 0.01])], 0.7, 2);
        assert!((clusters[0].avg_weight - 2.0).abs() < 1e-9);
    }
}

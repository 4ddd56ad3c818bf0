//! Query-time clustering of ranked results by shared statute references

use super::{ClusterMember, DoctrineCluster};
use crate::weight::CourtLevel;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Weight difference above which weight outranks similarity
const WEIGHT_GAP: f64 = 0.5;

/// Jaccard similarity of two reference lists; 0.0 when either is empty
pub fn jaccard(a: &[String], b: &[String]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a: HashSet<&String> = a.iter().collect();
    let b: HashSet<&String> = b.iter().collect();
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    intersection as f32 / union as f32
}

/// Greedy seed-based grouping of results by statute references.
///
/// Each unassigned result with references seeds a group; later unassigned
/// results join when their Jaccard similarity to the seed reaches
/// `min_jaccard`. Groups below `min_size` are dropped (their members stay
/// assigned). Output is ordered largest first.
pub fn cluster_query_results(
    results: Vec<ClusterMember>,
    min_jaccard: f32,
    min_size: usize,
) -> Vec<DoctrineCluster> {
    let refs: Vec<Vec<String>> = results.iter().map(ClusterMember::statute_refs).collect();
    let mut assigned = vec![false; results.len()];
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for i in 0..results.len() {
        if assigned[i] || refs[i].is_empty() {
            continue;
        }
        assigned[i] = true;
        let mut group = vec![i];

        for j in (i + 1)..results.len() {
            if !assigned[j] && jaccard(&refs[i], &refs[j]) >= min_jaccard {
                assigned[j] = true;
                group.push(j);
            }
        }

        if group.len() >= min_size {
            groups.push(group);
        }
    }

    let mut slots: Vec<Option<ClusterMember>> = results.into_iter().map(Some).collect();
    let mut clusters: Vec<DoctrineCluster> = groups
        .into_iter()
        .enumerate()
        .map(|(n, idxs)| {
            let members = idxs.into_iter().filter_map(|i| slots[i].take()).collect();
            let mut cluster = DoctrineCluster::from_members(format!("cluster_{}", n + 1), members);
            cluster.centroid.clear();
            cluster
        })
        .collect();

    clusters.sort_by(|a, b| b.len().cmp(&a.len()));
    clusters
}

fn is_supreme(member: &ClusterMember) -> bool {
    member
        .payload
        .get_str("court")
        .map(|c| CourtLevel::from_name(c) == CourtLevel::Supreme)
        .unwrap_or(false)
}

fn representative_order(a: &ClusterMember, b: &ClusterMember) -> Ordering {
    match (is_supreme(a), is_supreme(b)) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }

    let (wa, wb) = (a.weight(), b.weight());
    if (wa - wb).abs() > WEIGHT_GAP {
        return wb.total_cmp(&wa);
    }

    b.score.total_cmp(&a.score)
}

/// Up to `n` members: Supreme Court first, then clearly heavier weight,
/// then similarity.
///
/// The weight-gap rule is not transitive, so members are placed by stable
/// insertion rather than a library sort.
pub fn select_representatives(cluster: &DoctrineCluster, n: usize) -> Vec<ClusterMember> {
    let mut ordered: Vec<&ClusterMember> = Vec::with_capacity(cluster.members.len());
    for member in &cluster.members {
        let pos = ordered
            .iter()
            .position(|existing| representative_order(member, existing) == Ordering::Less)
            .unwrap_or(ordered.len());
        ordered.insert(pos, member);
    }
    ordered.into_iter().take(n).cloned().collect()
}

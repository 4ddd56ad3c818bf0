//! Doctrine naming

use super::DoctrineCluster;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctrineName {
    /// snake_case identifier, unique per doctrine
    pub name: String,
    pub display_name: String,
    pub description: String,
}

/// Produces human-readable names for discovered clusters.
///
/// `position` is the cluster's zero-based rank in the discovery run.
#[async_trait]
pub trait DoctrineNamer: Send + Sync {
    async fn name(&self, cluster: &DoctrineCluster, position: usize) -> Result<DoctrineName>;
}

/// Deterministic namer built from cluster keywords
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordNamer;

impl KeywordNamer {
    pub fn fallback(cluster: &DoctrineCluster, position: usize) -> DoctrineName {
        let n = position + 1;
        let display_name = match cluster.keywords.as_slice() {
            [] => format!("Právní institut {}", n),
            kws => {
                let label = kws.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
                let mut chars = label.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => label,
                }
            }
        };

        DoctrineName {
            name: format!("auto_doctrine_{}", n),
            display_name,
            description: format!("Cluster obsahující: {}", cluster.keywords.join(", ")),
        }
    }
}

#[async_trait]
impl DoctrineNamer for KeywordNamer {
    async fn name(&self, cluster: &DoctrineCluster, position: usize) -> Result<DoctrineName> {
        Ok(Self::fallback(cluster, position))
    }
}

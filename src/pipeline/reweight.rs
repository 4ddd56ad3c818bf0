//! Recompute authority weights of indexed decisions.
//!
//! Weights decay with age, so they go stale. Recomputation re-reads every
//! chunk of a decision, refreshes its citation count from the citations
//! table and writes the new weight back to the index and the decisions row.

use crate::error::Result;
use crate::meta::{now_timestamp, MetaDb};
use crate::models::ChunkMetadata;
use crate::store::{MetadataFilter, VectorIndex, VectorRecord};
use crate::weight::{chunk_weight, decision_weight};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Upper bound on chunks fetched per decision
const MAX_CHUNKS_PER_DECISION: usize = 10_000;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReweightReport {
    pub decisions_updated: usize,
    pub chunks_updated: usize,
    /// Case ids with no chunks in the index
    pub missing: Vec<String>,
    /// Case ids whose recomputation failed, with the error
    pub failed: Vec<String>,
}

pub struct WeightRecomputer<'a> {
    db: &'a MetaDb,
    index: &'a dyn VectorIndex,
    as_of: NaiveDate,
}

impl<'a> WeightRecomputer<'a> {
    pub fn new(db: &'a MetaDb, index: &'a dyn VectorIndex) -> Self {
        Self {
            db,
            index,
            as_of: chrono::Utc::now().date_naive(),
        }
    }

    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    /// Recompute the given decisions, or every stored decision when empty
    pub async fn run(&self, case_ids: &[String]) -> Result<ReweightReport> {
        let case_ids: Vec<String> = if case_ids.is_empty() {
            self.db
                .list_decisions()
                .await?
                .into_iter()
                .map(|d| d.case_id)
                .collect()
        } else {
            case_ids.to_vec()
        };

        let mut report = ReweightReport::default();
        for case_id in &case_ids {
            match self.recompute_decision(case_id).await {
                Ok(0) => report.missing.push(case_id.clone()),
                Ok(updated) => {
                    report.decisions_updated += 1;
                    report.chunks_updated += updated;
                }
                Err(e) => {
                    warn!("Failed to reweight {}: {}", case_id, e);
                    report.failed.push(format!("{}: {}", case_id, e));
                }
            }
        }

        info!(
            "Recomputed weights for {} decisions ({} chunks, {} failed)",
            report.decisions_updated,
            report.chunks_updated,
            report.failed.len()
        );
        Ok(report)
    }

    /// Returns the number of chunks rewritten
    pub async fn recompute_decision(&self, case_id: &str) -> Result<usize> {
        let filter = MetadataFilter::new().eq("case_id", case_id);
        let records = self
            .index
            .scroll(Some(&filter), MAX_CHUNKS_PER_DECISION)
            .await?;

        if records.is_empty() {
            debug!("No indexed chunks for {}", case_id);
            return Ok(0);
        }

        let cited_by = self.db.count_citations_to(case_id).await?;
        let stored = self.db.get_decision(case_id).await?;
        let updated_at = now_timestamp();

        let mut rewritten = Vec::with_capacity(records.len());
        let mut base_weight = None;

        for record in records {
            let mut metadata = match record.payload.to_metadata() {
                Ok(ChunkMetadata::Judicial(meta)) => meta,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping {} with unreadable metadata: {}", record.id, e);
                    continue;
                }
            };

            let citations = u32::try_from(cited_by).unwrap_or(u32::MAX);
            metadata.citation_count = metadata.citation_count.max(citations);
            if let Some(ref decision) = stored {
                metadata.is_binding = decision.is_binding;
                metadata.en_banc = decision.en_banc;
                metadata.overruled = decision.overruled;
            }

            base_weight.get_or_insert_with(|| decision_weight(&metadata, self.as_of));
            let citation_count = metadata.citation_count;
            let weight = chunk_weight(&ChunkMetadata::Judicial(metadata), self.as_of);

            let mut payload = record.payload;
            payload.insert("weight", weight);
            payload.insert("citation_count", citation_count);
            payload.insert("weight_updated_at", updated_at.clone());

            rewritten.push(VectorRecord {
                id: record.id,
                vector: record.vector,
                payload,
            });
        }

        let count = rewritten.len();
        if count > 0 {
            self.index.upsert(rewritten).await?;
        }
        if let Some(weight) = base_weight {
            self.db.update_decision_weight(case_id, weight).await?;
        }

        debug!("Reweighted {} chunks of {}", count, case_id);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::tests::setup_test_db;
    use crate::models::{JudicialMetadata, JudicialSubtype};
    use crate::error::Error;
    use crate::store::{MemoryIndex, Payload, QueryOptions, SearchResult};
    use async_trait::async_trait;

    /// Index that refuses writes for one decision
    struct RejectingIndex {
        inner: MemoryIndex,
        rejected: String,
    }

    #[async_trait]
    impl VectorIndex for RejectingIndex {
        async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
            if records
                .iter()
                .any(|r| r.payload.get_str("case_id") == Some(self.rejected.as_str()))
            {
                return Err(Error::Qdrant(format!("write rejected for {}", self.rejected)));
            }
            self.inner.upsert(records).await
        }

        async fn query(&self, vector: &[f32], options: &QueryOptions) -> Result<Vec<SearchResult>> {
            self.inner.query(vector, options).await
        }

        async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<VectorRecord>> {
            self.inner.get_by_ids(ids).await
        }

        async fn scroll(
            &self,
            filter: Option<&MetadataFilter>,
            limit: usize,
        ) -> Result<Vec<VectorRecord>> {
            self.inner.scroll(filter, limit).await
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    fn judicial(case_id: &str, subtype: JudicialSubtype) -> JudicialMetadata {
        JudicialMetadata {
            subtype,
            case_id: case_id.to_string(),
            court: "Nejvyšší soud".to_string(),
            date: "2020-01-01".to_string(),
            section: None,
            statute_refs: vec![],
            is_binding: true,
            en_banc: false,
            citation_count: 0,
            overruled: false,
            cites: vec![],
            weight: None,
        }
    }

    fn record(id: &str, meta: JudicialMetadata) -> VectorRecord {
        let mut payload = Payload::from_metadata(&ChunkMetadata::Judicial(meta)).unwrap();
        payload.insert("weight", 99.0);
        VectorRecord {
            id: id.to_string(),
            vector: vec![1.0, 0.0],
            payload,
        }
    }

    #[tokio::test]
    async fn test_recompute_updates_every_chunk() {
        let (db, _temp) = setup_test_db().await;
        let index = MemoryIndex::new(2);
        index
            .upsert(vec![
                record("p", judicial("22 Cdo 1/2020", JudicialSubtype::Principle)),
                record("f", judicial("22 Cdo 1/2020", JudicialSubtype::FullDecision)),
                record("other", judicial("30 Cdo 5/2019", JudicialSubtype::Principle)),
            ])
            .await
            .unwrap();

        let as_of = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let report = WeightRecomputer::new(&db, &index)
            .with_as_of(as_of)
            .run(&["22 Cdo 1/2020".to_string(), "missing".to_string()])
            .await
            .unwrap();

        assert_eq!(report.decisions_updated, 1);
        assert_eq!(report.chunks_updated, 2);
        assert_eq!(report.missing, vec!["missing"]);

        let records = index
            .get_by_ids(&["p".to_string(), "f".to_string(), "other".to_string()])
            .await
            .unwrap();
        assert!((records[0].payload.weight() - 24.0).abs() < 1e-9);
        assert!((records[1].payload.weight() - 20.0).abs() < 1e-9);
        assert!(records[0].payload.get_str("weight_updated_at").is_some());
        assert_eq!(records[2].payload.weight(), 99.0);
    }

    #[tokio::test]
    async fn test_citations_raise_weight() {
        let (db, _temp) = setup_test_db().await;
        let index = MemoryIndex::new(2);
        index
            .upsert(vec![record("p", judicial("22 Cdo 1/2020", JudicialSubtype::Principle))])
            .await
            .unwrap();

        let as_of = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let recomputer = WeightRecomputer::new(&db, &index).with_as_of(as_of);
        recomputer.recompute_decision("22 Cdo 1/2020").await.unwrap();
        let before = index.get_by_ids(&["p".to_string()]).await.unwrap()[0]
            .payload
            .weight();

        db.insert_citations("25 Cdo 2/2021", &["22 Cdo 1/2020".to_string()])
            .await
            .unwrap();
        recomputer.recompute_decision("22 Cdo 1/2020").await.unwrap();
        let after = index.get_by_ids(&["p".to_string()]).await.unwrap()[0].payload.clone();

        assert!(after.weight() > before);
        assert_eq!(after.get("citation_count").and_then(|v| v.as_i64()), Some(1));
    }

    #[tokio::test]
    async fn test_one_failing_decision_does_not_stop_the_run() {
        let (db, _temp) = setup_test_db().await;
        let inner = MemoryIndex::new(2);
        inner
            .upsert(vec![
                record("bad", judicial("30 Cdo 5/2019", JudicialSubtype::Principle)),
                record("good", judicial("22 Cdo 1/2020", JudicialSubtype::Principle)),
            ])
            .await
            .unwrap();
        let index = RejectingIndex {
            inner,
            rejected: "30 Cdo 5/2019".to_string(),
        };

        let as_of = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let report = WeightRecomputer::new(&db, &index)
            .with_as_of(as_of)
            .run(&["30 Cdo 5/2019".to_string(), "22 Cdo 1/2020".to_string()])
            .await
            .unwrap();

        assert_eq!(report.decisions_updated, 1);
        assert_eq!(report.chunks_updated, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].starts_with("30 Cdo 5/2019: "));

        let records = index
            .get_by_ids(&["bad".to_string(), "good".to_string()])
            .await
            .unwrap();
        assert_eq!(records[0].payload.weight(), 99.0);
        assert!((records[1].payload.weight() - 24.0).abs() < 1e-9);
    }
}

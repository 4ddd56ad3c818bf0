//! Reweight command

use crate::error::Result;
use crate::meta::MetaDb;
use crate::pipeline::{ReweightReport, WeightRecomputer};
use crate::store::VectorIndex;

/// Recompute authority weights for the given decisions, or all of them
pub async fn cmd_reweight(
    db: &MetaDb,
    index: &dyn VectorIndex,
    case_ids: &[String],
) -> Result<ReweightReport> {
    WeightRecomputer::new(db, index).run(case_ids).await
}

pub fn print_reweight_report(report: &ReweightReport) {
    println!("\n⚖️  Weights recomputed");
    println!("  Decisions: {}", report.decisions_updated);
    println!("  Chunks: {}", report.chunks_updated);
    if !report.missing.is_empty() {
        println!("  Not in index: {}", report.missing.join(", "));
    }
    for failure in &report.failed {
        println!("  ❌ {}", failure);
    }
}

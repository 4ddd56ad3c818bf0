//! Decision lookup command

use crate::error::{Error, Result};
use crate::meta::{DecisionRecord, MetaDb};
use serde::Serialize;

/// A stored decision with its citation links
#[derive(Debug, Clone, Serialize)]
pub struct DecisionDetail {
    #[serde(flatten)]
    pub decision: DecisionRecord,
    pub cites: Vec<String>,
    pub cited_by: i64,
}

pub async fn cmd_decision_show(db: &MetaDb, case_id: &str) -> Result<DecisionDetail> {
    let decision = db
        .get_decision(case_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("decision {}", case_id)))?;
    let cites = db.citations_from(case_id).await?;
    let cited_by = db.count_citations_to(case_id).await?;

    Ok(DecisionDetail {
        decision,
        cites,
        cited_by,
    })
}

pub fn print_decision(detail: &DecisionDetail) {
    let d = &detail.decision;
    println!("\n⚖️  {}", d.case_id);
    println!("  Court: {}", d.court);
    println!("  Date: {}", d.date);
    if let Some(ref ecli) = d.ecli {
        println!("  ECLI: {}", ecli);
    }
    if let Some(ref kind) = d.decision_type {
        println!("  Type: {}", kind);
    }
    if let Some(ref area) = d.legal_area {
        println!("  Area: {}", area);
    }
    println!(
        "  Binding: {}  En banc: {}  Overruled: {}",
        d.is_binding, d.en_banc, d.overruled
    );
    println!("  Weight: {:.2} ({} citations)", d.weight, d.citation_count);
    println!("  Updated: {}", d.updated_at);
    println!("\n  {}", d.principle);
    if !detail.cites.is_empty() {
        println!("\n  Cites: {}", detail.cites.join(", "));
    }
    if detail.cited_by > 0 {
        println!("  Cited by {} decisions", detail.cited_by);
    }
}

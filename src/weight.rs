//! Authority weighting of decisions
//!
//! `weight = court_rank × e^(-0.15 × years) × (1 + ln(1 + citations) × 0.2)
//!          × binding × en_banc × overruled`
//!
//! The weight is a pure function of metadata and an explicit reference date,
//! so recomputing it never drifts.

use crate::models::{ChunkMetadata, JudicialMetadata};
use chrono::NaiveDate;

/// Yearly exponential decay rate
pub const RECENCY_DECAY: f64 = 0.15;
/// Multiplier on ln(1 + citations)
pub const CITATION_FACTOR: f64 = 0.2;
pub const BINDING_MULTIPLIER: f64 = 2.0;
pub const EN_BANC_MULTIPLIER: f64 = 1.5;
pub const OVERRULED_MULTIPLIER: f64 = 0.1;
/// Extra weight of principle chunks over their decision
pub const PRINCIPLE_MULTIPLIER: f64 = 1.2;
pub const STATUTE_WEIGHT: f64 = 1.0;

const DAYS_PER_YEAR: f64 = 365.25;

/// Court hierarchy levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourtLevel {
    District,
    Regional,
    Appellate,
    Supreme,
    /// Unrecognised court
    Other,
}

impl CourtLevel {
    /// Classify a court by name (Czech or English)
    pub fn from_name(court: &str) -> Self {
        let name = court.to_lowercase();
        if name.contains("nejvyšší") || name.contains("supreme") {
            CourtLevel::Supreme
        } else if name.contains("vrchní") || name.contains("high court") || name.contains("appellate") {
            CourtLevel::Appellate
        } else if name.contains("krajský") || name.contains("regional") {
            CourtLevel::Regional
        } else if name.contains("okresní") || name.contains("district") {
            CourtLevel::District
        } else {
            CourtLevel::Other
        }
    }

    pub fn rank(self) -> f64 {
        match self {
            CourtLevel::Supreme => 10.0,
            CourtLevel::Appellate => 5.0,
            CourtLevel::Regional => 2.0,
            CourtLevel::District | CourtLevel::Other => 1.0,
        }
    }
}

/// Years elapsed between a decision date and `as_of`.
///
/// Unparsable or future dates count as zero years.
pub fn years_since(date: &str, as_of: NaiveDate) -> f64 {
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date.get(..10).unwrap_or(date), "%Y-%m-%d"));
    match parsed {
        Ok(decided) => ((as_of - decided).num_days() as f64 / DAYS_PER_YEAR).max(0.0),
        Err(_) => 0.0,
    }
}

/// Authority weight of a decision as of a given date
pub fn decision_weight(meta: &JudicialMetadata, as_of: NaiveDate) -> f64 {
    let years = years_since(&meta.date, as_of);

    let mut weight = CourtLevel::from_name(&meta.court).rank()
        * (-RECENCY_DECAY * years).exp()
        * (1.0 + (meta.citation_count as f64).ln_1p() * CITATION_FACTOR);

    if meta.is_binding {
        weight *= BINDING_MULTIPLIER;
    }
    if meta.en_banc {
        weight *= EN_BANC_MULTIPLIER;
    }
    if meta.overruled {
        weight *= OVERRULED_MULTIPLIER;
    }

    weight
}

/// Weight stored with a chunk in the index.
///
/// Statutes weigh 1.0; principle chunks get a bonus over their decision.
pub fn chunk_weight(meta: &ChunkMetadata, as_of: NaiveDate) -> f64 {
    match meta {
        ChunkMetadata::Statute(_) => STATUTE_WEIGHT,
        ChunkMetadata::Judicial(j) => {
            let base = decision_weight(j, as_of);
            if meta.is_principle() {
                base * PRINCIPLE_MULTIPLIER
            } else {
                base
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JudicialSubtype, StatuteMetadata};

    fn decision(court: &str, date: &str) -> JudicialMetadata {
        JudicialMetadata {
            subtype: JudicialSubtype::FullDecision,
            case_id: "22 Cdo 1/2020".to_string(),
            court: court.to_string(),
            date: date.to_string(),
            section: None,
            statute_refs: vec![],
            is_binding: false,
            en_banc: false,
            citation_count: 0,
            overruled: false,
            cites: vec![],
            weight: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_supreme_binding_today() {
        let mut meta = decision("Nejvyšší soud", "2024-06-01");
        meta.is_binding = true;
        assert!((decision_weight(&meta, today()) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_district_thirty_years_old() {
        let meta = decision("Okresní soud v Brně", "1994-06-01");
        let years = years_since(&meta.date, today());
        let expected = (-0.15 * years).exp();
        let weight = decision_weight(&meta, today());

        assert!((weight - expected).abs() < 1e-12);
        assert!((weight - 0.0111).abs() < 1e-3);
    }

    #[test]
    fn test_monotonic_in_age_and_citations() {
        let mut previous = f64::INFINITY;
        for year in [2024, 2020, 2010, 1990] {
            let meta = decision("Krajský soud", &format!("{}-01-01", year));
            let w = decision_weight(&meta, today());
            assert!(w <= previous);
            previous = w;
        }

        let mut previous = 0.0;
        for citations in [0, 1, 5, 50, 500] {
            let mut meta = decision("Vrchní soud", "2015-01-01");
            meta.citation_count = citations;
            let w = decision_weight(&meta, today());
            assert!(w >= previous);
            previous = w;
        }
    }

    #[test]
    fn test_flags_multiply() {
        let base = decision_weight(&decision("Supreme Court", "2024-06-01"), today());
        let mut meta = decision("Supreme Court", "2024-06-01");
        meta.en_banc = true;
        meta.overruled = true;
        let flagged = decision_weight(&meta, today());
        assert!((flagged - base * 1.5 * 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_court_and_bad_date() {
        let meta = decision("Ústavní soud", "not a date");
        assert!((decision_weight(&meta, today()) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_future_date_counts_as_now() {
        let meta = decision("Okresní soud", "2030-01-01");
        assert!((decision_weight(&meta, today()) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_chunk_weight() {
        let statute = ChunkMetadata::Statute(StatuteMetadata {
            section: "1".into(),
            sub_chunk: None,
            version_date: "2024-01-01".into(),
            source: "Civil Code".into(),
            book: None,
            chapter: None,
            statute_refs: vec![],
        });
        assert_eq!(chunk_weight(&statute, today()), 1.0);

        let mut principle = decision("Nejvyšší soud", "2024-06-01");
        principle.subtype = JudicialSubtype::Principle;
        principle.is_binding = true;
        let w = chunk_weight(&ChunkMetadata::Judicial(principle), today());
        assert!((w - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_is_idempotent() {
        let meta = decision("Krajský soud", "2001-09-11");
        assert_eq!(decision_weight(&meta, today()), decision_weight(&meta, today()));
    }
}

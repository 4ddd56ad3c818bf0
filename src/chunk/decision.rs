//! Court decision parsing and chunking

use super::{
    extract_statute_refs, find_roman_headers, safe_id_component, short_hash, split_at_markers,
    truncate_chars,
};
use crate::config::ChunkConfig;
use crate::models::{Chunk, ChunkMetadata, JudicialMetadata, JudicialSubtype};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Court assumed when a decision header names none
pub const DEFAULT_COURT: &str = "Nejvyšší soud";

const CONTINUATION_MARKER: &str = "\n\n[Section continues...]";

fn case_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"sp\.\s*zn\.\s*([\w/ ]+)").expect("static regex"))
}

fn ecli_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"ECLI:[\w.:]+").expect("static regex"))
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,2})\.\s?(\d{1,2})\.\s?(\d{4})").expect("static regex"))
}

fn decision_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+/\d+").expect("static regex"))
}

/// Header fields and holding extracted from a raw decision text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDecision {
    pub case_id: String,
    pub court: String,
    /// ISO date (YYYY-MM-DD)
    pub date: String,
    pub ecli: Option<String>,
    pub decision_number: Option<String>,
    pub decision_type: Option<String>,
    pub legal_area: Option<String>,
    /// The legal principle ("právní věta")
    pub principle: String,
    pub statute_refs: Vec<String>,
}

/// Authority-relevant facts supplied alongside a decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionFacts {
    pub is_binding: bool,
    pub en_banc: bool,
    pub citation_count: u32,
    pub overruled: bool,
    pub cites: Vec<String>,
}

impl Default for DecisionFacts {
    fn default() -> Self {
        Self {
            is_binding: true,
            en_banc: false,
            citation_count: 0,
            overruled: false,
            cites: Vec::new(),
        }
    }
}

fn value_after_colon(line: &str) -> Option<String> {
    let value = line.split_once(':')?.1.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse the header block of a decision.
///
/// Missing fields fall back to defaults: case id `unknown`, the supreme
/// court, today's date, and the first `principle_fallback_chars` characters
/// of the text as principle.
pub fn parse_decision(text: &str, config: &ChunkConfig) -> ParsedDecision {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    let mut case_id = None;
    let mut court = None;
    let mut date = None;
    let mut ecli = None;
    let mut decision_number = None;
    let mut decision_type = None;
    let mut legal_area = None;
    let mut principle: Option<String> = None;

    for (i, line) in lines.iter().enumerate() {
        if case_id.is_none() && line.contains("sp. zn.") {
            case_id = case_id_re()
                .captures(line)
                .map(|c| c[1].trim().to_string())
                .filter(|s| !s.is_empty());
        }

        if ecli.is_none() && line.contains("ECLI:") {
            ecli = ecli_re().find(line).map(|m| m.as_str().to_string());
        }

        if court.is_none() && line.starts_with("Soud:") {
            court = value_after_colon(line);
        }

        if date.is_none() && line.starts_with("Datum rozhodnutí") {
            date = date_re().captures(line).map(|c| {
                format!("{}-{:0>2}-{:0>2}", &c[3], &c[2], &c[1])
            });
        }

        if decision_number.is_none() && line.starts_with("Číslo rozhodnutí") {
            decision_number = decision_number_re().find(line).map(|m| m.as_str().to_string());
        }

        if decision_type.is_none() && line.starts_with("Typ rozhodnutí") {
            decision_type = value_after_colon(line);
        }

        if legal_area.is_none() && line.starts_with("Hesla:") {
            legal_area = value_after_colon(line);
        }

        if principle.is_none() && line.starts_with("Právní věta") {
            principle = Some(collect_principle(&lines[i + 1..]));
        }
    }

    let principle = principle
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| {
            truncate_chars(text.trim(), config.principle_fallback_chars)
                .0
                .to_string()
        });

    ParsedDecision {
        case_id: case_id.unwrap_or_else(|| format!("unknown_{}", short_hash(text.trim()))),
        court: court.unwrap_or_else(|| DEFAULT_COURT.to_string()),
        date: date.unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string()),
        ecli,
        decision_number,
        decision_type,
        legal_area,
        principle,
        statute_refs: extract_statute_refs(text),
    }
}

/// Collect the holding paragraph following a "Právní věta:" label.
///
/// Lines of substance are gathered until one ends a sentence or the next
/// header field starts.
fn collect_principle(lines: &[&str]) -> String {
    let mut parts = Vec::new();
    for line in lines {
        if line.starts_with("Soud:") || line.starts_with("Datum") {
            break;
        }
        if line.chars().count() > 20 {
            parts.push(*line);
            if line.ends_with('.') {
                break;
            }
        }
    }
    parts.join(" ")
}

/// Split a decision into a principle chunk followed by full-text chunks.
///
/// Full-text chunks follow roman-numeral headers; sections below the minimum
/// length are dropped and sections above the maximum are truncated with a
/// continuation marker. Without headers the whole text forms one section.
pub fn chunk_decision(
    text: &str,
    parsed: &ParsedDecision,
    facts: &DecisionFacts,
    config: &ChunkConfig,
) -> Vec<Chunk> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let case_safe = safe_id_component(&parsed.case_id);
    let metadata = |subtype: JudicialSubtype, section: Option<&str>| {
        ChunkMetadata::Judicial(JudicialMetadata {
            subtype,
            case_id: parsed.case_id.clone(),
            court: parsed.court.clone(),
            date: parsed.date.clone(),
            section: section.map(str::to_string),
            statute_refs: parsed.statute_refs.clone(),
            is_binding: facts.is_binding,
            en_banc: facts.en_banc,
            citation_count: facts.citation_count,
            overruled: facts.overruled,
            cites: facts.cites.clone(),
            weight: None,
        })
    };

    let mut chunks = vec![Chunk {
        id: format!("decision_{}_principle", case_safe),
        text: parsed.principle.clone(),
        metadata: metadata(JudicialSubtype::Principle, None),
    }];

    let headers = find_roman_headers(text);
    let mut sections: Vec<(&str, &str)> = split_at_markers(text, &headers)
        .into_iter()
        .filter(|(_, body)| body.chars().count() > config.decision_min_section_chars)
        .collect();
    if sections.is_empty() {
        sections.push(("full", text));
    }

    for (idx, (name, body)) in sections.into_iter().enumerate() {
        let (kept, truncated) = truncate_chars(body, config.decision_max_chars);
        let section_text = if truncated {
            format!("{}{}", kept, CONTINUATION_MARKER)
        } else {
            kept.to_string()
        };

        chunks.push(Chunk {
            id: format!("decision_{}_section_{}_{}", case_safe, name, idx),
            text: section_text,
            metadata: metadata(JudicialSubtype::FullDecision, Some(name)),
        });
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECISION: &str = "\
Rozhodnutí Nejvyššího soudu sp. zn. 22 Cdo 1234/2019
ECLI:CZ:NS:2020:22.CDO.1234.2019.1
Soud: Nejvyšší soud
Datum rozhodnutí: 05.03.2020
Číslo rozhodnutí: 45/2021
Typ rozhodnutí: Rozsudek
Hesla: Vydržení, Dobrá víra
Právní věta:
Oprávněná držba podle § 1089 předpokládá dobrou víru držitele,
která se posuzuje objektivně ve vztahu ke všem okolnostem věci.
Soud: ignorováno
I.
Žalobce se domáhal určení vlastnického práva k pozemku, který jeho právní předchůdci užívali nepřetržitě po více než třicet let.
II.
Krátká část.
III.
Nejvyšší soud dospěl k závěru, že dovolání je přípustné a důvodné, neboť odvolací soud nesprávně posoudil dobrou víru podle § 1089 a § 992.
";

    #[test]
    fn test_parse_header_fields() {
        let parsed = parse_decision(DECISION, &ChunkConfig::default());

        assert_eq!(parsed.case_id, "22 Cdo 1234/2019");
        assert_eq!(parsed.ecli.as_deref(), Some("ECLI:CZ:NS:2020:22.CDO.1234.2019.1"));
        assert_eq!(parsed.court, "Nejvyšší soud");
        assert_eq!(parsed.date, "2020-03-05");
        assert_eq!(parsed.decision_number.as_deref(), Some("45/2021"));
        assert_eq!(parsed.decision_type.as_deref(), Some("Rozsudek"));
        assert_eq!(parsed.legal_area.as_deref(), Some("Vydržení, Dobrá víra"));
        assert!(parsed.principle.starts_with("Oprávněná držba"));
        assert!(parsed.principle.ends_with("okolnostem věci."));
        assert_eq!(parsed.statute_refs, vec!["§1089", "§992"]);
    }

    #[test]
    fn test_parse_defaults() {
        let parsed = parse_decision("Bez hlavičky.", &ChunkConfig::default());
        assert!(parsed.case_id.starts_with("unknown_"));
        assert_ne!(
            parsed.case_id,
            parse_decision("Jiné rozhodnutí bez hlavičky.", &ChunkConfig::default()).case_id
        );
        assert_eq!(parsed.court, DEFAULT_COURT);
        assert_eq!(parsed.principle, "Bez hlavičky.");
        assert_eq!(parsed.date.len(), 10);
    }

    #[test]
    fn test_chunk_decision_sections() {
        let config = ChunkConfig::default();
        let parsed = parse_decision(DECISION, &config);
        let chunks = chunk_decision(DECISION, &parsed, &DecisionFacts::default(), &config);

        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "decision_22_Cdo_1234/2019_principle",
                "decision_22_Cdo_1234/2019_section_I_0",
                "decision_22_Cdo_1234/2019_section_III_1",
            ]
        );
        assert!(chunks[0].metadata.is_principle());
        assert!(chunks
            .iter()
            .all(|c| c.metadata.statute_refs() == ["§1089", "§992"]));
    }

    #[test]
    fn test_oversized_section_truncated_with_marker() {
        let config = ChunkConfig {
            decision_max_chars: 150,
            ..ChunkConfig::default()
        };
        let text = format!("I.\n{}", "a".repeat(400));
        let parsed = parse_decision(&text, &config);
        let chunks = chunk_decision(&text, &parsed, &DecisionFacts::default(), &config);

        let section = &chunks[1];
        assert!(section.text.ends_with("[Section continues...]"));
        assert_eq!(
            section.text.chars().count(),
            150 + CONTINUATION_MARKER.chars().count()
        );
    }

    #[test]
    fn test_no_headers_falls_back_to_full_section() {
        let config = ChunkConfig::default();
        let text = "Rozhodnutí bez struktury.";
        let parsed = parse_decision(text, &config);
        let chunks = chunk_decision(text, &parsed, &DecisionFacts::default(), &config);

        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[1].id,
            format!("decision_{}_section_full_0", parsed.case_id)
        );
        assert!(chunks[1].id.starts_with("decision_unknown_"));
        assert_eq!(chunks[1].text, text);
    }
}

//! Court registry XML exports.
//!
//! An export is a `<Dokumenty>` root holding one `<Dokument>` per decision.
//! Each document is rendered to the plain-text header layout that
//! [`parse_decision`] reads, so XML and text decisions share one ingest path.

use super::{extract_statute_refs, parse_decision, truncate_chars, DecisionFacts, ParsedDecision};
use crate::config::ChunkConfig;
use crate::error::{Error, Result};
use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use tracing::{debug, warn};

/// Decision type recorded for registry documents
const XML_DECISION_TYPE: &str = "ROZSUDEK";

/// One `<Dokument>` of a registry export
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct XmlDecision {
    /// `JednaciCislo`
    pub case_id: String,
    /// `Soud`
    pub court: String,
    /// `DatumVydani`, as given
    pub date: String,
    pub author: Option<String>,
    pub ecli: Option<String>,
    /// `PredmetRizeni`
    pub subject: Option<String>,
    pub keywords: Vec<String>,
    /// `ZminenaUstanoveni` entries, as given
    pub mentioned_provisions: Vec<String>,
    /// `Vyrok`
    pub operative_part: String,
    /// `Oduvodneni`
    pub reasoning: String,
}

impl XmlDecision {
    fn is_complete(&self) -> bool {
        !self.case_id.is_empty() && !self.court.is_empty() && !self.date.is_empty()
    }

    /// Supreme court decisions bind lower courts
    pub fn facts(&self) -> DecisionFacts {
        DecisionFacts {
            is_binding: self.court.to_lowercase().contains("nejvyšší"),
            ..DecisionFacts::default()
        }
    }

    /// Section references found in the mentioned provisions
    pub fn statute_refs(&self) -> Vec<String> {
        extract_statute_refs(&self.mentioned_provisions.join("\n"))
    }

    /// Render the document as decision text
    pub fn render_text(&self) -> String {
        let mut lines = vec![
            format!("Rozhodnutí sp. zn. {}", self.case_id),
            format!("Soud: {}", self.court),
            format!("Datum rozhodnutí: {}", header_date(&self.date)),
        ];
        if let Some(ref ecli) = self.ecli {
            lines.push(ecli.clone());
        }
        lines.push(format!("Typ rozhodnutí: {}", XML_DECISION_TYPE));
        if let Some(ref subject) = self.subject {
            lines.push(format!("Hesla: {}", subject));
        }
        if !self.keywords.is_empty() {
            lines.push(format!("Klíčová slova: {}", self.keywords.join(", ")));
        }
        let refs = self.statute_refs();
        if !refs.is_empty() {
            lines.push(format!("Dotčené předpisy: {}", refs.join(", ")));
        }

        format!(
            "{}\n\nVÝROK\n\n{}\n\nODŮVODNĚNÍ\n\n{}\n",
            lines.join("\n"),
            self.operative_part,
            self.reasoning
        )
    }

    /// Parse the rendered text, keeping the registry's own field values
    pub fn to_parsed(&self, text: &str, config: &ChunkConfig) -> ParsedDecision {
        let mut parsed = parse_decision(text, config);
        parsed.case_id = self.case_id.clone();
        parsed.court = self.court.clone();
        if let Some(date) = iso_date(&self.date) {
            parsed.date = date;
        }
        parsed.ecli = self.ecli.clone().or(parsed.ecli);
        parsed.decision_type = Some(XML_DECISION_TYPE.to_string());
        parsed.legal_area = self.subject.clone().or(parsed.legal_area);
        parsed.statute_refs = self.statute_refs();

        let holding = if self.operative_part.is_empty() {
            &self.reasoning
        } else {
            &self.operative_part
        };
        if !holding.is_empty() {
            parsed.principle = truncate_chars(holding, config.principle_fallback_chars)
                .0
                .to_string();
        }
        parsed
    }
}

/// Accepts `2020-03-05`, `2020-03-05T00:00:00` and `5. 3. 2020`
fn iso_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Some(date) = raw
        .get(..10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
    {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    NaiveDate::parse_from_str(&compact, "%d.%m.%Y")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn header_date(raw: &str) -> String {
    iso_date(raw)
        .and_then(|iso| NaiveDate::parse_from_str(&iso, "%Y-%m-%d").ok())
        .map(|d| d.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn xml_error(e: impl std::fmt::Display) -> Error {
    Error::Validation(format!("Malformed decision XML: {}", e))
}

/// Parse a registry export.
///
/// Documents missing a case id, court or date are skipped with a warning.
/// A document without a `<Dokumenty>` root yields nothing.
pub fn parse_xml_decisions(xml: &str) -> Result<Vec<XmlDecision>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_root = false;
    let mut current: Option<XmlDecision> = None;
    let mut text = String::new();
    let mut documents = Vec::new();
    let mut seen = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "Dokumenty" => in_root = true,
                    "Dokument" if in_root => current = Some(XmlDecision::default()),
                    _ => {}
                }
                if is_field(&name) {
                    text.clear();
                }
            }
            Ok(Event::Text(t)) => {
                if current.is_some() {
                    push_text(&mut text, &t.unescape().map_err(xml_error)?);
                }
            }
            Ok(Event::CData(c)) => {
                if current.is_some() {
                    push_text(&mut text, &String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "Dokumenty" {
                    in_root = false;
                    continue;
                }
                let Some(doc) = current.as_mut() else {
                    continue;
                };
                let value = std::mem::take(&mut text).trim().to_string();
                match name.as_str() {
                    "Dokument" => {
                        seen += 1;
                        if let Some(doc) = current.take() {
                            if doc.is_complete() {
                                documents.push(doc);
                            } else {
                                warn!(
                                    "Skipping XML document missing required fields (case id '{}', court '{}', date '{}')",
                                    doc.case_id, doc.court, doc.date
                                );
                            }
                        }
                    }
                    "JednaciCislo" => doc.case_id = value,
                    "Soud" => doc.court = value,
                    "DatumVydani" => doc.date = value,
                    "Autor" => doc.author = non_empty(value),
                    "ECLI" => doc.ecli = non_empty(value),
                    "PredmetRizeni" => doc.subject = non_empty(value),
                    "Vyrok" => doc.operative_part = value,
                    "Oduvodneni" => doc.reasoning = value,
                    "KlicoveSlovo" | "KlicovaSlova" => {
                        if !value.is_empty() {
                            doc.keywords.push(value);
                        }
                    }
                    "ZmineneUstanoveni" | "ZmineneUstanovení" | "ZminenaUstanoveni" => {
                        if !value.is_empty() {
                            doc.mentioned_provisions.push(value);
                        }
                    }
                    _ => text = value,
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
    }

    debug!(
        "Parsed {} of {} XML documents",
        documents.len(),
        seen
    );
    Ok(documents)
}

fn is_field(name: &str) -> bool {
    matches!(
        name,
        "JednaciCislo"
            | "Soud"
            | "DatumVydani"
            | "Autor"
            | "ECLI"
            | "PredmetRizeni"
            | "Vyrok"
            | "Oduvodneni"
            | "KlicoveSlovo"
            | "KlicovaSlova"
            | "ZmineneUstanoveni"
            | "ZmineneUstanovení"
            | "ZminenaUstanoveni"
    )
}

fn push_text(buf: &mut String, fragment: &str) {
    if !buf.is_empty() && !buf.ends_with(char::is_whitespace) {
        buf.push(' ');
    }
    buf.push_str(fragment);
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Dokumenty>
  <Dokument>
    <JednaciCislo>22 Cdo 1234/2019</JednaciCislo>
    <Soud>Nejvyšší soud</Soud>
    <ECLI>ECLI:CZ:NS:2020:22.CDO.1234.2019.1</ECLI>
    <PredmetRizeni>Vydržení vlastnického práva</PredmetRizeni>
    <DatumVydani>2020-03-05</DatumVydani>
    <KlicovaSlova>
      <KlicoveSlovo>Vydržení</KlicoveSlovo>
      <KlicoveSlovo>Dobrá víra</KlicoveSlovo>
    </KlicovaSlova>
    <ZminenaUstanoveni>
      <ZmineneUstanovení>§ 1089 o. z.</ZmineneUstanovení>
      <ZmineneUstanovení>§ 1090 o. z.</ZmineneUstanovení>
    </ZminenaUstanoveni>
    <Vyrok>Dovolání se zamítá.</Vyrok>
    <Oduvodneni><![CDATA[Oprávněná držba předpokládá dobrou víru držitele & poctivost.]]></Oduvodneni>
  </Dokument>
  <Dokument>
    <JednaciCislo>25 Co 7/2021</JednaciCislo>
    <Soud>Krajský soud v Brně</Soud>
    <DatumVydani>7. 6. 2021</DatumVydani>
    <ZminenaUstanoveni>§ 1040 o. z.</ZminenaUstanoveni>
    <Vyrok>Rozsudek se potvrzuje.</Vyrok>
  </Dokument>
  <Dokument>
    <Soud>Nejvyšší soud</Soud>
    <DatumVydani>2020-01-01</DatumVydani>
  </Dokument>
</Dokumenty>
"#;

    #[test]
    fn test_parse_export() {
        let docs = parse_xml_decisions(EXPORT).unwrap();
        assert_eq!(docs.len(), 2);

        let first = &docs[0];
        assert_eq!(first.case_id, "22 Cdo 1234/2019");
        assert_eq!(first.court, "Nejvyšší soud");
        assert_eq!(first.keywords, vec!["Vydržení", "Dobrá víra"]);
        assert_eq!(first.statute_refs(), vec!["§1089", "§1090"]);
        assert!(first.reasoning.contains("& poctivost"));
        assert!(first.facts().is_binding);

        let second = &docs[1];
        assert_eq!(second.mentioned_provisions, vec!["§ 1040 o. z."]);
        assert!(second.keywords.is_empty());
        assert!(!second.facts().is_binding);
    }

    #[test]
    fn test_rendered_text_keeps_registry_fields() {
        let config = ChunkConfig::default();
        let docs = parse_xml_decisions(EXPORT).unwrap();

        let text = docs[1].render_text();
        assert!(text.contains("Datum rozhodnutí: 07.06.2021"));
        let parsed = docs[1].to_parsed(&text, &config);
        assert_eq!(parsed.case_id, "25 Co 7/2021");
        assert_eq!(parsed.court, "Krajský soud v Brně");
        assert_eq!(parsed.date, "2021-06-07");
        assert_eq!(parsed.statute_refs, vec!["§1040"]);
        assert_eq!(parsed.principle, "Rozsudek se potvrzuje.");
        assert_eq!(parsed.decision_type.as_deref(), Some("ROZSUDEK"));

        let parsed = docs[0].to_parsed(&docs[0].render_text(), &config);
        assert_eq!(parsed.date, "2020-03-05");
        assert_eq!(parsed.ecli.as_deref(), Some("ECLI:CZ:NS:2020:22.CDO.1234.2019.1"));
        assert_eq!(parsed.legal_area.as_deref(), Some("Vydržení vlastnického práva"));
    }

    #[test]
    fn test_missing_root_and_malformed_input() {
        assert!(parse_xml_decisions("<Jine><Dokument/></Jine>").unwrap().is_empty());
        assert!(matches!(
            parse_xml_decisions("<Dokumenty><Dokument><Soud>x</Dokument>"),
            Err(Error::Validation(_))
        ));
    }
}

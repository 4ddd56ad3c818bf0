//! Structural marker detection for legal texts

use regex::Regex;
use std::sync::OnceLock;

fn section_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*§\s*(\d+[a-z]?)").expect("static regex"))
}

fn section_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"§\s*(\d+)").expect("static regex"))
}

fn roman_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*([IVX]{1,4})\.[ \t]*\r?$").expect("static regex"))
}

/// A structural marker found in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    /// Marker label, e.g. `1089` for `§ 1089` or `III` for a roman header
    pub label: String,
    /// Byte offset where the marker starts
    pub start: usize,
    /// Byte offset where the marked content starts
    pub body_start: usize,
}

/// Find `§ N` section headers that open a line.
///
/// Inline `§` mentions are cross-references, not headers.
pub fn find_section_headers(text: &str) -> Vec<Marker> {
    section_header_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let label = caps.get(1)?;
            Some(Marker {
                label: label.as_str().to_string(),
                start: whole.start(),
                body_start: whole.end(),
            })
        })
        .collect()
}

/// Find roman-numeral section headers (`I.`, `II.`, ... alone on a line)
pub fn find_roman_headers(text: &str) -> Vec<Marker> {
    roman_header_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let label = caps.get(1)?;
            Some(Marker {
                label: label.as_str().to_string(),
                start: whole.start(),
                body_start: whole.end(),
            })
        })
        .collect()
}

/// Slice the text between consecutive markers, trimmed.
pub fn split_at_markers<'a>(text: &'a str, markers: &'a [Marker]) -> Vec<(&'a str, &'a str)> {
    markers
        .iter()
        .enumerate()
        .map(|(i, marker)| {
            let end = markers.get(i + 1).map(|m| m.start).unwrap_or(text.len());
            (marker.label.as_str(), text[marker.body_start..end].trim())
        })
        .collect()
}

/// Extract `§N` references, deduplicated, in first-seen order.
pub fn extract_statute_refs(text: &str) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    for caps in section_ref_re().captures_iter(text) {
        let reference = format!("§{}", &caps[1]);
        if !refs.contains(&reference) {
            refs.push(reference);
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_headers_ignore_inline_refs() {
        let text = "§ 1089\nVlastník pozemku podle § 1090 odst. 2 ...\n§1090\nDalší text";
        let headers = find_section_headers(text);

        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].label, "1089");
        assert_eq!(headers[1].label, "1090");
    }

    #[test]
    fn test_roman_headers() {
        let text = "Úvod\nI.\nPrvní část\n  II.  \nDruhá část\nIIa.\nVI. není sám na řádku";
        let headers = find_roman_headers(text);
        let labels: Vec<_> = headers.iter().map(|m| m.label.as_str()).collect();

        assert_eq!(labels, vec!["I", "II"]);
    }

    #[test]
    fn test_split_at_markers() {
        let text = "I.\nalpha\nII.\nbeta gamma";
        let headers = find_roman_headers(text);
        let parts = split_at_markers(text, &headers);

        assert_eq!(parts, vec![("I", "alpha"), ("II", "beta gamma")]);
    }

    #[test]
    fn test_extract_refs_deduplicated_in_order() {
        let refs = extract_statute_refs("podle § 1040 a §1089, viz též § 1040 odst. 1 a §  2");
        assert_eq!(refs, vec!["§1040", "§1089", "§2"]);
    }
}

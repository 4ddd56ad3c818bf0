//! Keyword extraction for cluster labels

use super::DoctrineCluster;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

/// Czech (with and without diacritics) and English function words
const STOPWORDS: &[&str] = &[
    "a", "aby", "ak", "ako", "ale", "alebo", "and", "ani", "ano", "asi", "az", "bez", "bude",
    "budem", "budes", "by", "byl", "byla", "byli", "bylo", "být", "ci", "clanek", "clanku",
    "clanky", "co", "coz", "cz", "dalsi", "dnes", "do", "ho", "i", "ja", "jak", "jako", "je",
    "jeho", "jej", "jeji", "jejich", "jen", "jeste", "ji", "jine", "jiz", "jsem", "jsi", "jsme",
    "jsou", "jste", "k", "kam", "kde", "kdo", "kdy", "kdyz", "ke", "ktera", "ktere", "kteri",
    "kterou", "ktery", "kterym", "kterymi", "ku", "ma", "mate", "me", "mezi", "mi", "mnou", "muj",
    "muze", "my", "na", "nad", "nam", "nas", "nasi", "ne", "nebo", "neni", "nez", "nic", "nove",
    "novy", "o", "od", "ode", "on", "ona", "oni", "ono", "ony", "po", "pod", "podle", "pokud",
    "pouze", "prave", "pred", "pres", "pri", "pro", "proc", "proto", "protoze", "prvni", "re",
    "s", "se", "si", "sice", "skoro", "smie", "snad", "so", "sve", "svych", "svym", "svymi", "ta",
    "tak", "take", "takze", "tato", "te", "tedy", "tema", "ten", "tento", "teto", "tim", "timto",
    "tipy", "to", "tohle", "toho", "tohoto", "tom", "tomto", "tomuto", "tu", "tuto", "tvuj", "ty",
    "tyto", "u", "up", "uz", "v", "ve", "vedle", "vice", "vsak", "vsetko", "vy", "vam", "vas",
    "vase", "vi", "z", "za", "zatimco", "ze", "zpet", "zpravy", "má", "může", "že", "když",
    "než", "však", "již", "ještě", "též", "také", "není", "nelze", "musí", "měl", "měla", "the",
    "that", "with", "from", "this", "which", "were", "have", "been",
];

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

/// Top `top_n` content words across `texts` by frequency.
///
/// Words are lower-cased; words of three characters or fewer, digit-only
/// words and stop words are skipped. Ties are broken alphabetically.
pub fn extract_keywords<S: AsRef<str>>(texts: &[S], top_n: usize) -> Vec<String> {
    let stop = stopwords();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for text in texts {
        let lower = text.as_ref().to_lowercase();
        for word in lower.unicode_words() {
            if word.chars().count() <= 3
                || word.chars().all(|c| c.is_ascii_digit())
                || stop.contains(word)
            {
                continue;
            }
            *counts.entry(word.to_string()).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(top_n).map(|(w, _)| w).collect()
}

/// Fill each cluster's keywords from its members' text
pub fn enrich_with_keywords(clusters: &mut [DoctrineCluster], top_n: usize) {
    for cluster in clusters.iter_mut() {
        let texts: Vec<&str> = cluster.members.iter().map(|m| m.payload.text()).collect();
        cluster.keywords = extract_keywords(&texts, top_n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_keywords_filters_and_ranks() {
        let texts = [
            "Vydržení vlastnického práva k pozemku podle § 1089 nastává po uplynutí doby.",
            "Oprávněná držba pozemku je předpokladem vydržení, není však jediným.",
            "Vydržení pozemku 2020",
        ];

        let keywords = extract_keywords(&texts, 3);
        assert_eq!(keywords, vec!["pozemku", "vydržení", "doby"]);
    }

    #[test]
    fn test_extract_keywords_drops_short_digits_and_stopwords() {
        let keywords = extract_keywords(&["není není 1089 1089 akt the which smlouva"], 10);
        assert_eq!(keywords, vec!["smlouva"]);
    }

    #[test]
    fn test_extract_keywords_respects_top_n() {
        let text = "alfa beta gama delta epsilon zeta kappa lambda omikron sigma tau omega";
        assert_eq!(extract_keywords(&[text], 10).len(), 10);
    }
}

//! Legal tensions
//!
//! A tension is a named conflict between competing legal values. The
//! catalogue below drives both detection in question text and the vector
//! recipes used to steer retrieval.

mod vectorizer;

pub use vectorizer::*;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Catalogue entry for one tension
#[derive(Debug, Clone, Copy)]
pub struct TensionDefinition {
    pub key: &'static str,
    pub name: &'static str,
    pub competing_values: &'static [&'static str],
    pub indicators: &'static [&'static str],
    pub add: &'static [&'static str],
    pub subtract: &'static [&'static str],
}

pub const TENSIONS: &[TensionDefinition] = &[
    TensionDefinition {
        key: "formal_vs_factual",
        name: "Forma vs. faktický stav",
        competing_values: &["formální náležitosti", "faktická realita"],
        indicators: &["není zapsáno", "fakticky vykonává", "dlouhodobě užívá", "bez formálního"],
        add: &["faktický stav", "dlouhodobé užívání", "dobrá víra", "legitimní očekávání"],
        subtract: &["formální náležitosti", "zápis v katastru", "písemná forma"],
    },
    TensionDefinition {
        key: "protection_vs_autonomy",
        name: "Ochrana slabšího vs. smluvní svoboda",
        competing_values: &["ochrana slabší strany", "autonomie vůle"],
        indicators: &["spotřebitel", "nerovné postavení", "adhezní smlouva", "zneužití postavení"],
        add: &["ochrana spotřebitele", "nerovnováha sil", "zneužití", "slabší strana"],
        subtract: &["smluvní volnost", "autonomie", "B2B", "profesionál"],
    },
    TensionDefinition {
        key: "time_creates_rights",
        name: "Čas vytváří práva",
        competing_values: &["časový faktor", "okamžité právo"],
        indicators: &["let", "dlouhodobě", "po dobu", "vydržení", "promlčení"],
        add: &["vydržení", "promlčení", "legitimní očekávání", "dobromyslná držba"],
        subtract: &["okamžitost", "novost", "přerušení"],
    },
    TensionDefinition {
        key: "substance_over_form",
        name: "Substance nad formou",
        competing_values: &["materiální pravda", "formální správnost"],
        indicators: &["ve skutečnosti", "reálně", "fakticky", "zastřený"],
        add: &["skutečný účel", "materiální pravda", "obcházení zákona", "simulace"],
        subtract: &["formální náležitosti", "procedura", "forma"],
    },
    TensionDefinition {
        key: "good_faith_vs_strict_law",
        name: "Dobrá víra vs. přísné právo",
        competing_values: &["dobrá víra", "striktní aplikace"],
        indicators: &["nevěděl", "nemohl vědět", "důvodně spoléhal", "v dobré víře"],
        add: &["dobrá víra", "důvodné očekávání", "ochrana dobromyslného", "legitimní důvěra"],
        subtract: &["přísné právo", "objektivní odpovědnost", "ignorantia iuris"],
    },
    TensionDefinition {
        key: "economic_efficiency_vs_fairness",
        name: "Ekonomická efektivita vs. spravedlnost",
        competing_values: &["ekonomická racionalita", "materiální spravedlnost"],
        indicators: &["neúměrné", "nepřiměřené", "lichva", "zneužití tísně"],
        add: &["spravedlnost", "přiměřenost", "ekvita", "dobré mravy"],
        subtract: &["tržní mechanismus", "ekonomická svoboda", "podnikatelské riziko"],
    },
    TensionDefinition {
        key: "prevention_vs_reparation",
        name: "Prevence vs. reparace",
        competing_values: &["předcházení škodám", "náhrada škody"],
        indicators: &["hrozí škoda", "předejít", "zabránit", "již vznikla škoda"],
        add: &["prevence", "předběžné opatření", "zdržení se", "zákaz"],
        subtract: &["náhrada škody", "kompenzace", "reparace", "odčinění"],
    },
    TensionDefinition {
        key: "individual_vs_collective",
        name: "Individuální vs. kolektivní zájem",
        competing_values: &["soukromý zájem", "veřejný zájem"],
        indicators: &["veřejný zájem", "společné", "komunita", "soukromé právo"],
        add: &["veřejný zájem", "společné dobro", "veřejný pořádek"],
        subtract: &["soukromé vlastnictví", "individuální svoboda", "autonomie"],
    },
    TensionDefinition {
        key: "certainty_vs_flexibility",
        name: "Právní jistota vs. flexibilita",
        competing_values: &["předvídatelnost", "adaptabilita"],
        indicators: &["změna okolností", "clausula rebus", "nepředvídatelné", "mimořádná událost"],
        add: &["flexibilita", "změna poměrů", "přizpůsobení", "spravedlnost případu"],
        subtract: &["právní jistota", "pacta sunt servanda", "předvídatelnost"],
    },
    TensionDefinition {
        key: "restitution_vs_stability",
        name: "Restituce vs. stabilita vztahů",
        competing_values: &["navrácení původního stavu", "ochrana nabytých práv"],
        indicators: &["vrácení", "restituce", "neplatnost", "nabyl v dobré víře"],
        add: &["navrácení", "restituce", "neplatnost od počátku", "bezdůvodné obohacení"],
        subtract: &["ochrana třetích osob", "stabilita", "dobromyslné nabytí"],
    },
];

/// Look up a catalogue entry by key
pub fn definition(key: &str) -> Option<&'static TensionDefinition> {
    TENSIONS.iter().find(|t| t.key == key)
}

/// Doctrines known to resolve a set of tensions
#[derive(Debug, Clone, Copy)]
pub struct DoctrineTension {
    pub doctrine: &'static str,
    pub resolves: &'static [&'static str],
    pub creates: &'static [&'static str],
    pub primary_weight: f32,
}

pub const DOCTRINE_TENSIONS: &[DoctrineTension] = &[
    DoctrineTension {
        doctrine: "vydržení",
        resolves: &["formal_vs_factual", "time_creates_rights"],
        creates: &["restitution_vs_stability"],
        primary_weight: 0.9,
    },
    DoctrineTension {
        doctrine: "dobrá_víra",
        resolves: &["good_faith_vs_strict_law", "formal_vs_factual"],
        creates: &["certainty_vs_flexibility"],
        primary_weight: 0.8,
    },
    DoctrineTension {
        doctrine: "bezdůvodné_obohacení",
        resolves: &["economic_efficiency_vs_fairness", "substance_over_form"],
        creates: &["restitution_vs_stability"],
        primary_weight: 0.85,
    },
    DoctrineTension {
        doctrine: "ochrana_spotřebitele",
        resolves: &["protection_vs_autonomy", "economic_efficiency_vs_fairness"],
        creates: &["certainty_vs_flexibility"],
        primary_weight: 0.75,
    },
    DoctrineTension {
        doctrine: "neplatnost",
        resolves: &["substance_over_form", "good_faith_vs_strict_law"],
        creates: &["restitution_vs_stability"],
        primary_weight: 0.7,
    },
    DoctrineTension {
        doctrine: "náhrada_škody",
        resolves: &["prevention_vs_reparation"],
        creates: &["economic_efficiency_vs_fairness"],
        primary_weight: 0.8,
    },
    DoctrineTension {
        doctrine: "předběžné_opatření",
        resolves: &["prevention_vs_reparation", "time_creates_rights"],
        creates: &["certainty_vs_flexibility"],
        primary_weight: 0.6,
    },
];

/// Doctrines resolving any of the given tensions, with their primary weight,
/// in catalogue order
pub fn doctrines_for(tension_types: &[String]) -> Vec<(String, f32)> {
    DOCTRINE_TENSIONS
        .iter()
        .filter(|d| {
            d.resolves
                .iter()
                .any(|r| tension_types.iter().any(|t| t == r))
        })
        .map(|d| (d.doctrine.to_string(), d.primary_weight))
        .collect()
}

/// Power asymmetry between the parties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerDynamic {
    Equal,
    SlightAsymmetry,
    SignificantAsymmetry,
    ExtremeAsymmetry,
}

impl PowerDynamic {
    pub fn protection_weight(self) -> f32 {
        match self {
            PowerDynamic::Equal => 0.0,
            PowerDynamic::SlightAsymmetry => 0.3,
            PowerDynamic::SignificantAsymmetry => 0.7,
            PowerDynamic::ExtremeAsymmetry => 0.95,
        }
    }

    fn indicators(self) -> &'static [&'static str] {
        match self {
            PowerDynamic::Equal => &["podnikatel", "b2b", "profesionálové"],
            PowerDynamic::SlightAsymmetry => &["malý podnikatel", "osvč", "franšíza"],
            PowerDynamic::SignificantAsymmetry => &["spotřebitel", "zaměstnanec", "nájemce bytu"],
            PowerDynamic::ExtremeAsymmetry => &["nezletilý", "osoba s postižením", "senior v tísni"],
        }
    }

    /// Strongest asymmetry whose indicator appears in the text
    pub fn detect(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        [
            PowerDynamic::ExtremeAsymmetry,
            PowerDynamic::SignificantAsymmetry,
            PowerDynamic::SlightAsymmetry,
            PowerDynamic::Equal,
        ]
        .into_iter()
        .find(|p| p.indicators().iter().any(|i| lower.contains(i)))
    }
}

fn years_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,3})\s*(?:let|roků|roky|rok|years?)\b").expect("static regex")
    })
}

/// Longest duration in years mentioned in the text
pub fn detect_years(text: &str) -> Option<f32> {
    years_regex()
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<f32>().ok())
        .fold(None, |max, y| Some(max.map_or(y, |m: f32| m.max(y))))
}

/// Tension keys whose indicators appear in the text, in catalogue order
pub fn identify_tensions(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TENSIONS
        .iter()
        .filter(|t| t.indicators.iter().any(|i| lower.contains(&i.to_lowercase())))
        .map(|t| t.key.to_string())
        .collect()
}

/// Deterministic strength from temporal and power-asymmetry signals
pub fn tension_strength(tension_type: &str, years: Option<f32>, power: Option<PowerDynamic>) -> f32 {
    let mut strength = 0.5;

    if let Some(years) = years {
        if tension_type == "time_creates_rights" || tension_type == "formal_vs_factual" {
            strength = if years >= 30.0 {
                0.95
            } else if years >= 10.0 {
                0.85
            } else if years >= 3.0 {
                0.7
            } else {
                0.4
            };
        }
    }

    if let Some(power) = power {
        if tension_type == "protection_vs_autonomy" {
            strength = f32::max(strength, power.protection_weight());
        }
    }

    strength
}

/// A tension detected in a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tension {
    pub tension_type: String,
    pub competing_values: Vec<String>,
    pub strength: f32,
}

impl Tension {
    /// Build from a catalogue key. The strength is the larger of the
    /// suggested value and the deterministic signal-based strength.
    pub fn from_catalogue(
        key: &str,
        suggested: Option<f32>,
        years: Option<f32>,
        power: Option<PowerDynamic>,
    ) -> Option<Self> {
        let def = definition(key)?;
        let computed = tension_strength(key, years, power);
        let strength = suggested.map_or(computed, |s| s.max(computed)).clamp(0.0, 1.0);
        Some(Self {
            tension_type: key.to_string(),
            competing_values: def.competing_values.iter().map(|v| v.to_string()).collect(),
            strength,
        })
    }
}

/// Detect tensions in a question using indicator, duration and party signals
pub fn analyze_question(text: &str) -> Vec<Tension> {
    let years = detect_years(text);
    let power = PowerDynamic::detect(text);
    identify_tensions(text)
        .iter()
        .filter_map(|key| Tension::from_catalogue(key, None, years, power))
        .collect()
}

/// Recipe for one tension's contribution to a search vector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorStrategy {
    pub tension_type: String,
    pub base_terms: Vec<String>,
    pub add_modifiers: Vec<String>,
    pub subtract_modifiers: Vec<String>,
    pub weight: f32,
}

/// One strategy per known tension, strongest first
pub fn generate_strategies(tensions: &[Tension]) -> Vec<VectorStrategy> {
    let mut sorted: Vec<&Tension> = tensions.iter().collect();
    sorted.sort_by(|a, b| b.strength.total_cmp(&a.strength));

    sorted
        .into_iter()
        .filter_map(|tension| {
            let def = definition(&tension.tension_type)?;
            Some(VectorStrategy {
                tension_type: tension.tension_type.clone(),
                base_terms: tension.competing_values.clone(),
                add_modifiers: def.add.iter().map(|s| s.to_string()).collect(),
                subtract_modifiers: def.subtract.iter().map(|s| s.to_string()).collect(),
                weight: tension.strength,
            })
        })
        .collect()
}

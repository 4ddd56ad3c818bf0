//! Query command: tension-aware retrieval for a legal question

use crate::config::Config;
use crate::embed::Embedder;
use crate::error::Result;
use crate::search::SearchMode;
use crate::store::VectorIndex;
use crate::synthesis::{SynthesisInput, SynthesisRequest, Synthesizer};
use tracing::info;

/// Maximum characters of result text shown in console output
const PREVIEW_CHARS: usize = 240;

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub top_k: Option<usize>,
    /// Overrides `search.use_tensions`
    pub mode: Option<SearchMode>,
}

pub async fn cmd_query(
    config: &Config,
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    question: &str,
    options: QueryOptions,
) -> Result<SynthesisInput> {
    info!("Querying: {}", question);

    let request = SynthesisRequest {
        question: question.to_string(),
        top_k: options.top_k,
        mode: options.mode,
    };
    Synthesizer::new(index, embedder, config).prepare(&request).await
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}…", &flat[..cut]),
        None => flat,
    }
}

pub fn print_query_results(input: &SynthesisInput) {
    println!("\n🔎 {}\n", input.question);
    println!(
        "Mode: {:?} · {} results · dominant source: {}",
        input.mode, input.total_results, input.provenance.dominant_source
    );

    if !input.tensions.is_empty() {
        println!("\nTensions:");
        for t in &input.tensions {
            println!(
                "  • {} ({:.2}): {}",
                t.tension_type,
                t.strength,
                t.competing_values.join(" vs. ")
            );
        }
    }

    println!("\nStatutes:");
    if input.statutes.is_empty() {
        println!("  (none)");
    }
    for (i, s) in input.statutes.iter().enumerate() {
        println!(
            "  {}. §{} [score {:.3}]",
            i + 1,
            s.section.as_deref().unwrap_or("?"),
            s.score
        );
        println!("     {}", preview(&s.text));
    }

    if !input.clusters.is_empty() {
        println!("\nCase-law clusters:");
        for c in &input.clusters {
            println!(
                "  • {} ({} decisions, sections: {})",
                c.id,
                c.size,
                c.common_sections.join(", ")
            );
            if !c.keywords.is_empty() {
                println!("    keywords: {}", c.keywords.join(", "));
            }
        }
    }

    println!("\nDecisions:");
    if input.representative_cases.is_empty() {
        println!("  (none)");
    }
    for (i, c) in input.representative_cases.iter().enumerate() {
        println!(
            "  {}. {} – {} {} [score {:.3}, weight {:.2}]",
            i + 1,
            c.case_id.as_deref().unwrap_or(&c.id),
            c.court.as_deref().unwrap_or("?"),
            c.date.as_deref().unwrap_or(""),
            c.score,
            c.weight
        );
        println!("     {}", preview(&c.text));
    }

    for r in &input.resolutions {
        println!(
            "\n{} → {}",
            r.tension_type,
            if r.resolving_doctrines.is_empty() {
                "no known resolving doctrine".to_string()
            } else {
                r.resolving_doctrines.join(", ")
            }
        );
        for case in &r.supporting_cases {
            println!("  - {}", case.case_id.as_deref().unwrap_or(&case.id));
        }
    }
}

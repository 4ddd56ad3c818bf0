//! Ingest commands: chunk statutes and decisions and enqueue the chunks.
//!
//! Embedding happens later, when the queue is processed.

use crate::chunk::{
    chunk_decision, chunk_statute, compute_content_hash, parse_decision, parse_xml_decisions,
    DecisionFacts, ParsedDecision, StatuteSource,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::{now_timestamp, DecisionRecord, MetaDb};
use crate::models::ChunkMetadata;
use crate::progress::{advance_progress, finish_progress, start_progress_bar};
use crate::queue::IngestQueue;
use crate::weight::decision_weight;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// What a file on disk contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Statute,
    Decision,
}

/// Ingestion statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub chunks_queued: usize,
    /// Decisions whose text and facts were unchanged since the last ingest
    pub decisions_unchanged: usize,
    pub citations_recorded: usize,
    pub errors: Vec<String>,
}

impl IngestStats {
    fn absorb(&mut self, other: IngestStats) {
        self.files_processed += other.files_processed;
        self.files_skipped += other.files_skipped;
        self.chunks_queued += other.chunks_queued;
        self.decisions_unchanged += other.decisions_unchanged;
        self.citations_recorded += other.citations_recorded;
        self.errors.extend(other.errors);
    }
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::InvalidPath(format!("{}: {}", path.display(), e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Chunk a statute text and enqueue its sections
pub async fn ingest_statute_text(
    config: &Config,
    queue: &IngestQueue,
    text: &str,
    source: &StatuteSource,
    priority: i64,
) -> Result<IngestStats> {
    let chunks = chunk_statute(text, source, &config.chunk);
    let queued = queue.add_chunks(&chunks, priority).await?;
    info!("Queued {} statute chunks from {}", queued, source.source);

    Ok(IngestStats {
        files_processed: 1,
        chunks_queued: queued,
        ..IngestStats::default()
    })
}

/// Parse a decision, record it and its citations, and enqueue its chunks.
///
/// A decision whose text and facts hash to the stored content hash is
/// skipped.
pub async fn ingest_decision_text(
    config: &Config,
    db: &MetaDb,
    queue: &IngestQueue,
    text: &str,
    facts: &DecisionFacts,
    priority: i64,
) -> Result<IngestStats> {
    let parsed = parse_decision(text, &config.chunk);
    ingest_parsed_decision(config, db, queue, text, &parsed, facts, priority).await
}

/// Record and enqueue a decision whose header fields are already known
pub async fn ingest_parsed_decision(
    config: &Config,
    db: &MetaDb,
    queue: &IngestQueue,
    text: &str,
    parsed: &ParsedDecision,
    facts: &DecisionFacts,
    priority: i64,
) -> Result<IngestStats> {
    let content_hash =
        compute_content_hash(&format!("{}\n{}", text, serde_json::to_string(facts)?));

    let existing = db.get_decision(&parsed.case_id).await?;
    if let Some(ref stored) = existing {
        if stored.content_hash == content_hash {
            debug!("Decision {} unchanged", parsed.case_id);
            return Ok(IngestStats {
                files_processed: 1,
                decisions_unchanged: 1,
                ..IngestStats::default()
            });
        }
    }

    let citations_recorded = db.insert_citations(&parsed.case_id, &facts.cites).await?;
    let cited_by = u32::try_from(db.count_citations_to(&parsed.case_id).await?).unwrap_or(u32::MAX);
    let facts = DecisionFacts {
        citation_count: facts.citation_count.max(cited_by),
        ..facts.clone()
    };

    let chunks = chunk_decision(text, parsed, &facts, &config.chunk);
    let weight = match chunks.first().map(|c| &c.metadata) {
        Some(ChunkMetadata::Judicial(meta)) => {
            decision_weight(meta, chrono::Utc::now().date_naive())
        }
        _ => 0.0,
    };

    let now = now_timestamp();
    db.upsert_decision(&DecisionRecord {
        case_id: parsed.case_id.clone(),
        court: parsed.court.clone(),
        date: parsed.date.clone(),
        ecli: parsed.ecli.clone(),
        decision_number: parsed.decision_number.clone(),
        decision_type: parsed.decision_type.clone(),
        legal_area: parsed.legal_area.clone(),
        principle: parsed.principle.clone(),
        content_hash,
        is_binding: facts.is_binding,
        en_banc: facts.en_banc,
        citation_count: i64::from(facts.citation_count),
        overruled: facts.overruled,
        weight,
        created_at: existing.map(|d| d.created_at).unwrap_or_else(|| now.clone()),
        updated_at: now,
    })
    .await?;

    let queued = queue.add_chunks(&chunks, priority).await?;
    info!("Queued {} chunks for decision {}", queued, parsed.case_id);

    Ok(IngestStats {
        files_processed: 1,
        chunks_queued: queued,
        citations_recorded,
        ..IngestStats::default()
    })
}

pub async fn cmd_ingest_statute(
    config: &Config,
    queue: &IngestQueue,
    path: &Path,
    source: &StatuteSource,
    priority: i64,
) -> Result<IngestStats> {
    let text = read_text(path)?;
    ingest_statute_text(config, queue, &text, source, priority).await
}

pub async fn cmd_ingest_decision(
    config: &Config,
    db: &MetaDb,
    queue: &IngestQueue,
    path: &Path,
    facts: &DecisionFacts,
    priority: i64,
) -> Result<IngestStats> {
    let text = read_text(path)?;
    ingest_decision_text(config, db, queue, &text, facts, priority).await
}

/// Ingest every decision of a registry XML export.
///
/// Failures are recorded per document and do not stop the run.
pub async fn cmd_ingest_xml(
    config: &Config,
    db: &MetaDb,
    queue: &IngestQueue,
    path: &Path,
    priority: i64,
    quiet: bool,
) -> Result<IngestStats> {
    let documents = parse_xml_decisions(&read_text(path)?)?;
    info!("Found {} decisions in {}", documents.len(), path.display());

    let mut stats = IngestStats::default();
    let progress = start_progress_bar(documents.len(), "Ingesting decisions", quiet);

    for document in documents {
        let text = document.render_text();
        let parsed = document.to_parsed(&text, &config.chunk);
        let outcome =
            ingest_parsed_decision(config, db, queue, &text, &parsed, &document.facts(), priority)
                .await;

        match outcome {
            Ok(doc_stats) => stats.absorb(doc_stats),
            Err(e) => {
                let message = format!("{}: {}", document.case_id, e);
                warn!("{}", message);
                stats.errors.push(message);
                stats.files_skipped += 1;
            }
        }
        advance_progress(&progress, 1);
    }

    finish_progress(progress, "Decisions ingested");
    Ok(stats)
}

/// Files under `dir` with one of `extensions`, sorted by path
pub fn collect_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::InvalidPath(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                warn!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Ingest every matching file in a directory.
///
/// Decisions get default facts. Failures are recorded per file and do not
/// stop the run.
#[allow(clippy::too_many_arguments)]
pub async fn cmd_ingest_dir(
    config: &Config,
    db: &MetaDb,
    queue: &IngestQueue,
    dir: &Path,
    kind: DocumentKind,
    extensions: &[String],
    statute_source: &StatuteSource,
    priority: i64,
    quiet: bool,
) -> Result<IngestStats> {
    let files = collect_files(dir, extensions)?;
    info!("Found {} {:?} files in {}", files.len(), kind, dir.display());

    let mut stats = IngestStats::default();
    let progress = start_progress_bar(files.len(), "Ingesting files", quiet);
    let facts = DecisionFacts::default();

    for path in files {
        let outcome = match kind {
            DocumentKind::Statute => {
                cmd_ingest_statute(config, queue, &path, statute_source, priority).await
            }
            DocumentKind::Decision => {
                cmd_ingest_decision(config, db, queue, &path, &facts, priority).await
            }
        };

        match outcome {
            Ok(file_stats) => stats.absorb(file_stats),
            Err(e) => {
                let message = format!("{}: {}", path.display(), e);
                warn!("{}", message);
                stats.errors.push(message);
                stats.files_skipped += 1;
            }
        }
        advance_progress(&progress, 1);
    }

    finish_progress(progress, "Files ingested");
    Ok(stats)
}

pub fn print_ingest_stats(stats: &IngestStats) {
    println!("\n✓ Ingestion complete");
    println!("  Files processed: {}", stats.files_processed);
    if stats.files_skipped > 0 {
        println!("  Files skipped: {}", stats.files_skipped);
    }
    println!("  Chunks queued: {}", stats.chunks_queued);
    if stats.decisions_unchanged > 0 {
        println!("  Unchanged decisions: {}", stats.decisions_unchanged);
    }
    if stats.citations_recorded > 0 {
        println!("  Citations recorded: {}", stats.citations_recorded);
    }
    for error in &stats.errors {
        println!("  ✗ {}", error);
    }
    if stats.chunks_queued > 0 {
        println!("\nRun 'precedent process' to embed the queued chunks.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::tests::setup_test_db;
    use tempfile::TempDir;

    const DECISION: &str = "\
Rozhodnutí Nejvyššího soudu sp. zn. 22 Cdo 1234/2019
Soud: Nejvyšší soud
Datum rozhodnutí: 05.03.2020
Právní věta:
Oprávněná držba podle § 1089 předpokládá dobrou víru držitele.

I.
Žalobce se domáhal určení vlastnického práva k pozemku, který jeho právní předchůdci užívali po více než deset let v dobré víře.
";

    const STATUTE: &str = "\
§ 1089
Vydržením nabude vlastnické právo držitel, který je oprávněným držitelem po dobu stanovenou zákonem.

§ 1090
Oprávněný držitel nabude vlastnické právo vydržením, trvala-li oprávněná držba nepřetržitě po stanovenou dobu.
";

    fn source() -> StatuteSource {
        StatuteSource {
            version_date: "2024-01-01".to_string(),
            source: "Občanský zákoník".to_string(),
            book: None,
            chapter: None,
        }
    }

    #[tokio::test]
    async fn test_decision_ingest_records_and_queues() {
        let (db, _temp) = setup_test_db().await;
        let config = Config::default();
        let queue = IngestQueue::new(&db, &config.queue);

        let facts = DecisionFacts {
            cites: vec!["21 Cdo 99/2015".to_string()],
            ..DecisionFacts::default()
        };
        let stats = ingest_decision_text(&config, &db, &queue, DECISION, &facts, 0)
            .await
            .unwrap();

        assert_eq!(stats.chunks_queued, 2);
        assert_eq!(stats.citations_recorded, 1);

        let stored = db.get_decision("22 Cdo 1234/2019").await.unwrap().unwrap();
        assert_eq!(stored.date, "2020-03-05");
        assert!(stored.weight > 0.0);
        assert_eq!(db.count_citations_to("21 Cdo 99/2015").await.unwrap(), 1);
        assert_eq!(queue.get_stats().await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn test_unchanged_decision_is_skipped() {
        let (db, _temp) = setup_test_db().await;
        let config = Config::default();
        let queue = IngestQueue::new(&db, &config.queue);
        let facts = DecisionFacts::default();

        ingest_decision_text(&config, &db, &queue, DECISION, &facts, 0)
            .await
            .unwrap();
        let again = ingest_decision_text(&config, &db, &queue, DECISION, &facts, 0)
            .await
            .unwrap();
        assert_eq!(again.decisions_unchanged, 1);
        assert_eq!(again.chunks_queued, 0);

        let overruled = DecisionFacts {
            overruled: true,
            ..DecisionFacts::default()
        };
        let changed = ingest_decision_text(&config, &db, &queue, DECISION, &overruled, 0)
            .await
            .unwrap();
        assert_eq!(changed.chunks_queued, 2);
        assert!(db.get_decision("22 Cdo 1234/2019").await.unwrap().unwrap().overruled);
    }

    #[tokio::test]
    async fn test_xml_export_ingest() {
        let (db, _temp) = setup_test_db().await;
        let config = Config::default();
        let queue = IngestQueue::new(&db, &config.queue);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.xml");
        std::fs::write(
            &path,
            r#"<Dokumenty>
  <Dokument>
    <JednaciCislo>22 Cdo 1234/2019</JednaciCislo>
    <Soud>Nejvyšší soud</Soud>
    <DatumVydani>2020-03-05</DatumVydani>
    <ZminenaUstanoveni><ZmineneUstanovení>§ 1089 o. z.</ZmineneUstanovení></ZminenaUstanoveni>
    <Vyrok>Dovolání se zamítá.</Vyrok>
    <Oduvodneni>Oprávněná držba předpokládá dobrou víru držitele.</Oduvodneni>
  </Dokument>
  <Dokument>
    <JednaciCislo>25 Co 7/2021</JednaciCislo>
    <Soud>Krajský soud v Brně</Soud>
    <DatumVydani>2021-06-07</DatumVydani>
    <Vyrok>Rozsudek se potvrzuje.</Vyrok>
  </Dokument>
</Dokumenty>"#,
        )
        .unwrap();

        let stats = cmd_ingest_xml(&config, &db, &queue, &path, 0, true)
            .await
            .unwrap();
        assert_eq!(stats.files_processed, 2);
        assert!(stats.errors.is_empty());
        assert_eq!(stats.chunks_queued, 4);

        let supreme = db.get_decision("22 Cdo 1234/2019").await.unwrap().unwrap();
        assert_eq!(supreme.date, "2020-03-05");
        assert_eq!(supreme.decision_type.as_deref(), Some("ROZSUDEK"));
        assert!(supreme.is_binding);
        let regional = db.get_decision("25 Co 7/2021").await.unwrap().unwrap();
        assert!(!regional.is_binding);

        let again = cmd_ingest_xml(&config, &db, &queue, &path, 0, true)
            .await
            .unwrap();
        assert_eq!(again.decisions_unchanged, 2);
        assert_eq!(again.chunks_queued, 0);
    }

    #[tokio::test]
    async fn test_dir_ingest_isolates_bad_files() {
        let (db, _temp) = setup_test_db().await;
        let config = Config::default();
        let queue = IngestQueue::new(&db, &config.queue);

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), STATUTE).unwrap();
        std::fs::write(dir.path().join("notes.md"), STATUTE).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/b.TXT"), "").unwrap();

        let stats = cmd_ingest_dir(
            &config,
            &db,
            &queue,
            dir.path(),
            DocumentKind::Statute,
            &["txt".to_string()],
            &source(),
            0,
            true,
        )
        .await
        .unwrap();

        assert_eq!(stats.files_processed, 2);
        assert_eq!(stats.chunks_queued, 2);
        assert!(stats.errors.is_empty());

        let missing = cmd_ingest_dir(
            &config,
            &db,
            &queue,
            &dir.path().join("missing"),
            DocumentKind::Statute,
            &["txt".to_string()],
            &source(),
            0,
            true,
        )
        .await;
        assert!(matches!(missing, Err(Error::InvalidPath(_))));
    }
}

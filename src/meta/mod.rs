//! Metadata storage using SQLite
//!
//! This module handles all relational metadata:
//! - Decisions (header fields, authority facts, content hash)
//! - Discovered doctrines and their decision membership
//! - Citations between decisions
//!
//! The processing queue shares this database; see [`crate::queue`].

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Timestamp format used across all tables (fixed width, sorts lexically)
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A stored court decision
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub case_id: String,
    pub court: String,
    pub date: String,
    pub ecli: Option<String>,
    pub decision_number: Option<String>,
    pub decision_type: Option<String>,
    pub legal_area: Option<String>,
    pub principle: String,
    pub content_hash: String,
    pub is_binding: bool,
    pub en_banc: bool,
    pub citation_count: i64,
    pub overruled: bool,
    pub weight: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// A persisted doctrine
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DoctrineRecord {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub keywords_json: String,
    pub member_count: i64,
    pub avg_confidence: f64,
    pub legal_domain: String,
    pub discovered_at: String,
    pub last_updated: String,
}

impl DoctrineRecord {
    pub fn keywords(&self) -> Vec<String> {
        serde_json::from_str(&self.keywords_json).unwrap_or_default()
    }
}

/// Fields written when a doctrine is discovered or rediscovered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctrineUpdate {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub avg_confidence: f64,
    pub legal_domain: String,
    /// Member decision ids with their membership confidence
    pub members: Vec<(String, f64)>,
}

/// Outcome of a doctrine upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctrineUpsert {
    pub id: String,
    pub created: bool,
}

/// Decision membership of a doctrine
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DoctrineMember {
    pub decision_id: String,
    pub doctrine_id: String,
    pub confidence: f64,
}

/// Global statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalStats {
    pub decision_count: usize,
    pub doctrine_count: usize,
    pub citation_count: usize,
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database configured in `config`
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Open (creating if needed) the database at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='processing_queue'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ===== Decision Operations =====

    /// Insert or update a decision by case id
    pub async fn upsert_decision(&self, decision: &DecisionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO decisions (case_id, court, date, ecli, decision_number, decision_type, legal_area,
                                   principle, content_hash, is_binding, en_banc, citation_count, overruled,
                                   weight, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(case_id) DO UPDATE SET
                court = excluded.court,
                date = excluded.date,
                ecli = excluded.ecli,
                decision_number = excluded.decision_number,
                decision_type = excluded.decision_type,
                legal_area = excluded.legal_area,
                principle = excluded.principle,
                content_hash = excluded.content_hash,
                is_binding = excluded.is_binding,
                en_banc = excluded.en_banc,
                citation_count = excluded.citation_count,
                overruled = excluded.overruled,
                weight = excluded.weight,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&decision.case_id)
        .bind(&decision.court)
        .bind(&decision.date)
        .bind(&decision.ecli)
        .bind(&decision.decision_number)
        .bind(&decision.decision_type)
        .bind(&decision.legal_area)
        .bind(&decision.principle)
        .bind(&decision.content_hash)
        .bind(decision.is_binding)
        .bind(decision.en_banc)
        .bind(decision.citation_count)
        .bind(decision.overruled)
        .bind(decision.weight)
        .bind(&decision.created_at)
        .bind(&decision.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get decision by case id
    pub async fn get_decision(&self, case_id: &str) -> Result<Option<DecisionRecord>> {
        let decision =
            sqlx::query_as::<_, DecisionRecord>("SELECT * FROM decisions WHERE case_id = ?")
                .bind(case_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(decision)
    }

    /// List all decisions, newest first
    pub async fn list_decisions(&self) -> Result<Vec<DecisionRecord>> {
        let decisions =
            sqlx::query_as::<_, DecisionRecord>("SELECT * FROM decisions ORDER BY date DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(decisions)
    }

    /// Update the stored authority weight of a decision
    pub async fn update_decision_weight(&self, case_id: &str, weight: f64) -> Result<bool> {
        let result = sqlx::query("UPDATE decisions SET weight = ?, updated_at = ? WHERE case_id = ?")
            .bind(weight)
            .bind(now_timestamp())
            .bind(case_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    // ===== Citation Operations =====

    /// Record that `citing` cites each of `cited`
    pub async fn insert_citations(&self, citing: &str, cited: &[String]) -> Result<usize> {
        let mut inserted = 0;
        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;
        for target in cited.iter().filter(|c| c.as_str() != citing) {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO citations (citing_case_id, cited_case_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(citing)
            .bind(target)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Case ids cited by `case_id`, sorted
    pub async fn citations_from(&self, case_id: &str) -> Result<Vec<String>> {
        let cited: Vec<String> = sqlx::query_scalar(
            "SELECT cited_case_id FROM citations WHERE citing_case_id = ? ORDER BY cited_case_id",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(cited)
    }

    /// Number of decisions citing `case_id`
    pub async fn count_citations_to(&self, case_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM citations WHERE cited_case_id = ?")
                .bind(case_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    // ===== Doctrine Operations =====

    /// Insert or update a doctrine by name and replace its membership.
    ///
    /// Existing rows keep their id and discovery time. Membership is deleted
    /// and reinserted, never diffed.
    pub async fn upsert_doctrine(&self, update: &DoctrineUpdate) -> Result<DoctrineUpsert> {
        let now = now_timestamp();
        let keywords_json = serde_json::to_string(&update.keywords)?;
        let mut tx = self.pool.begin().await?;

        let existing: Option<String> = sqlx::query_scalar("SELECT id FROM doctrines WHERE name = ?")
            .bind(&update.name)
            .fetch_optional(&mut *tx)
            .await?;

        let (id, created) = match existing {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE doctrines SET
                        display_name = ?, description = ?, keywords_json = ?, member_count = ?,
                        avg_confidence = ?, legal_domain = ?, last_updated = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&update.display_name)
                .bind(&update.description)
                .bind(&keywords_json)
                .bind(update.members.len() as i64)
                .bind(update.avg_confidence)
                .bind(&update.legal_domain)
                .bind(&now)
                .bind(&id)
                .execute(&mut *tx)
                .await?;
                (id, false)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                sqlx::query(
                    r#"
                    INSERT INTO doctrines (id, name, display_name, description, keywords_json, member_count,
                                           avg_confidence, legal_domain, discovered_at, last_updated)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&id)
                .bind(&update.name)
                .bind(&update.display_name)
                .bind(&update.description)
                .bind(&keywords_json)
                .bind(update.members.len() as i64)
                .bind(update.avg_confidence)
                .bind(&update.legal_domain)
                .bind(&now)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
                (id, true)
            }
        };

        sqlx::query("DELETE FROM decision_doctrines WHERE doctrine_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        for (decision_id, confidence) in &update.members {
            sqlx::query(
                "INSERT OR IGNORE INTO decision_doctrines (decision_id, doctrine_id, confidence) VALUES (?, ?, ?)",
            )
            .bind(decision_id)
            .bind(&id)
            .bind(confidence)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            "{} doctrine '{}' with {} members",
            if created { "Created" } else { "Updated" },
            update.name,
            update.members.len()
        );

        Ok(DoctrineUpsert { id, created })
    }

    /// Get doctrine by name
    pub async fn get_doctrine_by_name(&self, name: &str) -> Result<Option<DoctrineRecord>> {
        let doctrine = sqlx::query_as::<_, DoctrineRecord>("SELECT * FROM doctrines WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doctrine)
    }

    /// List all doctrines, largest first
    pub async fn list_doctrines(&self) -> Result<Vec<DoctrineRecord>> {
        let doctrines = sqlx::query_as::<_, DoctrineRecord>(
            "SELECT * FROM doctrines ORDER BY member_count DESC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(doctrines)
    }

    /// Members of a doctrine
    pub async fn doctrine_members(&self, doctrine_id: &str) -> Result<Vec<DoctrineMember>> {
        let members = sqlx::query_as::<_, DoctrineMember>(
            "SELECT * FROM decision_doctrines WHERE doctrine_id = ? ORDER BY decision_id",
        )
        .bind(doctrine_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    // ===== Statistics =====

    /// Get global statistics
    pub async fn get_global_stats(&self) -> Result<GlobalStats> {
        let decision_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM decisions")
            .fetch_one(&self.pool)
            .await?;
        let doctrine_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM doctrines")
            .fetch_one(&self.pool)
            .await?;
        let citation_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM citations")
            .fetch_one(&self.pool)
            .await?;

        Ok(GlobalStats {
            decision_count: decision_count as usize,
            doctrine_count: doctrine_count as usize,
            citation_count: citation_count as usize,
        })
    }
}

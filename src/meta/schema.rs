//! SQLite schema definition

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
-- Decisions: one row per ingested court decision
CREATE TABLE IF NOT EXISTS decisions (
    case_id TEXT PRIMARY KEY,
    court TEXT NOT NULL,
    date TEXT NOT NULL,
    ecli TEXT,
    decision_number TEXT,
    decision_type TEXT,
    legal_area TEXT,
    principle TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    is_binding INTEGER NOT NULL DEFAULT 1,
    en_banc INTEGER NOT NULL DEFAULT 0,
    citation_count INTEGER NOT NULL DEFAULT 0,
    overruled INTEGER NOT NULL DEFAULT 0,
    weight REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Doctrines: named clusters discovered across decisions
CREATE TABLE IF NOT EXISTS doctrines (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    description TEXT,
    keywords_json TEXT NOT NULL DEFAULT '[]',
    member_count INTEGER NOT NULL DEFAULT 0,
    avg_confidence REAL NOT NULL DEFAULT 0.0,
    legal_domain TEXT NOT NULL,
    discovered_at TEXT NOT NULL,
    last_updated TEXT NOT NULL
);

-- Doctrine membership, replaced wholesale on every discovery run
CREATE TABLE IF NOT EXISTS decision_doctrines (
    decision_id TEXT NOT NULL,
    doctrine_id TEXT NOT NULL REFERENCES doctrines(id),
    confidence REAL NOT NULL DEFAULT 1.0,
    PRIMARY KEY (decision_id, doctrine_id)
);

-- Processing queue: chunks awaiting embedding
CREATE TABLE IF NOT EXISTS processing_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chunk_id TEXT NOT NULL UNIQUE,
    chunk_text TEXT NOT NULL,
    chunk_metadata TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    priority INTEGER NOT NULL DEFAULT 0,
    retry_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at TEXT NOT NULL,
    processed_at TEXT
);

-- Citations between decisions
CREATE TABLE IF NOT EXISTS citations (
    citing_case_id TEXT NOT NULL,
    cited_case_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (citing_case_id, cited_case_id)
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_queue_status ON processing_queue(status, priority DESC, created_at ASC);
CREATE INDEX IF NOT EXISTS idx_decision_doctrines_doctrine ON decision_doctrines(doctrine_id);
CREATE INDEX IF NOT EXISTS idx_citations_cited ON citations(cited_case_id);
CREATE INDEX IF NOT EXISTS idx_decisions_court ON decisions(court);
"#;

//! SQL migration definitions for the lexpipe database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: obligations, jobs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Validated obligations. Queryable columns are denormalized from the
-- serialized record; payload_json is the source of truth.
CREATE TABLE IF NOT EXISTS obligations (
    id                    TEXT PRIMARY KEY,
    source_legal_act      TEXT NOT NULL,
    source_article_number TEXT NOT NULL,
    status                TEXT NOT NULL,
    is_duplicate          INTEGER NOT NULL DEFAULT 0,
    validation_score      REAL NOT NULL,
    validated_at          TEXT NOT NULL,
    payload_json          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_obligations_status ON obligations(status);
CREATE INDEX IF NOT EXISTS idx_obligations_act ON obligations(source_legal_act);

-- Pipeline job queue and history
CREATE TABLE IF NOT EXISTS jobs (
    id               TEXT PRIMARY KEY,
    source_url       TEXT NOT NULL,
    title            TEXT NOT NULL,
    status           TEXT NOT NULL,
    current_step     TEXT NOT NULL,
    progress_percent INTEGER NOT NULL DEFAULT 0,
    result_json      TEXT,
    error_message    TEXT,
    started_at       TEXT,
    completed_at     TEXT,
    created_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
